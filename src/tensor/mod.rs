//! Tensor value model for the dispatch substrate
//!
//! This module provides:
//! - Shared storage handles with weak identity comparison
//! - Dense tensor values and the shared `Tensor` handle
//! - The wrapper-subclass protocol (flatten/unflatten) for composite values

pub mod core;
pub mod storage;
pub mod wrapper;

// Re-export main types for convenience
pub use core::{Arg, DType, DenseTensor, Kwargs, OpOutputs, Tensor, TensorKind};
pub use storage::{Storage, StorageId};
pub use wrapper::{transform_leaves, FlattenContext, IdentityWrapper, WrapperTensor};
