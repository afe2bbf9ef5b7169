//! Crucible - dispatch interception and aliasing correctness for
//! tensor-like values
//!
//! Features:
//! - An ordered, per-context stack of interceptor modes with two reserved
//!   keyed slots (proxy-tracing and fake-execution)
//! - Interceptor resolution with a fast-path cache invalidated on keyed push
//! - Schema-driven storage aliasing and in-place mutation correction
//! - A flatten/unflatten protocol for composite wrapper values

pub mod aliasing;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod schema;
pub mod tensor;

pub use aliasing::{fix_aliasing, return_and_correct_aliasing};
pub use dispatch::{
    call_op, resolve_interceptor, resolve_interceptor_chain, same_mode, DispatchContext,
    DispatchMode, ModeHandle, ModeKey, PassthroughMode,
};
pub use error::{CrucibleError, CrucibleResult, ErrorCode};
pub use schema::{registry, AliasInfo, OpId, OpSchema};
pub use tensor::{
    transform_leaves, Arg, DType, DenseTensor, FlattenContext, IdentityWrapper, Kwargs,
    OpOutputs, Storage, StorageId, Tensor, WrapperTensor,
};

/// Initialize the substrate with default tracing output
pub fn init() -> CrucibleResult<()> {
    tracing_subscriber::fmt::try_init()
        .map_err(|e| CrucibleError::ConfigurationError(e.to_string()))?;
    tracing::info!("Crucible dispatch substrate initialized");
    Ok(())
}

/// Get the current crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
