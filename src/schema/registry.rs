//! Process-wide operator schema registry.
//!
//! A static table keyed by operator identifier: loaded by explicit
//! registration, queried by value at dispatch time. Each entry may also
//! carry the operator's default dense kernel, used when no interceptor is
//! active.

use std::collections::HashMap;
use std::sync::Arc;
use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::error::{CrucibleError, CrucibleResult};
use crate::tensor::{Arg, Kwargs, OpOutputs};
use super::{OpId, OpSchema};

/// Default dense implementation of an operator
pub type DenseKernel = fn(&[Arg], &Kwargs) -> CrucibleResult<OpOutputs>;

struct RegisteredOp {
    schema: OpSchema,
    kernel: Option<DenseKernel>,
}

lazy_static! {
    static ref REGISTRY: Arc<RwLock<HashMap<OpId, RegisteredOp>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Register an operator schema, optionally with its dense kernel.
/// Re-registering an operator replaces the previous entry.
pub fn register_op(schema: OpSchema, kernel: Option<DenseKernel>) {
    let op = schema.op();
    let replaced = REGISTRY
        .write()
        .insert(op, RegisteredOp { schema, kernel })
        .is_some();
    if replaced {
        tracing::debug!(op = %op, "replaced operator registration");
    } else {
        tracing::debug!(op = %op, "registered operator");
    }
}

/// Schema for `op`, cloned out of the table
pub fn schema_for(op: OpId) -> CrucibleResult<OpSchema> {
    REGISTRY
        .read()
        .get(&op)
        .map(|entry| entry.schema.clone())
        .ok_or_else(|| CrucibleError::UnknownOperator(op.name().to_string()))
}

pub fn is_registered(op: OpId) -> bool {
    REGISTRY.read().contains_key(&op)
}

/// Run the default dense implementation of `op`
pub fn run_dense(op: OpId, args: &[Arg], kwargs: &Kwargs) -> CrucibleResult<OpOutputs> {
    let kernel = REGISTRY
        .read()
        .get(&op)
        .and_then(|entry| entry.kernel)
        .ok_or_else(|| {
            CrucibleError::operation_error(op.name(), "no dense kernel registered")
        })?;
    kernel(args, kwargs)
}
