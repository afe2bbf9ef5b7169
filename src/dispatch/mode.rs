//! Interceptor modes: stateful objects that override the meaning of every
//! operator call issued within a dynamic scope.

use std::fmt;
use std::sync::Arc;

use crate::error::CrucibleResult;
use crate::schema::OpSchema;
use crate::tensor::{Arg, Kwargs, OpOutputs};
use super::stack::DispatchContext;

/// Dispatch-category tag for the two reserved keyed slots.
///
/// These categories are performance-critical paths that bypass the general
/// untagged stack; by convention each holds at most one active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKey {
    ProxyTracing,
    FakeExecution,
}

impl ModeKey {
    pub const ALL: [ModeKey; 2] = [ModeKey::ProxyTracing, ModeKey::FakeExecution];
}

impl fmt::Display for ModeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKey::ProxyTracing => f.write_str("proxy-tracing"),
            ModeKey::FakeExecution => f.write_str("fake-execution"),
        }
    }
}

/// A dispatch interceptor.
///
/// The innermost pushed mode sees an operation first and decides whether to
/// handle it directly or recurse into the surrounding dispatch (the mode is
/// temporarily popped while its handler runs, so nested calls reach the
/// next-outer interceptor). Stateful modes keep their state behind interior
/// mutability; handles to one mode instance compare equal by identity.
pub trait DispatchMode: fmt::Debug + Send + Sync {
    /// Mode name for diagnostics
    fn name(&self) -> &'static str;

    /// Single entry point: override the given operator invocation.
    ///
    /// `types` lists the wrapper implementations participating in the call.
    /// `ctx` is the execution context the call arrived through; issuing
    /// operator calls against it from inside the handler reaches the
    /// next-outer interceptor, because this mode is popped while it runs.
    fn dispatch(
        &self,
        ctx: &DispatchContext,
        schema: &OpSchema,
        types: &[&'static str],
        args: &[Arg],
        kwargs: &Kwargs,
    ) -> CrucibleResult<OpOutputs>;

    /// Keyed slot this mode occupies when entered, if any
    fn dispatch_key(&self) -> Option<ModeKey> {
        None
    }
}

/// Shared handle to a mode instance
pub type ModeHandle = Arc<dyn DispatchMode>;

/// Identity comparison: true iff both handles refer to one mode instance
pub fn same_mode(a: &ModeHandle, b: &ModeHandle) -> bool {
    Arc::ptr_eq(a, b)
}

/// Mode that forwards every call to the surrounding dispatch unchanged:
/// the next-outer interceptor if one is active, else the dense kernel
#[derive(Debug, Default)]
pub struct PassthroughMode;

impl DispatchMode for PassthroughMode {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn dispatch(
        &self,
        ctx: &DispatchContext,
        schema: &OpSchema,
        _types: &[&'static str],
        args: &[Arg],
        kwargs: &Kwargs,
    ) -> CrucibleResult<OpOutputs> {
        super::call_op(ctx, schema.op(), args, kwargs)
    }
}
