//! Interceptor resolution: given the current mode-stack state, decide which
//! interceptor (if any) handles an operation. Pure reads over the context.

use crate::config;
use crate::schema::OpId;
use super::mode::{ModeHandle, ModeKey};
use super::stack::DispatchContext;

/// The interceptor that should handle the next operation, in priority
/// order: top of the untagged stack, else the proxy-tracing slot, else the
/// fake-execution slot. `None` means "use the default dense implementation".
pub fn resolve_interceptor(ctx: &DispatchContext) -> Option<ModeHandle> {
    resolve_interceptor_entry(ctx).map(|(mode, _)| mode)
}

/// Resolution plus the stack the winning mode came from, so the caller can
/// temporarily pop it while its handler runs
pub(crate) fn resolve_interceptor_entry(
    ctx: &DispatchContext,
) -> Option<(ModeHandle, Option<ModeKey>)> {
    if let Some(mode) = ctx.current_mode(None) {
        return Some((mode, None));
    }
    for key in ModeKey::ALL {
        if let Some(mode) = ctx.current_mode(Some(key)) {
            return Some((mode, Some(key)));
        }
    }
    None
}

/// Every active interceptor, untagged-stack entries first in stack order,
/// then the proxy-tracing slot, then the fake-execution slot.
/// Introspection only; does not affect dispatch outcome.
pub fn resolve_interceptor_chain(ctx: &DispatchContext) -> Vec<ModeHandle> {
    let mut chain = ctx.user_mode_stack();
    for key in ModeKey::ALL {
        chain.extend(ctx.keyed_mode_stack(key));
    }
    chain
}

/// Record that `op` resolved past an empty keyed slot, so the decision can
/// be skipped until a mode is pushed for that key
pub(crate) fn note_fast_path(ctx: &DispatchContext, op: OpId) {
    if !config::get_config().dispatch.fast_path_cache {
        return;
    }
    for key in ModeKey::ALL {
        if ctx.current_mode(Some(key)).is_none() {
            ctx.record_fast_path(key, op);
        }
    }
}
