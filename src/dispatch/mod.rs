//! Operator dispatch: routes every operator call through the active
//! interceptor, or to the registered dense kernel when none is active.

pub mod mode;
pub mod router;
pub mod stack;

pub use mode::{same_mode, DispatchMode, ModeHandle, ModeKey, PassthroughMode};
pub use router::{resolve_interceptor, resolve_interceptor_chain};
pub use stack::{DisabledModes, DispatchContext, ModeGuard, TemporarilyPopped};

use crate::error::CrucibleResult;
use crate::schema::{registry, OpId};
use crate::tensor::{Arg, Kwargs, OpOutputs};

/// Wrapper implementations participating in a call, first-seen order
pub fn participating_types(args: &[Arg]) -> Vec<&'static str> {
    let mut types = Vec::new();
    let mut note = |name: Option<&'static str>| {
        if let Some(name) = name {
            if !types.contains(&name) {
                types.push(name);
            }
        }
    };
    for arg in args {
        match arg {
            Arg::Tensor(t) => note(t.wrapper_type_name()),
            Arg::TensorList(ts) => {
                for t in ts {
                    note(t.wrapper_type_name());
                }
            }
            _ => {}
        }
    }
    types
}

/// Invoke an operator.
///
/// Resolves the active interceptor; if one is found it is temporarily
/// popped while its handler runs, so calls the handler issues reach the
/// next-outer interceptor instead of recursing into itself. With no
/// interceptor active, the registered dense kernel runs and the fast-path
/// decision is recorded.
pub fn call_op(
    ctx: &DispatchContext,
    op: OpId,
    args: &[Arg],
    kwargs: &Kwargs,
) -> CrucibleResult<OpOutputs> {
    let schema = registry::schema_for(op)?;
    match router::resolve_interceptor_entry(ctx) {
        Some((_, source)) => {
            let types = participating_types(args);
            let popped = ctx.pop_mode_temporarily(source)?;
            tracing::debug!(op = %op, mode = popped.mode().name(), "dispatching to interceptor");
            popped.mode().dispatch(ctx, &schema, &types, args, kwargs)
        }
        None => {
            router::note_fast_path(ctx, op);
            tracing::trace!(op = %op, "dispatching to dense kernel");
            registry::run_dense(op, args, kwargs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrucibleError;
    use crate::schema::{AliasInfo, OpSchema};
    use crate::tensor::{DenseTensor, IdentityWrapper, Tensor};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn add_kernel(args: &[Arg], _kwargs: &Kwargs) -> crate::error::CrucibleResult<OpOutputs> {
        let a = args[0].as_tensor().unwrap().to_dense()?;
        let b = args[1].as_tensor().unwrap().to_dense()?;
        let sum: Vec<f32> = a
            .to_f32_vec()?
            .iter()
            .zip(b.to_f32_vec()?)
            .map(|(x, y)| x + y)
            .collect();
        Ok(OpOutputs::One(Tensor::dense(DenseTensor::from_f32(
            a.shape().to_vec(),
            &sum,
        )?)))
    }

    fn register_add(op: OpId) {
        registry::register_op(
            OpSchema::new(op)
                .with_arg("self", None)
                .with_arg("other", None)
                .with_ret(None),
            Some(add_kernel),
        );
    }

    fn dense(data: &[f32]) -> Tensor {
        Tensor::dense(DenseTensor::from_f32(vec![data.len()], data).unwrap())
    }

    /// Records every op it sees, then forwards to the surrounding dispatch
    #[derive(Debug)]
    struct RecordingMode {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingMode {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl DispatchMode for RecordingMode {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn dispatch(
            &self,
            ctx: &DispatchContext,
            schema: &OpSchema,
            types: &[&'static str],
            args: &[Arg],
            kwargs: &Kwargs,
        ) -> crate::error::CrucibleResult<OpOutputs> {
            self.seen
                .lock()
                .push(format!("{}|{}", schema.op(), types.join(",")));
            call_op(ctx, schema.op(), args, kwargs)
        }
    }

    #[test]
    fn test_no_interceptor_runs_dense_kernel() {
        let op = OpId::new("test_dispatch::add");
        register_add(op);
        let ctx = DispatchContext::new();

        let out = call_op(&ctx, op, &[Arg::Tensor(dense(&[1.0, 2.0])), Arg::Tensor(dense(&[3.0, 4.0]))], &Kwargs::new()).unwrap();
        let result = out.single().unwrap().to_dense().unwrap().to_f32_vec().unwrap();
        assert_eq!(result, vec![4.0, 6.0]);
    }

    #[test]
    fn test_interceptor_sees_call_and_types() {
        let op = OpId::new("test_dispatch::add_seen");
        register_add(op);
        let ctx = DispatchContext::new();
        let mode = RecordingMode::new();

        let wrapped = Tensor::wrapper(IdentityWrapper::boxed(dense(&[1.0])));
        {
            let _guard = ctx.enter_mode(mode.clone());
            call_op(
                &ctx,
                op,
                &[Arg::Tensor(dense(&[1.0])), Arg::Tensor(dense(&[2.0]))],
                &Kwargs::new(),
            )
            .unwrap();
            // wrapper arguments show up as participating types
            let _ = call_op(
                &ctx,
                op,
                &[Arg::Tensor(wrapped.clone()), Arg::Tensor(dense(&[2.0]))],
                &Kwargs::new(),
            );
        }

        let seen = mode.seen.lock();
        assert_eq!(seen[0], "test_dispatch::add_seen|");
        assert_eq!(seen[1], "test_dispatch::add_seen|IdentityWrapper");
    }

    #[test]
    fn test_mode_is_popped_while_its_handler_runs() {
        // A handler that re-enters call_op reaches the dense kernel, not
        // itself: the mode is off the stack while its handler runs.
        #[derive(Debug)]
        struct ReentrantMode {
            depth_inside_handler: Mutex<Option<usize>>,
        }

        impl DispatchMode for ReentrantMode {
            fn name(&self) -> &'static str {
                "reentrant"
            }

            fn dispatch(
                &self,
                ctx: &DispatchContext,
                schema: &OpSchema,
                _types: &[&'static str],
                args: &[Arg],
                kwargs: &Kwargs,
            ) -> crate::error::CrucibleResult<OpOutputs> {
                *self.depth_inside_handler.lock() = Some(ctx.depth(None));
                call_op(ctx, schema.op(), args, kwargs)
            }
        }

        let op = OpId::new("test_dispatch::add_reentrant");
        register_add(op);
        let ctx = DispatchContext::new();
        let mode = Arc::new(ReentrantMode {
            depth_inside_handler: Mutex::new(None),
        });

        {
            let _guard = ctx.enter_mode(mode.clone());
            let out = call_op(
                &ctx,
                op,
                &[Arg::Tensor(dense(&[1.0])), Arg::Tensor(dense(&[1.0]))],
                &Kwargs::new(),
            )
            .unwrap();
            assert_eq!(
                out.single().unwrap().to_dense().unwrap().to_f32_vec().unwrap(),
                vec![2.0]
            );
            // restored after the handler returned
            assert_eq!(ctx.depth(None), 1);
        }
        assert!(ctx.is_clear());
        assert_eq!(*mode.depth_inside_handler.lock(), Some(0));
    }

    #[test]
    fn test_handler_recurses_into_next_outer_mode() {
        let op = OpId::new("test_dispatch::add_chained");
        register_add(op);
        let ctx = DispatchContext::new();
        let outer = RecordingMode::new();
        let inner = RecordingMode::new();

        let _outer_guard = ctx.enter_mode(outer.clone());
        let _inner_guard = ctx.enter_mode(inner.clone());
        call_op(
            &ctx,
            op,
            &[Arg::Tensor(dense(&[1.0])), Arg::Tensor(dense(&[1.0]))],
            &Kwargs::new(),
        )
        .unwrap();

        // innermost mode saw the call first, then forwarded outward
        assert_eq!(inner.seen.lock().len(), 1);
        assert_eq!(outer.seen.lock().len(), 1);
    }

    #[test]
    fn test_passthrough_mode_forwards_to_kernel() {
        let op = OpId::new("test_dispatch::add_passthrough");
        register_add(op);
        let ctx = DispatchContext::new();

        let _guard = ctx.enter_mode(Arc::new(PassthroughMode));
        let out = call_op(
            &ctx,
            op,
            &[Arg::Tensor(dense(&[2.0])), Arg::Tensor(dense(&[3.0]))],
            &Kwargs::new(),
        )
        .unwrap();
        assert_eq!(
            out.single().unwrap().to_dense().unwrap().to_f32_vec().unwrap(),
            vec![5.0]
        );
    }

    #[test]
    fn test_unknown_op_is_an_error() {
        let ctx = DispatchContext::new();
        let err = call_op(
            &ctx,
            OpId::new("test_dispatch::never_registered"),
            &[],
            &Kwargs::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CrucibleError::UnknownOperator(_)));
    }

    #[test]
    fn test_fast_path_recorded_then_invalidated() {
        let op = OpId::new("test_dispatch::add_cached");
        register_add(op);
        let ctx = DispatchContext::new();

        call_op(
            &ctx,
            op,
            &[Arg::Tensor(dense(&[1.0])), Arg::Tensor(dense(&[1.0]))],
            &Kwargs::new(),
        )
        .unwrap();
        assert!(ctx
            .cached_fast_path_ops(ModeKey::ProxyTracing)
            .contains(&op));
        assert!(ctx
            .cached_fast_path_ops(ModeKey::FakeExecution)
            .contains(&op));

        #[derive(Debug)]
        struct ProxyMode;
        impl DispatchMode for ProxyMode {
            fn name(&self) -> &'static str {
                "proxy"
            }
            fn dispatch(
                &self,
                _ctx: &DispatchContext,
                schema: &OpSchema,
                _types: &[&'static str],
                args: &[Arg],
                kwargs: &Kwargs,
            ) -> crate::error::CrucibleResult<OpOutputs> {
                registry::run_dense(schema.op(), args, kwargs)
            }
            fn dispatch_key(&self) -> Option<ModeKey> {
                Some(ModeKey::ProxyTracing)
            }
        }

        let _guard = ctx.enter_mode(Arc::new(ProxyMode));
        assert!(ctx.cached_fast_path_ops(ModeKey::ProxyTracing).is_empty());
        assert!(ctx
            .cached_fast_path_ops(ModeKey::FakeExecution)
            .contains(&op));
    }

    #[test]
    fn test_participating_types_dedup_and_lists() {
        let w1 = Tensor::wrapper(IdentityWrapper::boxed(dense(&[1.0])));
        let w2 = Tensor::wrapper(IdentityWrapper::boxed(dense(&[2.0])));
        let args = vec![
            Arg::Tensor(dense(&[0.0])),
            Arg::Tensor(w1.clone()),
            Arg::TensorList(vec![w2, dense(&[3.0])]),
            Arg::Int(4),
        ];
        assert_eq!(participating_types(&args), vec!["IdentityWrapper"]);
    }
}
