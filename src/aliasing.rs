//! Alias/mutation correctness: after an intercepted operator runs, rewrite
//! output storages so that schema-declared aliases actually share storage
//! with their inputs, and resolve in-place mutations to return the original
//! mutated input.
//!
//! Wrapper values intercept every low-level storage mutation, so the generic
//! dispatch path has to replay by hand the aliasing contract that is
//! implicit for a plain dense value.

use crate::error::{CrucibleError, CrucibleResult};
use crate::schema::{OpSchema, ReturnSpec};
use crate::tensor::{Arg, OpOutputs, Tensor};

/// Multi-output slicing/splitting operators whose outputs all alias the
/// first input. Alias annotations on list returns do not survive schema
/// parsing, so these are handled as a finite exception table rather than
/// through the per-slot alias sets.
const SPLIT_ALL_OUTPUTS_ALIAS_SELF: &[&str] = &[
    "chunk",
    "tensor_split",
    "split",
    "split_with_sizes",
    "hsplit",
    "vsplit",
    "dsplit",
    "unbind",
];

fn tensor_arg<'a>(schema: &OpSchema, args: &'a [Arg], arg_idx: usize) -> CrucibleResult<&'a Tensor> {
    args.get(arg_idx)
        .and_then(Arg::as_tensor)
        .ok_or_else(|| CrucibleError::AliasSchemaError {
            op: schema.op().name().to_string(),
            message: format!("argument slot {} is not a tensor", arg_idx),
        })
}

/// Swap `out`'s backing storage to `src`'s. The swap changes which storage
/// backs the value, never the value's logical shape.
fn alias_storage(schema: &OpSchema, src: &Tensor, out: &Tensor, ret_idx: usize) {
    if crate::config::get_config().aliasing.trace_swaps {
        tracing::trace!(op = %schema.op(), slot = ret_idx, "aliasing output storage to input");
    }
    out.set_storage(src.storage());
}

/// Force every output that the schema declares as aliasing an input to
/// actually share that input's storage.
///
/// Outputs handed to this engine must be wrapper values: performing the
/// swap requires the interception capability, and a plain dense output here
/// indicates a misbehaving wrapper implementation.
pub fn fix_aliasing(schema: &OpSchema, args: &[Arg], outs: &OpOutputs) -> CrucibleResult<()> {
    let out_tensors = outs.tensors();
    for (slot, out) in out_tensors.iter().enumerate() {
        if !out.is_wrapper() {
            return Err(CrucibleError::alias_schema(
                schema.op().name(),
                slot,
                "output does not implement the interception protocol",
            ));
        }
    }

    for (arg_idx, arg_spec) in schema.arguments().iter().enumerate() {
        let arg_alias = match arg_spec.alias() {
            Some(info) => info,
            None => continue,
        };
        for (ret_idx, ret_spec) in schema.returns().iter().enumerate() {
            let aliases = ret_spec
                .alias()
                .map_or(false, |ret_alias| arg_alias.intersects(ret_alias));
            if !aliases {
                continue;
            }
            if let Some(out) = out_tensors.get(ret_idx) {
                let src = tensor_arg(schema, args, arg_idx)?;
                alias_storage(schema, src, out, ret_idx);
            }
        }
    }

    if SPLIT_ALL_OUTPUTS_ALIAS_SELF.contains(&schema.op().base_name()) {
        let src = tensor_arg(schema, args, 0)?;
        for (ret_idx, out) in out_tensors.iter().enumerate() {
            alias_storage(schema, src, out, ret_idx);
        }
    }

    Ok(())
}

/// The single write-marked alias token of a return slot, if any.
/// Alias sets here only involve simple aliasing; a multi-token write set is
/// rejected rather than guessed at.
fn write_alias<'a>(schema: &OpSchema, ret: &'a ReturnSpec) -> CrucibleResult<Option<&'a str>> {
    let info = match ret.alias() {
        Some(info) => info,
        None => return Ok(None),
    };
    if info.tokens().is_empty() {
        return Ok(None);
    }
    if info.tokens().len() != 1 {
        return Err(CrucibleError::AliasSchemaError {
            op: schema.op().name().to_string(),
            message: format!("unsupported alias set with {} members", info.tokens().len()),
        });
    }
    Ok(if info.is_write() {
        Some(info.tokens()[0].as_str())
    } else {
        None
    })
}

/// Fix output storage aliasing, then correct the returned value for
/// in-place mutation semantics.
///
/// A schema with no write-marked returns passes `out` through unchanged
/// (a plain or view-aliasing op). A schema where every return is
/// write-marked returns the mutated input itself, once per declared
/// return. A schema mixing write-marked and read-only returns is
/// unsupported and surfaces `MixedAliasSchemaError`.
pub fn return_and_correct_aliasing(
    schema: &OpSchema,
    args: &[Arg],
    out: OpOutputs,
) -> CrucibleResult<OpOutputs> {
    fix_aliasing(schema, args, &out)?;

    let mut write_tokens = Vec::with_capacity(schema.returns().len());
    for ret_spec in schema.returns() {
        write_tokens.push(write_alias(schema, ret_spec)?);
    }

    if write_tokens.iter().all(Option::is_none) {
        return Ok(out);
    }
    if write_tokens.iter().any(Option::is_none) {
        return Err(CrucibleError::MixedAliasSchemaError(
            schema.op().name().to_string(),
        ));
    }

    let mut corrected = Vec::with_capacity(write_tokens.len());
    for token in write_tokens.iter().flatten() {
        let arg_idx = schema.arg_index_for_alias(token).ok_or_else(|| {
            CrucibleError::AliasSchemaError {
                op: schema.op().name().to_string(),
                message: format!("write alias '{}' matches no argument", token),
            }
        })?;
        corrected.push(tensor_arg(schema, args, arg_idx)?.clone());
    }

    if corrected.len() == 1 {
        Ok(OpOutputs::One(corrected.remove(0)))
    } else {
        Ok(OpOutputs::Many(corrected))
    }
}
