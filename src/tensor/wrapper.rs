//! Wrapper-subclass protocol: composite tensor values that decompose into
//! dense leaves plus an opaque reconstruction context.

use std::fmt;

use crate::error::{CrucibleError, CrucibleResult};
use super::core::{DenseTensor, Tensor};
use super::storage::Storage;

/// Opaque reconstruction context produced by `flatten` and consumed by
/// `unflatten`. The substrate never looks inside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenContext(pub serde_json::Value);

impl FlattenContext {
    pub fn none() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Capability contract for composite tensor values.
///
/// Implementing this trait declares conformance; there is no runtime
/// capability probing. Round-trip law: `unflatten` applied to the output of
/// `flatten` with unchanged leaves must reproduce an equivalent value.
pub trait WrapperTensor: fmt::Debug + Send + Sync {
    /// Implementation name, reported to mode handlers as a participating type
    fn type_name(&self) -> &'static str;

    /// Logical shape of the composite value
    fn shape(&self) -> Vec<usize>;

    /// Backing storage the aliasing engine compares and swaps
    fn storage(&self) -> Storage;

    /// Swap the backing storage, preserving all shape metadata
    fn set_storage(&mut self, storage: Storage);

    /// Decompose into constituent leaf values plus reconstruction context
    fn flatten(&self) -> (Vec<Tensor>, FlattenContext);

    /// Rebuild a value of the same wrapper type from transformed leaves
    fn unflatten(
        &self,
        leaves: Vec<Tensor>,
        ctx: FlattenContext,
    ) -> CrucibleResult<Box<dyn WrapperTensor>>;
}

/// Apply `callback` to every dense leaf of a wrapper value, recursing
/// through nested wrappers, and reconstruct the composite.
///
/// Only leaf contents may change; the structure of the composite is fixed by
/// `unflatten`. Errors with `NotWrapperSubclassError` on a non-wrapper value.
pub fn transform_leaves<F>(tensor: &Tensor, callback: &F) -> CrucibleResult<Tensor>
where
    F: Fn(&Tensor) -> CrucibleResult<Tensor>,
{
    tensor.with_kind(|kind| match kind {
        super::core::TensorKind::Wrapper(w) => {
            let (leaves, ctx) = w.flatten();
            let mut transformed = Vec::with_capacity(leaves.len());
            for leaf in &leaves {
                if leaf.is_wrapper() {
                    transformed.push(transform_leaves(leaf, callback)?);
                } else {
                    transformed.push(callback(leaf)?);
                }
            }
            Ok(Tensor::wrapper(w.unflatten(transformed, ctx)?))
        }
        super::core::TensorKind::Dense(t) => Err(CrucibleError::NotWrapperSubclassError(
            format!("dense tensor of shape {:?}", t.shape()),
        )),
    })
}

/// Reference wrapper implementation: a single dense leaf behind the
/// protocol, with a null reconstruction context.
#[derive(Debug)]
pub struct IdentityWrapper {
    inner: Tensor,
}

impl IdentityWrapper {
    pub fn new(inner: Tensor) -> Self {
        Self { inner }
    }

    pub fn boxed(inner: Tensor) -> Box<dyn WrapperTensor> {
        Box::new(Self::new(inner))
    }

    pub fn inner(&self) -> &Tensor {
        &self.inner
    }
}

impl WrapperTensor for IdentityWrapper {
    fn type_name(&self) -> &'static str {
        "IdentityWrapper"
    }

    fn shape(&self) -> Vec<usize> {
        self.inner.shape()
    }

    fn storage(&self) -> Storage {
        self.inner.storage()
    }

    fn set_storage(&mut self, storage: Storage) {
        self.inner.set_storage(storage);
    }

    fn flatten(&self) -> (Vec<Tensor>, FlattenContext) {
        (vec![self.inner.clone()], FlattenContext::none())
    }

    fn unflatten(
        &self,
        mut leaves: Vec<Tensor>,
        _ctx: FlattenContext,
    ) -> CrucibleResult<Box<dyn WrapperTensor>> {
        if leaves.len() != 1 {
            return Err(CrucibleError::operation_error(
                "IdentityWrapper::unflatten",
                &format!("expected 1 leaf, got {}", leaves.len()),
            ));
        }
        Ok(Box::new(Self::new(leaves.remove(0))))
    }
}

/// Wrap a dense tensor in the reference wrapper
pub fn wrap_dense(t: DenseTensor) -> Tensor {
    Tensor::wrapper(IdentityWrapper::boxed(Tensor::dense(t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Test wrapper carrying a scale factor in its reconstruction context
    #[derive(Debug)]
    struct ScaledTensor {
        inner: Tensor,
        scale: f64,
    }

    impl ScaledTensor {
        fn new(inner: Tensor, scale: f64) -> Self {
            Self { inner, scale }
        }
    }

    impl WrapperTensor for ScaledTensor {
        fn type_name(&self) -> &'static str {
            "ScaledTensor"
        }

        fn shape(&self) -> Vec<usize> {
            self.inner.shape()
        }

        fn storage(&self) -> Storage {
            self.inner.storage()
        }

        fn set_storage(&mut self, storage: Storage) {
            self.inner.set_storage(storage);
        }

        fn flatten(&self) -> (Vec<Tensor>, FlattenContext) {
            (
                vec![self.inner.clone()],
                FlattenContext::new(json!({ "scale": self.scale })),
            )
        }

        fn unflatten(
            &self,
            mut leaves: Vec<Tensor>,
            ctx: FlattenContext,
        ) -> CrucibleResult<Box<dyn WrapperTensor>> {
            let scale = ctx.value()["scale"].as_f64().ok_or_else(|| {
                CrucibleError::operation_error("ScaledTensor::unflatten", "missing scale")
            })?;
            Ok(Box::new(ScaledTensor::new(leaves.remove(0), scale)))
        }
    }

    fn dense(data: &[f32]) -> Tensor {
        Tensor::dense(DenseTensor::from_f32(vec![data.len()], data).unwrap())
    }

    #[test]
    fn test_round_trip_preserves_value() {
        let leaf = dense(&[1.0, 2.0, 3.0]);
        let wrapped = Tensor::wrapper(Box::new(ScaledTensor::new(leaf.clone(), 2.5)));

        let identity = |t: &Tensor| Ok(t.clone());
        let rebuilt = transform_leaves(&wrapped, &identity).unwrap();

        assert!(rebuilt.is_wrapper());
        assert_eq!(rebuilt.wrapper_type_name(), Some("ScaledTensor"));
        assert_eq!(rebuilt.shape(), vec![3]);
        // identity callback keeps the leaf handle itself
        assert!(rebuilt.shares_storage(&leaf));
    }

    #[test]
    fn test_transform_alters_leaves_not_structure() {
        let wrapped = wrap_dense(DenseTensor::from_f32(vec![2], &[1.0, 2.0]).unwrap());

        let doubled = transform_leaves(&wrapped, &|t: &Tensor| {
            let values: Vec<f32> = t.to_dense()?.to_f32_vec()?.iter().map(|v| v * 2.0).collect();
            Ok(Tensor::dense(DenseTensor::from_f32(t.shape(), &values)?))
        })
        .unwrap();

        assert_eq!(doubled.wrapper_type_name(), Some("IdentityWrapper"));
        assert_eq!(doubled.shape(), vec![2]);
        let (leaves, _) = doubled.with_kind(|kind| match kind {
            crate::tensor::core::TensorKind::Wrapper(w) => w.flatten(),
            _ => panic!("expected wrapper"),
        });
        assert_eq!(leaves[0].to_dense().unwrap().to_f32_vec().unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_transform_recurses_through_nested_wrappers() {
        let leaf = dense(&[3.0]);
        let nested = Tensor::wrapper(Box::new(ScaledTensor::new(
            Tensor::wrapper(IdentityWrapper::boxed(leaf)),
            0.5,
        )));

        let out = transform_leaves(&nested, &|t: &Tensor| {
            let values: Vec<f32> = t.to_dense()?.to_f32_vec()?.iter().map(|v| v + 1.0).collect();
            Ok(Tensor::dense(DenseTensor::from_f32(t.shape(), &values)?))
        })
        .unwrap();

        assert_eq!(out.wrapper_type_name(), Some("ScaledTensor"));
        let (leaves, _) = out.with_kind(|kind| match kind {
            crate::tensor::core::TensorKind::Wrapper(w) => w.flatten(),
            _ => panic!("expected wrapper"),
        });
        // inner structure survives: still an IdentityWrapper around the leaf
        assert_eq!(leaves[0].wrapper_type_name(), Some("IdentityWrapper"));
        let inner_dense = transform_leaves(&leaves[0], &|t: &Tensor| Ok(t.clone()))
            .unwrap()
            .with_kind(|kind| match kind {
                crate::tensor::core::TensorKind::Wrapper(w) => w.flatten().0.remove(0),
                _ => panic!("expected wrapper"),
            });
        assert_eq!(inner_dense.to_dense().unwrap().to_f32_vec().unwrap(), vec![4.0]);
    }

    #[test]
    fn test_non_wrapper_is_rejected() {
        let plain = dense(&[1.0]);
        let err = transform_leaves(&plain, &|t: &Tensor| Ok(t.clone())).unwrap_err();
        assert!(matches!(err, CrucibleError::NotWrapperSubclassError(_)));
    }
}
