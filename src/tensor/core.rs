//! Core tensor value types for the dispatch substrate

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::error::{CrucibleError, CrucibleResult};
use super::storage::{Storage, StorageId};
use super::wrapper::WrapperTensor;

/// Element types understood by the substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I64,
    Bool,
}

impl DType {
    /// Get the size in bytes of this data type
    pub const fn size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I64 => 8,
            DType::Bool => 1,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

/// A plain dense tensor: shape metadata over a shared storage buffer.
///
/// `set_storage` replaces only the backing buffer; the logical shape and
/// dtype of the value never change through a swap.
#[derive(Debug, Clone)]
pub struct DenseTensor {
    shape: Vec<usize>,
    dtype: DType,
    storage: Storage,
}

impl DenseTensor {
    /// Allocate a zero-filled tensor
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        let nbytes = shape.iter().product::<usize>() * dtype.size();
        Self {
            shape,
            dtype,
            storage: Storage::zeros(nbytes),
        }
    }

    /// Build an f32 tensor from a flat element slice
    pub fn from_f32(shape: Vec<usize>, data: &[f32]) -> CrucibleResult<Self> {
        let numel = shape.iter().product::<usize>();
        if numel != data.len() {
            return Err(CrucibleError::ShapeError(format!(
                "shape {:?} holds {} elements, got {}",
                shape,
                numel,
                data.len()
            )));
        }
        let mut bytes = Vec::with_capacity(data.len() * 4);
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Ok(Self {
            shape,
            dtype: DType::F32,
            storage: Storage::from_bytes(bytes),
        })
    }

    /// View over existing storage with new shape metadata
    pub fn view_of(storage: Storage, shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype, storage }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn storage(&self) -> Storage {
        self.storage.clone()
    }

    /// Swap the backing storage, preserving shape and dtype
    pub fn set_storage(&mut self, storage: Storage) {
        self.storage = storage;
    }

    /// Decode the buffer as f32 elements
    pub fn to_f32_vec(&self) -> CrucibleResult<Vec<f32>> {
        if self.dtype != DType::F32 {
            return Err(CrucibleError::operation_error(
                "to_f32_vec",
                &format!("expected F32 tensor, got {:?}", self.dtype),
            ));
        }
        self.storage.with_bytes(|bytes| {
            Ok(bytes
                .chunks_exact(4)
                .take(self.numel())
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect())
        })
    }
}

/// The two families of tensor values the dispatcher moves around
#[derive(Debug)]
pub enum TensorKind {
    Dense(DenseTensor),
    Wrapper(Box<dyn WrapperTensor>),
}

/// Shared tensor handle with reference semantics.
///
/// Cloning a `Tensor` clones the handle, not the value; handle identity is
/// what the mutation-return contract of the aliasing engine preserves.
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<RwLock<TensorKind>>,
}

impl Tensor {
    pub fn dense(t: DenseTensor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TensorKind::Dense(t))),
        }
    }

    pub fn wrapper(w: Box<dyn WrapperTensor>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TensorKind::Wrapper(w))),
        }
    }

    /// Whether this value participates in dispatch interception
    pub fn is_wrapper(&self) -> bool {
        matches!(&*self.inner.read(), TensorKind::Wrapper(_))
    }

    /// Name of the wrapper implementation, if any
    pub fn wrapper_type_name(&self) -> Option<&'static str> {
        match &*self.inner.read() {
            TensorKind::Wrapper(w) => Some(w.type_name()),
            TensorKind::Dense(_) => None,
        }
    }

    /// Handle identity: true iff both handles refer to one value
    pub fn same_value(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn shape(&self) -> Vec<usize> {
        match &*self.inner.read() {
            TensorKind::Dense(t) => t.shape().to_vec(),
            TensorKind::Wrapper(w) => w.shape(),
        }
    }

    pub fn storage(&self) -> Storage {
        match &*self.inner.read() {
            TensorKind::Dense(t) => t.storage(),
            TensorKind::Wrapper(w) => w.storage(),
        }
    }

    pub fn storage_id(&self) -> StorageId {
        self.storage().id()
    }

    pub fn shares_storage(&self, other: &Tensor) -> bool {
        self.storage().same_storage(&other.storage())
    }

    /// Swap the backing storage in place, preserving shape metadata.
    /// Only the aliasing engine should call this.
    pub fn set_storage(&self, storage: Storage) {
        match &mut *self.inner.write() {
            TensorKind::Dense(t) => t.set_storage(storage),
            TensorKind::Wrapper(w) => w.set_storage(storage),
        }
    }

    /// Run a closure against the underlying value
    pub fn with_kind<R>(&self, f: impl FnOnce(&TensorKind) -> R) -> R {
        f(&self.inner.read())
    }

    /// Dense view of the value, cloned out; errors on wrappers
    pub fn to_dense(&self) -> CrucibleResult<DenseTensor> {
        match &*self.inner.read() {
            TensorKind::Dense(t) => Ok(t.clone()),
            TensorKind::Wrapper(w) => Err(CrucibleError::operation_error(
                "to_dense",
                &format!("value is a '{}' wrapper, not dense", w.type_name()),
            )),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.read() {
            TensorKind::Dense(t) => f
                .debug_struct("Tensor")
                .field("shape", &t.shape())
                .field("dtype", &t.dtype())
                .finish(),
            TensorKind::Wrapper(w) => f
                .debug_struct("Tensor")
                .field("wrapper", &w.type_name())
                .field("shape", &w.shape())
                .finish(),
        }
    }
}

/// A positional or keyword argument of an operator call
#[derive(Debug, Clone)]
pub enum Arg {
    Tensor(Tensor),
    TensorList(Vec<Tensor>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Arg {
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Arg::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Keyword arguments of an operator call
pub type Kwargs = HashMap<String, Arg>;

/// Raw outputs of an operator invocation
#[derive(Debug, Clone)]
pub enum OpOutputs {
    One(Tensor),
    Many(Vec<Tensor>),
}

impl OpOutputs {
    pub fn tensors(&self) -> &[Tensor] {
        match self {
            OpOutputs::One(t) => std::slice::from_ref(t),
            OpOutputs::Many(ts) => ts,
        }
    }

    pub fn len(&self) -> usize {
        self.tensors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn single(&self) -> Option<&Tensor> {
        match self {
            OpOutputs::One(t) => Some(t),
            OpOutputs::Many(_) => None,
        }
    }
}
