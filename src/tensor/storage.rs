use std::sync::{Arc, Weak};
use parking_lot::RwLock;

type Bytes = Arc<RwLock<Box<[u8]>>>;

/// Shared handle to the raw bytes backing a tensor value.
///
/// Cloning a `Storage` shares the underlying buffer; two values alias each
/// other iff their storage handles point at the same buffer. The only
/// sanctioned way to change which buffer backs an existing tensor is the
/// swap performed by the aliasing engine.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Bytes,
}

impl Storage {
    /// Allocate a zero-filled storage of `nbytes` bytes
    pub fn zeros(nbytes: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(vec![0u8; nbytes].into_boxed_slice())),
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data.into_boxed_slice())),
        }
    }

    pub fn nbytes(&self) -> usize {
        self.data.read().len()
    }

    /// Non-owning identity token for aliasing checks
    pub fn id(&self) -> StorageId {
        StorageId(Arc::downgrade(&self.data))
    }

    /// True iff both handles share one underlying buffer
    pub fn same_storage(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Read the buffer contents through a closure
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.read())
    }

    /// Mutate the buffer contents through a closure
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Copy the buffer into a fresh, unshared storage
    pub fn deep_clone(&self) -> Self {
        Self::from_bytes(self.data.read().to_vec())
    }
}

/// Weak, non-owning storage identity.
///
/// Comparable without extending the storage's lifetime; identity outlives
/// readability, so an id taken from a dropped storage still compares unequal
/// to every live one.
#[derive(Debug, Clone)]
pub struct StorageId(Weak<RwLock<Box<[u8]>>>);

impl PartialEq for StorageId {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl Eq for StorageId {}
