//! Chunks: the unit of storage handed out by chunk sources.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::pool::PoolShared;
use crate::BufferError;

/// Backing storage of a chunk. When the last handle goes away, pooled
/// storage is handed back to its pool instead of being freed.
struct ChunkStorage {
    bytes: Vec<u8>,
    home: Option<Weak<PoolShared>>,
}

impl Drop for ChunkStorage {
    fn drop(&mut self) {
        if let Some(pool) = self.home.take().and_then(|home| home.upgrade()) {
            pool.release(std::mem::take(&mut self.bytes));
        }
    }
}

/// A fixed-size region of bytes.
///
/// Handles are cheap to [`fork`](Chunk::fork); every fork keeps the storage
/// alive. Mutation is only possible through a handle that has not been
/// forked, which is what lets read-only slices outlive the buffer they were
/// taken from.
pub struct Chunk {
    storage: Arc<ChunkStorage>,
}

impl Chunk {
    /// Creates an unpooled, zero-filled chunk.
    pub fn new(size: usize) -> Self {
        Self::from_vec(vec![0u8; size])
    }

    /// Wraps existing bytes as an unpooled chunk.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Arc::new(ChunkStorage { bytes, home: None }),
        }
    }

    pub(crate) fn pooled(bytes: Vec<u8>, home: Weak<PoolShared>) -> Self {
        Self {
            storage: Arc::new(ChunkStorage {
                bytes,
                home: Some(home),
            }),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.storage.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.bytes.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.storage.bytes
    }

    /// Mutable access to the chunk bytes.
    ///
    /// Fails when another handle to the same storage exists.
    pub fn bytes_mut(&mut self) -> Result<&mut [u8], BufferError> {
        match Arc::get_mut(&mut self.storage) {
            Some(storage) => Ok(&mut storage.bytes),
            None => Err(BufferError::invalid(
                "Chunk is shared with a slice and cannot be modified.",
            )),
        }
    }

    /// Returns another handle to the same storage.
    pub fn fork(&self) -> Chunk {
        Chunk {
            storage: Arc::clone(&self.storage),
        }
    }

    /// True when both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Chunk) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.len())
            .field("pooled", &self.storage.home.is_some())
            .finish()
    }
}

/// Supplies chunks to growable buffers.
///
/// `requested_size` is a hint; a source is free to return a chunk of any
/// non-zero size. Sources are shared between buffers, possibly across
/// threads, so they take `&self` and synchronize internally.
pub trait ChunkSource: Send + Sync {
    fn get_chunk(&self, requested_size: usize) -> Result<Chunk, BufferError>;
}

impl<T: ChunkSource + ?Sized> ChunkSource for Arc<T> {
    fn get_chunk(&self, requested_size: usize) -> Result<Chunk, BufferError> {
        (**self).get_chunk(requested_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chunk_is_zeroed() {
        let chunk = Chunk::new(4);
        assert_eq!(chunk.bytes(), &[0, 0, 0, 0]);
        assert_eq!(chunk.len(), 4);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn bytes_mut_fails_when_forked() {
        let mut chunk = Chunk::from_vec(vec![1, 2, 3]);
        chunk.bytes_mut().unwrap()[0] = 9;
        let fork = chunk.fork();
        assert!(fork.ptr_eq(&chunk));
        assert!(matches!(
            chunk.bytes_mut(),
            Err(BufferError::InvalidOperation(_))
        ));
        drop(fork);
        // Unique again once the fork is gone
        assert!(chunk.bytes_mut().is_ok());
        assert_eq!(chunk.bytes(), &[9, 2, 3]);
    }

    #[test]
    fn fork_keeps_storage_alive() {
        let chunk = Chunk::from_vec(vec![7, 8]);
        let fork = chunk.fork();
        drop(chunk);
        assert_eq!(fork.bytes(), &[7, 8]);
    }
}
