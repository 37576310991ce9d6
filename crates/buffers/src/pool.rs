//! Chunk pooling.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::debug;

use crate::chunk::{Chunk, ChunkSource};
use crate::BufferError;

const DEFAULT_MAX_CHUNK_COUNT: usize = 8192;
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub(crate) struct PoolShared {
    chunk_size: usize,
    max_chunk_count: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl PoolShared {
    fn free(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A panic while holding the lock cannot leave the free list torn.
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn release(&self, bytes: Vec<u8>) {
        if bytes.len() != self.chunk_size {
            return;
        }
        let mut free = self.free();
        if free.len() < self.max_chunk_count {
            free.push(bytes);
            debug!("chunk returned to pool ({} free)", free.len());
        }
    }
}

/// A pool of fixed-size chunks.
///
/// Chunks handed out by the pool find their way back when the last handle to
/// them is dropped. At most `max_chunk_count` idle chunks are retained; the
/// rest are freed. Clones share the same pool.
#[derive(Debug, Clone)]
pub struct BsonChunkPool {
    shared: Arc<PoolShared>,
}

impl BsonChunkPool {
    pub fn new(max_chunk_count: usize, chunk_size: usize) -> Result<Self, BufferError> {
        if chunk_size == 0 {
            return Err(BufferError::out_of_range(
                "chunk_size",
                "Chunk size must be greater than zero.",
            ));
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                chunk_size,
                max_chunk_count,
                free: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The process-wide pool: up to 8192 idle chunks of 64KB.
    pub fn default_pool() -> BsonChunkPool {
        static DEFAULT: OnceLock<BsonChunkPool> = OnceLock::new();
        DEFAULT
            .get_or_init(|| BsonChunkPool {
                shared: Arc::new(PoolShared {
                    chunk_size: DEFAULT_CHUNK_SIZE,
                    max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
                    free: Mutex::new(Vec::new()),
                }),
            })
            .clone()
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }

    pub fn max_chunk_count(&self) -> usize {
        self.shared.max_chunk_count
    }

    /// Number of idle chunks currently held by the pool.
    pub fn chunk_count(&self) -> usize {
        self.shared.free().len()
    }

    /// Frees every idle chunk.
    pub fn clear(&self) {
        self.shared.free().clear();
    }
}

impl ChunkSource for BsonChunkPool {
    fn get_chunk(&self, _requested_size: usize) -> Result<Chunk, BufferError> {
        let reused = self.shared.free().pop();
        let bytes = match reused {
            Some(bytes) => {
                debug!("chunk reused from pool");
                bytes
            }
            None => {
                debug!("chunk allocated ({} bytes)", self.shared.chunk_size);
                vec![0u8; self.shared.chunk_size]
            }
        };
        Ok(Chunk::pooled(bytes, Arc::downgrade(&self.shared)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_chunk_size() {
        let err = BsonChunkPool::new(1, 0).unwrap_err();
        assert_eq!(err.param(), Some("chunk_size"));
    }

    #[test]
    fn chunks_have_pool_size() {
        let pool = BsonChunkPool::new(4, 16).unwrap();
        let chunk = pool.get_chunk(1000).unwrap();
        assert_eq!(chunk.len(), 16);
    }

    #[test]
    fn dropped_chunks_are_reused() {
        let pool = BsonChunkPool::new(4, 16).unwrap();
        let chunk = pool.get_chunk(16).unwrap();
        assert_eq!(pool.chunk_count(), 0);
        drop(chunk);
        assert_eq!(pool.chunk_count(), 1);
        let _again = pool.get_chunk(16).unwrap();
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    fn forked_chunk_returns_once() {
        let pool = BsonChunkPool::new(4, 8).unwrap();
        let chunk = pool.get_chunk(8).unwrap();
        let fork = chunk.fork();
        drop(chunk);
        assert_eq!(pool.chunk_count(), 0);
        drop(fork);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn idle_chunks_are_capped() {
        let pool = BsonChunkPool::new(1, 8).unwrap();
        let a = pool.get_chunk(8).unwrap();
        let b = pool.get_chunk(8).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.chunk_count(), 1);
        pool.clear();
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    fn pool_is_shared_across_threads() {
        let pool = BsonChunkPool::new(64, 8).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..16 {
                        let chunk = pool.get_chunk(8).unwrap();
                        assert_eq!(chunk.len(), 8);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.chunk_count() <= 4);
        assert!(pool.chunk_count() >= 1);
    }
}
