use std::sync::{Arc, Mutex};

use log::debug;

use crate::chunk::{Chunk, ChunkSource};
use crate::BufferError;

/// Chunk source tuned for output buffers of unknown final size.
///
/// The first chunk is a small unpooled one, so tiny documents never touch the
/// pool. Later chunks are requested from the wrapped source with sizes that
/// double from `min_chunk_size` up to `max_chunk_size`.
pub struct OutputBufferChunkSource {
    base: Arc<dyn ChunkSource>,
    initial_unpooled_chunk_size: usize,
    min_chunk_size: usize,
    max_chunk_size: usize,
    previous_chunk_size: Mutex<Option<usize>>,
}

impl OutputBufferChunkSource {
    pub fn new(
        base: Arc<dyn ChunkSource>,
        initial_unpooled_chunk_size: usize,
        min_chunk_size: usize,
        max_chunk_size: usize,
    ) -> Result<Self, BufferError> {
        if min_chunk_size == 0 {
            return Err(BufferError::out_of_range(
                "min_chunk_size",
                "Minimum chunk size must be greater than zero.",
            ));
        }
        if max_chunk_size < min_chunk_size {
            return Err(BufferError::out_of_range(
                "max_chunk_size",
                "Maximum chunk size must not be less than the minimum chunk size.",
            ));
        }
        Ok(Self {
            base,
            initial_unpooled_chunk_size,
            min_chunk_size,
            max_chunk_size,
            previous_chunk_size: Mutex::new(None),
        })
    }

    /// 1KB unpooled, then 16KB doubling up to 1MB.
    pub fn with_defaults(base: Arc<dyn ChunkSource>) -> Self {
        Self {
            base,
            initial_unpooled_chunk_size: 1024,
            min_chunk_size: 16 * 1024,
            max_chunk_size: 1024 * 1024,
            previous_chunk_size: Mutex::new(None),
        }
    }

    fn next_chunk_size(&self, previous: Option<usize>) -> usize {
        match previous {
            None => self.min_chunk_size,
            Some(size) => size
                .saturating_mul(2)
                .clamp(self.min_chunk_size, self.max_chunk_size),
        }
    }
}

impl ChunkSource for OutputBufferChunkSource {
    fn get_chunk(&self, _requested_size: usize) -> Result<Chunk, BufferError> {
        let mut previous = self
            .previous_chunk_size
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if previous.is_none() && self.initial_unpooled_chunk_size != 0 {
            *previous = Some(self.initial_unpooled_chunk_size);
            return Ok(Chunk::new(self.initial_unpooled_chunk_size));
        }
        // The initial unpooled chunk does not count towards the doubling.
        let last = (*previous).filter(|&size| size >= self.min_chunk_size);
        let size = self.next_chunk_size(last);
        debug!("output chunk source requesting {size} bytes");
        let chunk = self.base.get_chunk(size)?;
        *previous = Some(size);
        Ok(chunk)
    }
}
