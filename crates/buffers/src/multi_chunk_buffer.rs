//! A growable buffer made of a list of chunks.
//!
//! Chunks may have different sizes. `positions[i]` is the logical offset of
//! the first byte of chunk `i`, and `positions[chunks.len()]` is the capacity,
//! so resolving a position to `(chunk, offset)` is a binary search.

use std::sync::Arc;

use log::debug;

use crate::byte_buffer::{
    check_byte_position, check_count, check_mutable, check_position, check_slice, ByteBuffer,
    MAX_BUFFER_SIZE,
};
use crate::chunk::{Chunk, ChunkSource};
use crate::slice::ByteBufferSlice;
use crate::BufferError;

const NAME: &str = "MultiChunkBuffer";

pub struct MultiChunkBuffer {
    chunks: Vec<Chunk>,
    positions: Vec<usize>,
    capacity: usize,
    length: usize,
    is_read_only: bool,
    chunk_source: Option<Arc<dyn ChunkSource>>,
    disposed: bool,
}

impl MultiChunkBuffer {
    /// An empty buffer that grows by drawing chunks from `chunk_source`.
    pub fn new(chunk_source: Arc<dyn ChunkSource>) -> Self {
        Self {
            chunks: Vec::new(),
            positions: vec![0],
            capacity: 0,
            length: 0,
            is_read_only: false,
            chunk_source: Some(chunk_source),
            disposed: false,
        }
    }

    /// A fixed buffer over the given chunks. `length` defaults to the total
    /// size of the chunks. Without a chunk source the buffer cannot grow.
    pub fn from_chunks(
        chunks: Vec<Chunk>,
        length: Option<usize>,
        is_read_only: bool,
    ) -> Result<Self, BufferError> {
        let positions = compute_positions(&chunks);
        let capacity = positions[chunks.len()];
        if capacity > MAX_BUFFER_SIZE {
            return Err(BufferError::invalid("Capacity is limited to 2GB."));
        }
        let length = length.unwrap_or(capacity);
        if length > capacity {
            return Err(BufferError::out_of_range(
                "length",
                "Length exceeds the total size of the chunks.",
            ));
        }
        Ok(Self {
            chunks,
            positions,
            capacity,
            length,
            is_read_only,
            chunk_source: None,
            disposed: false,
        })
    }

    /// Start offsets of every chunk followed by the capacity.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk_source(&self) -> Option<&Arc<dyn ChunkSource>> {
        self.chunk_source.as_ref()
    }

    pub(crate) fn push_chunk(&mut self, chunk: Chunk) -> Result<(), BufferError> {
        let new_capacity = self.capacity + chunk.len();
        if new_capacity > MAX_BUFFER_SIZE {
            return Err(BufferError::invalid("Capacity is limited to 2GB."));
        }
        self.chunks.push(chunk);
        self.positions.push(new_capacity);
        self.capacity = new_capacity;
        Ok(())
    }

    fn throw_if_disposed(&self) -> Result<(), BufferError> {
        if self.disposed {
            return Err(BufferError::Disposed(NAME));
        }
        Ok(())
    }

    /// Index of the chunk holding `position`. A position equal to the
    /// capacity maps to the last chunk.
    fn chunk_index(&self, position: usize) -> usize {
        let index = self.positions.partition_point(|&start| start <= position);
        index.saturating_sub(1).min(self.chunks.len().saturating_sub(1))
    }

    fn expand_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        let source = match &self.chunk_source {
            Some(source) => Arc::clone(source),
            None => {
                return Err(BufferError::invalid(
                    "Capacity cannot be expanded because this buffer was created without a chunk source.",
                ))
            }
        };
        while self.capacity < minimum_capacity {
            let requested = match self.chunks.last() {
                Some(last) => last.len().saturating_mul(2).max(1),
                None => minimum_capacity - self.capacity,
            };
            let chunk = source.get_chunk(requested)?;
            if chunk.is_empty() {
                return Err(BufferError::invalid("Chunk source returned an empty chunk."));
            }
            self.push_chunk(chunk)?;
            debug!(
                "multi-chunk buffer grew to {} bytes in {} chunks",
                self.capacity,
                self.chunks.len()
            );
        }
        Ok(())
    }
}

fn compute_positions(chunks: &[Chunk]) -> Vec<usize> {
    let mut positions = Vec::with_capacity(chunks.len() + 1);
    let mut position = 0usize;
    positions.push(position);
    for chunk in chunks {
        position = position.saturating_add(chunk.len());
        positions.push(position);
    }
    positions
}

impl ByteBuffer for MultiChunkBuffer {
    fn capacity(&self) -> Result<usize, BufferError> {
        self.throw_if_disposed()?;
        Ok(self.capacity)
    }

    fn is_read_only(&self) -> Result<bool, BufferError> {
        self.throw_if_disposed()?;
        Ok(self.is_read_only)
    }

    fn length(&self) -> Result<usize, BufferError> {
        self.throw_if_disposed()?;
        Ok(self.length)
    }

    fn set_length(&mut self, length: usize) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_mutable(self.is_read_only)?;
        if length > self.capacity {
            return Err(BufferError::out_of_range(
                "length",
                "Length is greater than the capacity.",
            ));
        }
        self.length = length;
        Ok(())
    }

    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError> {
        self.throw_if_disposed()?;
        check_position(position, self.length)?;
        if self.chunks.is_empty() {
            return Ok(&[]);
        }
        let index = self.chunk_index(position);
        let offset = position - self.positions[index];
        let bytes = &self.chunks[index].bytes()[offset..];
        let count = bytes.len().min(self.length - position);
        Ok(&bytes[..count])
    }

    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError> {
        self.throw_if_disposed()?;
        check_mutable(self.is_read_only)?;
        check_position(position, self.length)?;
        if self.chunks.is_empty() {
            return Ok(&mut []);
        }
        let index = self.chunk_index(position);
        let offset = position - self.positions[index];
        let remaining = self.length - position;
        let bytes = &mut self.chunks[index].bytes_mut()?[offset..];
        let count = bytes.len().min(remaining);
        Ok(&mut bytes[..count])
    }

    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_count(position, count, self.length)?;
        check_mutable(self.is_read_only)?;
        let mut index = self.chunk_index(position);
        let mut offset = position - self.positions[index];
        let mut remaining = count;
        while remaining > 0 {
            let bytes = &mut self.chunks[index].bytes_mut()?[offset..];
            let n = bytes.len().min(remaining);
            bytes[..n].fill(0);
            remaining -= n;
            index += 1;
            offset = 0;
        }
        Ok(())
    }

    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_mutable(self.is_read_only)?;
        if minimum_capacity > MAX_BUFFER_SIZE {
            return Err(BufferError::invalid("Capacity is limited to 2GB."));
        }
        if self.capacity < minimum_capacity {
            self.expand_capacity(minimum_capacity)?;
        }
        Ok(())
    }

    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        self.throw_if_disposed()?;
        check_byte_position(position, self.length)?;
        let index = self.chunk_index(position);
        Ok(self.chunks[index].bytes()[position - self.positions[index]])
    }

    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_count(position, destination.len(), self.length)?;
        let mut index = self.chunk_index(position);
        let mut offset = position - self.positions[index];
        let mut written = 0;
        while written < destination.len() {
            let bytes = &self.chunks[index].bytes()[offset..];
            let n = bytes.len().min(destination.len() - written);
            destination[written..written + n].copy_from_slice(&bytes[..n]);
            written += n;
            index += 1;
            offset = 0;
        }
        Ok(())
    }

    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        self.throw_if_disposed()?;
        check_slice(position, length, self.length)?;
        if !self.is_read_only {
            return Err(BufferError::invalid(
                "GetSlice can only be called for read only buffers.",
            ));
        }
        if self.chunks.is_empty() {
            let empty = MultiChunkBuffer::from_chunks(Vec::new(), Some(0), true)?;
            return Ok(Box::new(empty));
        }
        let first = self.chunk_index(position);
        let last = self.chunk_index((position + length).saturating_sub(1).max(position));
        let forked: Vec<Chunk> = self.chunks[first..=last].iter().map(Chunk::fork).collect();
        let offset = position - self.positions[first];
        let forked_length = self.positions[last + 1].min(self.length) - self.positions[first];
        let buffer = MultiChunkBuffer::from_chunks(forked, Some(forked_length), true)?;
        Ok(Box::new(ByteBufferSlice::new(Box::new(buffer), offset, length)?))
    }

    fn make_read_only(&mut self) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        self.is_read_only = true;
        Ok(())
    }

    fn set_byte(&mut self, position: usize, value: u8) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_byte_position(position, self.length)?;
        check_mutable(self.is_read_only)?;
        let index = self.chunk_index(position);
        let offset = position - self.positions[index];
        self.chunks[index].bytes_mut()?[offset] = value;
        Ok(())
    }

    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_count(position, source.len(), self.length)?;
        check_mutable(self.is_read_only)?;
        let mut index = self.chunk_index(position);
        let mut offset = position - self.positions[index];
        let mut read = 0;
        while read < source.len() {
            let bytes = &mut self.chunks[index].bytes_mut()?[offset..];
            let n = bytes.len().min(source.len() - read);
            bytes[..n].copy_from_slice(&source[read..read + n]);
            read += n;
            index += 1;
            offset = 0;
        }
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.chunks.clear();
            self.positions.truncate(1);
            self.capacity = 0;
            self.length = 0;
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
