//! The byte buffer contract shared by every buffer shape.

use std::sync::Arc;

use crate::chunk::ChunkSource;
use crate::multi_chunk_buffer::MultiChunkBuffer;
use crate::single_chunk_buffer::SingleChunkBuffer;
use crate::BufferError;

/// Largest length or capacity any buffer may reach (2GB - 1).
pub const MAX_BUFFER_SIZE: usize = i32::MAX as usize;

/// A logical run of bytes with a length no greater than its capacity.
///
/// Buffers start out mutable and can be made read-only once, irreversibly.
/// Slices can only be taken from read-only buffers; a slice shares the
/// underlying storage and stays valid after its parent is disposed.
///
/// Every operation on a disposed buffer fails with [`BufferError::Disposed`].
pub trait ByteBuffer: Send {
    fn capacity(&self) -> Result<usize, BufferError>;

    fn is_read_only(&self) -> Result<bool, BufferError>;

    fn length(&self) -> Result<usize, BufferError>;

    /// Sets the length. Shrinking is always allowed on a mutable buffer;
    /// growing requires the capacity to already be there.
    fn set_length(&mut self, length: usize) -> Result<(), BufferError>;

    /// The largest contiguous run of bytes starting at `position`, capped at
    /// the buffer length. Empty when `position == length`.
    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError>;

    /// Mutable counterpart of [`access_backing_bytes`](ByteBuffer::access_backing_bytes).
    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError>;

    /// Zero-fills `count` bytes starting at `position`.
    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError>;

    /// Grows the capacity to at least `minimum_capacity`. Never shrinks.
    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError>;

    fn get_byte(&self, position: usize) -> Result<u8, BufferError>;

    /// Copies `destination.len()` bytes starting at `position`.
    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError>;

    /// A read-only view of `length` bytes starting at `position`.
    fn get_slice(&self, position: usize, length: usize)
        -> Result<Box<dyn ByteBuffer>, BufferError>;

    fn make_read_only(&mut self) -> Result<(), BufferError>;

    fn set_byte(&mut self, position: usize, value: u8) -> Result<(), BufferError>;

    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError>;

    /// Releases the storage. Calling it again is a no-op.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;

    /// Copies the whole buffer (up to its length) into a new vector.
    fn to_vec(&self) -> Result<Vec<u8>, BufferError> {
        let mut bytes = vec![0u8; self.length()?];
        self.get_bytes(0, &mut bytes)?;
        Ok(bytes)
    }
}

impl ByteBuffer for Box<dyn ByteBuffer> {
    fn capacity(&self) -> Result<usize, BufferError> {
        (**self).capacity()
    }
    fn is_read_only(&self) -> Result<bool, BufferError> {
        (**self).is_read_only()
    }
    fn length(&self) -> Result<usize, BufferError> {
        (**self).length()
    }
    fn set_length(&mut self, length: usize) -> Result<(), BufferError> {
        (**self).set_length(length)
    }
    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError> {
        (**self).access_backing_bytes(position)
    }
    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError> {
        (**self).access_backing_bytes_mut(position)
    }
    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        (**self).clear(position, count)
    }
    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        (**self).ensure_capacity(minimum_capacity)
    }
    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        (**self).get_byte(position)
    }
    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        (**self).get_bytes(position, destination)
    }
    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        (**self).get_slice(position, length)
    }
    fn make_read_only(&mut self) -> Result<(), BufferError> {
        (**self).make_read_only()
    }
    fn set_byte(&mut self, position: usize, value: u8) -> Result<(), BufferError> {
        (**self).set_byte(position, value)
    }
    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError> {
        (**self).set_bytes(position, source)
    }
    fn dispose(&mut self) {
        (**self).dispose()
    }
    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

/// Lets a stream or reader borrow a buffer it does not own.
impl<T: ByteBuffer + ?Sized> ByteBuffer for &mut T {
    fn capacity(&self) -> Result<usize, BufferError> {
        (**self).capacity()
    }
    fn is_read_only(&self) -> Result<bool, BufferError> {
        (**self).is_read_only()
    }
    fn length(&self) -> Result<usize, BufferError> {
        (**self).length()
    }
    fn set_length(&mut self, length: usize) -> Result<(), BufferError> {
        (**self).set_length(length)
    }
    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError> {
        (**self).access_backing_bytes(position)
    }
    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError> {
        (**self).access_backing_bytes_mut(position)
    }
    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        (**self).clear(position, count)
    }
    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        (**self).ensure_capacity(minimum_capacity)
    }
    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        (**self).get_byte(position)
    }
    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        (**self).get_bytes(position, destination)
    }
    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        (**self).get_slice(position, length)
    }
    fn make_read_only(&mut self) -> Result<(), BufferError> {
        (**self).make_read_only()
    }
    fn set_byte(&mut self, position: usize, value: u8) -> Result<(), BufferError> {
        (**self).set_byte(position, value)
    }
    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError> {
        (**self).set_bytes(position, source)
    }
    fn dispose(&mut self) {
        (**self).dispose()
    }
    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

// ----------------------------------------------------------------
// Argument checks shared by the buffer implementations

#[inline]
pub(crate) fn check_position(position: usize, length: usize) -> Result<(), BufferError> {
    if position > length {
        return Err(BufferError::out_of_range(
            "position",
            "Position is outside of the buffer.",
        ));
    }
    Ok(())
}

#[inline]
pub(crate) fn check_byte_position(position: usize, length: usize) -> Result<(), BufferError> {
    if position >= length {
        return Err(BufferError::out_of_range(
            "position",
            "Position is outside of the buffer.",
        ));
    }
    Ok(())
}

#[inline]
pub(crate) fn check_count(position: usize, count: usize, length: usize) -> Result<(), BufferError> {
    check_position(position, length)?;
    if count > length - position {
        return Err(BufferError::out_of_range(
            "count",
            "Count extends past the end of the buffer.",
        ));
    }
    Ok(())
}

#[inline]
pub(crate) fn check_slice(position: usize, length: usize, buffer_length: usize) -> Result<(), BufferError> {
    check_position(position, buffer_length)?;
    if length > buffer_length - position {
        return Err(BufferError::out_of_range(
            "length",
            "Length extends past the end of the buffer.",
        ));
    }
    Ok(())
}

#[inline]
pub(crate) fn check_mutable(is_read_only: bool) -> Result<(), BufferError> {
    if is_read_only {
        return Err(BufferError::read_only());
    }
    Ok(())
}

/// Creates a buffer able to hold at least `minimum_capacity` bytes.
///
/// When the first chunk from `chunk_source` is large enough the result is a
/// single-chunk buffer; otherwise a multi-chunk buffer that keeps drawing from
/// the same source as it grows.
pub fn create_buffer(
    chunk_source: Arc<dyn ChunkSource>,
    minimum_capacity: usize,
) -> Result<Box<dyn ByteBuffer>, BufferError> {
    if minimum_capacity == 0 {
        return Err(BufferError::out_of_range(
            "minimum_capacity",
            "Minimum capacity must be greater than zero.",
        ));
    }
    if minimum_capacity > MAX_BUFFER_SIZE {
        return Err(BufferError::invalid("Capacity is limited to 2GB."));
    }
    let chunk = chunk_source.get_chunk(minimum_capacity)?;
    if chunk.len() >= minimum_capacity {
        return Ok(Box::new(SingleChunkBuffer::new(chunk, 0, false)?));
    }
    let mut buffer = MultiChunkBuffer::new(chunk_source);
    buffer.push_chunk(chunk)?;
    buffer.ensure_capacity(minimum_capacity)?;
    Ok(Box::new(buffer))
}
