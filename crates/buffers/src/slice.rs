use crate::byte_buffer::{check_byte_position, check_count, check_position, check_slice, ByteBuffer};
use crate::BufferError;

const NAME: &str = "ByteBufferSlice";

/// A read-only window `[offset, offset + length)` over another buffer.
///
/// The wrapped buffer is owned by the slice (it is built from forked chunks),
/// so the slice is independent of the buffer it was cut from.
pub struct ByteBufferSlice {
    buffer: Option<Box<dyn ByteBuffer>>,
    offset: usize,
    length: usize,
}

impl ByteBufferSlice {
    pub fn new(buffer: Box<dyn ByteBuffer>, offset: usize, length: usize) -> Result<Self, BufferError> {
        if !buffer.is_read_only()? {
            return Err(BufferError::invalid(
                "The buffer is not read only.",
            ));
        }
        check_slice(offset, length, buffer.length()?)?;
        Ok(Self {
            buffer: Some(buffer),
            offset,
            length,
        })
    }

    fn inner(&self) -> Result<&dyn ByteBuffer, BufferError> {
        match &self.buffer {
            Some(buffer) => Ok(buffer.as_ref()),
            None => Err(BufferError::Disposed(NAME)),
        }
    }
}

impl ByteBuffer for ByteBufferSlice {
    fn capacity(&self) -> Result<usize, BufferError> {
        self.inner()?;
        Ok(self.length)
    }

    fn is_read_only(&self) -> Result<bool, BufferError> {
        self.inner()?;
        Ok(true)
    }

    fn length(&self) -> Result<usize, BufferError> {
        self.inner()?;
        Ok(self.length)
    }

    fn set_length(&mut self, _length: usize) -> Result<(), BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError> {
        let inner = self.inner()?;
        check_position(position, self.length)?;
        let bytes = inner.access_backing_bytes(self.offset + position)?;
        let count = bytes.len().min(self.length - position);
        Ok(&bytes[..count])
    }

    fn access_backing_bytes_mut(&mut self, _position: usize) -> Result<&mut [u8], BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn clear(&mut self, _position: usize, _count: usize) -> Result<(), BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn ensure_capacity(&mut self, _minimum_capacity: usize) -> Result<(), BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        let inner = self.inner()?;
        check_byte_position(position, self.length)?;
        inner.get_byte(self.offset + position)
    }

    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        let inner = self.inner()?;
        check_count(position, destination.len(), self.length)?;
        inner.get_bytes(self.offset + position, destination)
    }

    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        let inner = self.inner()?;
        check_slice(position, length, self.length)?;
        inner.get_slice(self.offset + position, length)
    }

    fn make_read_only(&mut self) -> Result<(), BufferError> {
        self.inner()?;
        Ok(())
    }

    fn set_byte(&mut self, _position: usize, _value: u8) -> Result<(), BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn set_bytes(&mut self, _position: usize, _source: &[u8]) -> Result<(), BufferError> {
        self.inner()?;
        Err(BufferError::read_only())
    }

    fn dispose(&mut self) {
        self.buffer = None;
    }

    fn is_disposed(&self) -> bool {
        self.buffer.is_none()
    }
}
