use std::sync::Arc;

use crate::byte_buffer::{
    check_byte_position, check_count, check_mutable, check_position, check_slice, ByteBuffer,
};
use crate::BufferError;

const NAME: &str = "ByteArrayBuffer";

/// A buffer over a single contiguous byte array. It cannot grow past the
/// array it was created with.
#[derive(Debug)]
pub struct ByteArrayBuffer {
    bytes: Option<Arc<Vec<u8>>>,
    slice_offset: usize,
    capacity: usize,
    length: usize,
    is_read_only: bool,
}

impl ByteArrayBuffer {
    /// A mutable buffer whose length is the full array.
    pub fn new(bytes: Vec<u8>) -> Self {
        let length = bytes.len();
        Self {
            capacity: length,
            bytes: Some(Arc::new(bytes)),
            slice_offset: 0,
            length,
            is_read_only: false,
        }
    }

    pub fn with_length(bytes: Vec<u8>, length: usize, is_read_only: bool) -> Result<Self, BufferError> {
        if length > bytes.len() {
            return Err(BufferError::out_of_range(
                "length",
                "Length is greater than the size of the byte array.",
            ));
        }
        Ok(Self {
            capacity: bytes.len(),
            bytes: Some(Arc::new(bytes)),
            slice_offset: 0,
            length,
            is_read_only,
        })
    }

    fn storage(&self) -> Result<&[u8], BufferError> {
        match &self.bytes {
            Some(bytes) => Ok(&bytes[self.slice_offset..self.slice_offset + self.capacity]),
            None => Err(BufferError::Disposed(NAME)),
        }
    }

    fn storage_mut(&mut self) -> Result<&mut [u8], BufferError> {
        let (offset, capacity) = (self.slice_offset, self.capacity);
        match &mut self.bytes {
            Some(bytes) => match Arc::get_mut(bytes) {
                Some(bytes) => Ok(&mut bytes[offset..offset + capacity]),
                None => Err(BufferError::invalid(
                    "Byte array is shared with a slice and cannot be modified.",
                )),
            },
            None => Err(BufferError::Disposed(NAME)),
        }
    }

    fn throw_if_disposed(&self) -> Result<(), BufferError> {
        if self.bytes.is_none() {
            return Err(BufferError::Disposed(NAME));
        }
        Ok(())
    }
}

impl ByteBuffer for ByteArrayBuffer {
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
        let length = self.length;
        let bytes = self.storage()?;
        check_position(position, length)?;
        Ok(&bytes[position..length])
    }

    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError> {
        self.throw_if_disposed()?;
        check_mutable(self.is_read_only)?;
        check_position(position, self.length)?;
        let length = self.length;
        let bytes = self.storage_mut()?;
        Ok(&mut bytes[position..length])
    }

    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_count(position, count, self.length)?;
        check_mutable(self.is_read_only)?;
        self.storage_mut()?[position..position + count].fill(0);
        Ok(())
    }

    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_mutable(self.is_read_only)?;
        if minimum_capacity > self.capacity {
            return Err(BufferError::invalid(
                "ByteArrayBuffer does not support expanding its capacity.",
            ));
        }
        Ok(())
    }

    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        let bytes = self.storage()?;
        check_byte_position(position, self.length)?;
        Ok(bytes[position])
    }

    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        let bytes = self.storage()?;
        check_count(position, destination.len(), self.length)?;
        destination.copy_from_slice(&bytes[position..position + destination.len()]);
        Ok(())
    }

    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        let bytes = match &self.bytes {
            Some(bytes) => bytes,
            None => return Err(BufferError::Disposed(NAME)),
        };
        check_slice(position, length, self.length)?;
        if !self.is_read_only {
            return Err(BufferError::invalid(
                "GetSlice can only be called for read only buffers.",
            ));
        }
        Ok(Box::new(ByteArrayBuffer {
            bytes: Some(Arc::clone(bytes)),
            slice_offset: self.slice_offset + position,
            capacity: length,
            length,
            is_read_only: true,
        }))
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
        self.storage_mut()?[position] = value;
        Ok(())
    }

    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError> {
        self.throw_if_disposed()?;
        check_count(position, source.len(), self.length)?;
        check_mutable(self.is_read_only)?;
        self.storage_mut()?[position..position + source.len()].copy_from_slice(source);
        Ok(())
    }

    fn dispose(&mut self) {
        self.bytes = None;
    }

    fn is_disposed(&self) -> bool {
        self.bytes.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(bytes: &[u8]) -> ByteArrayBuffer {
        ByteArrayBuffer::new(bytes.to_vec())
    }

    #[test]
    fn access_backing_bytes_is_capped_at_length() {
        for (length, expected) in [(0usize, 0usize), (1, 1), (2, 2)] {
            let buffer = ByteArrayBuffer::with_length(vec![0; 2], length, false).unwrap();
            assert_eq!(buffer.access_backing_bytes(0).unwrap().len(), expected);
        }
        let buffer = subject(&[1, 2]);
        assert_eq!(buffer.access_backing_bytes(1).unwrap(), &[2]);
        assert!(buffer.access_backing_bytes(2).unwrap().is_empty());
        assert_eq!(
            buffer.access_backing_bytes(3).unwrap_err().param(),
            Some("position")
        );
    }

    #[test]
    fn clear_zero_fills_range() {
        let mut buffer = subject(&[1, 2, 3]);
        buffer.clear(1, 2).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), vec![1, 0, 0]);
        assert_eq!(buffer.clear(2, 2).unwrap_err().param(), Some("count"));
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut buffer = subject(&[1, 2, 3]);
        buffer.make_read_only().unwrap();
        // Idempotent
        buffer.make_read_only().unwrap();
        assert!(matches!(buffer.set_byte(0, 1), Err(BufferError::InvalidOperation(_))));
        assert!(matches!(buffer.set_bytes(0, &[1]), Err(BufferError::InvalidOperation(_))));
        assert!(matches!(buffer.clear(0, 1), Err(BufferError::InvalidOperation(_))));
        assert!(matches!(buffer.set_length(1), Err(BufferError::InvalidOperation(_))));
        assert!(matches!(buffer.ensure_capacity(1), Err(BufferError::InvalidOperation(_))));
    }

    #[test]
    fn set_length_within_capacity() {
        let mut buffer = ByteArrayBuffer::with_length(vec![0; 4], 1, false).unwrap();
        buffer.set_length(4).unwrap();
        assert_eq!(buffer.length().unwrap(), 4);
        buffer.set_length(0).unwrap();
        assert_eq!(buffer.set_length(5).unwrap_err().param(), Some("length"));
    }

    #[test]
    fn ensure_capacity_cannot_grow() {
        let mut buffer = subject(&[0; 4]);
        buffer.ensure_capacity(4).unwrap();
        assert!(matches!(buffer.ensure_capacity(5), Err(BufferError::InvalidOperation(_))));
    }

    #[test]
    fn get_slice_requires_read_only() {
        let buffer = subject(&[1, 2, 3]);
        assert!(matches!(buffer.get_slice(0, 1), Err(BufferError::InvalidOperation(_))));
    }

    #[test]
    fn slice_shares_storage_and_survives_parent() {
        let mut parent = subject(&[1, 2, 3]);
        parent.make_read_only().unwrap();
        let backing = parent.access_backing_bytes(0).unwrap().as_ptr();
        let mut slice = parent.get_slice(1, 1).unwrap();
        assert_eq!(slice.access_backing_bytes(0).unwrap().as_ptr(), backing.wrapping_add(1));
        assert_eq!(slice.access_backing_bytes(0).unwrap(), &[2]);
        parent.dispose();
        assert_eq!(slice.get_byte(0).unwrap(), 2);
        slice.dispose();
        slice.dispose();
        assert_eq!(slice.get_byte(0), Err(BufferError::Disposed(NAME)));
    }

    #[test]
    fn disposed_buffer_rejects_everything() {
        let mut buffer = subject(&[1]);
        buffer.dispose();
        assert!(buffer.is_disposed());
        assert_eq!(buffer.length(), Err(BufferError::Disposed(NAME)));
        assert_eq!(buffer.capacity(), Err(BufferError::Disposed(NAME)));
        assert_eq!(buffer.get_byte(0), Err(BufferError::Disposed(NAME)));
        assert!(matches!(buffer.set_byte(0, 1), Err(BufferError::Disposed(_))));
    }
}
