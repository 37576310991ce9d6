use crate::byte_buffer::{
    check_byte_position, check_count, check_mutable, check_position, check_slice, ByteBuffer,
};
use crate::chunk::Chunk;
use crate::slice::ByteBufferSlice;
use crate::BufferError;

const NAME: &str = "SingleChunkBuffer";

/// A buffer backed by exactly one chunk. Its capacity is the chunk size.
#[derive(Debug)]
pub struct SingleChunkBuffer {
    chunk: Option<Chunk>,
    length: usize,
    is_read_only: bool,
}

impl SingleChunkBuffer {
    pub fn new(chunk: Chunk, length: usize, is_read_only: bool) -> Result<Self, BufferError> {
        if length > chunk.len() {
            return Err(BufferError::out_of_range(
                "length",
                "Length exceeds the size of the chunk.",
            ));
        }
        Ok(Self {
            chunk: Some(chunk),
            length,
            is_read_only,
        })
    }

    fn chunk(&self) -> Result<&Chunk, BufferError> {
        self.chunk.as_ref().ok_or(BufferError::Disposed(NAME))
    }

    fn chunk_bytes_mut(&mut self) -> Result<&mut [u8], BufferError> {
        match &mut self.chunk {
            Some(chunk) => chunk.bytes_mut(),
            None => Err(BufferError::Disposed(NAME)),
        }
    }
}

impl ByteBuffer for SingleChunkBuffer {
    fn capacity(&self) -> Result<usize, BufferError> {
        Ok(self.chunk()?.len())
    }

    fn is_read_only(&self) -> Result<bool, BufferError> {
        self.chunk()?;
        Ok(self.is_read_only)
    }

    fn length(&self) -> Result<usize, BufferError> {
        self.chunk()?;
        Ok(self.length)
    }

    fn set_length(&mut self, length: usize) -> Result<(), BufferError> {
        let capacity = self.chunk()?.len();
        check_mutable(self.is_read_only)?;
        if length > capacity {
            return Err(BufferError::out_of_range(
                "length",
                "Length is greater than the capacity.",
            ));
        }
        self.length = length;
        Ok(())
    }

    fn access_backing_bytes(&self, position: usize) -> Result<&[u8], BufferError> {
        let chunk = self.chunk()?;
        check_position(position, self.length)?;
        Ok(&chunk.bytes()[position..self.length])
    }

    fn access_backing_bytes_mut(&mut self, position: usize) -> Result<&mut [u8], BufferError> {
        self.chunk()?;
        check_mutable(self.is_read_only)?;
        check_position(position, self.length)?;
        let length = self.length;
        Ok(&mut self.chunk_bytes_mut()?[position..length])
    }

    fn clear(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        self.chunk()?;
        check_count(position, count, self.length)?;
        check_mutable(self.is_read_only)?;
        self.chunk_bytes_mut()?[position..position + count].fill(0);
        Ok(())
    }

    fn ensure_capacity(&mut self, minimum_capacity: usize) -> Result<(), BufferError> {
        let capacity = self.chunk()?.len();
        check_mutable(self.is_read_only)?;
        if minimum_capacity > capacity {
            return Err(BufferError::invalid(
                "SingleChunkBuffer does not support expanding its capacity.",
            ));
        }
        Ok(())
    }

    fn get_byte(&self, position: usize) -> Result<u8, BufferError> {
        let chunk = self.chunk()?;
        check_byte_position(position, self.length)?;
        Ok(chunk.bytes()[position])
    }

    fn get_bytes(&self, position: usize, destination: &mut [u8]) -> Result<(), BufferError> {
        let chunk = self.chunk()?;
        check_count(position, destination.len(), self.length)?;
        destination.copy_from_slice(&chunk.bytes()[position..position + destination.len()]);
        Ok(())
    }

    fn get_slice(
        &self,
        position: usize,
        length: usize,
    ) -> Result<Box<dyn ByteBuffer>, BufferError> {
        let chunk = self.chunk()?;
        check_slice(position, length, self.length)?;
        if !self.is_read_only {
            return Err(BufferError::invalid(
                "GetSlice can only be called for read only buffers.",
            ));
        }
        let forked = SingleChunkBuffer {
            chunk: Some(chunk.fork()),
            length: self.length,
            is_read_only: true,
        };
        Ok(Box::new(ByteBufferSlice::new(Box::new(forked), position, length)?))
    }

    fn make_read_only(&mut self) -> Result<(), BufferError> {
        self.chunk()?;
        self.is_read_only = true;
        Ok(())
    }

    fn set_byte(&mut self, position: usize, value: u8) -> Result<(), BufferError> {
        self.chunk()?;
        check_byte_position(position, self.length)?;
        check_mutable(self.is_read_only)?;
        self.chunk_bytes_mut()?[position] = value;
        Ok(())
    }

    fn set_bytes(&mut self, position: usize, source: &[u8]) -> Result<(), BufferError> {
        self.chunk()?;
        check_count(position, source.len(), self.length)?;
        check_mutable(self.is_read_only)?;
        self.chunk_bytes_mut()?[position..position + source.len()].copy_from_slice(source);
        Ok(())
    }

    fn dispose(&mut self) {
        self.chunk = None;
    }

    fn is_disposed(&self) -> bool {
        self.chunk.is_none()
    }
}
