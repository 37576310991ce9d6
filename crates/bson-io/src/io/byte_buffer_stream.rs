use bsonio_buffers::{ByteArrayBuffer, ByteBuffer, BufferError, MAX_BUFFER_SIZE};

use super::stream::{decode_utf8, BsonStream};
use crate::BsonError;

const NAME: &str = "ByteBufferStream";

/// A [`BsonStream`] over a [`ByteBuffer`].
///
/// The stream keeps its own length; while writing, the buffer's length is
/// kept at its capacity and trimmed back by [`ByteBufferStream::into_buffer`].
/// Positions and lengths are capped at 2GB.
pub struct ByteBufferStream<B: ByteBuffer> {
    buffer: B,
    owns_buffer: bool,
    position: usize,
    length: usize,
    disposed: bool,
}

impl<B: ByteBuffer> ByteBufferStream<B> {
    /// A stream that owns `buffer` and disposes it with itself.
    pub fn new(buffer: B) -> Result<Self, BsonError> {
        Self::with_ownership(buffer, true)
    }

    pub fn with_ownership(buffer: B, owns_buffer: bool) -> Result<Self, BsonError> {
        let length = buffer.length()?;
        Ok(Self {
            buffer,
            owns_buffer,
            position: 0,
            length,
            disposed: false,
        })
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn owns_buffer(&self) -> bool {
        self.owns_buffer
    }

    /// Gives the buffer back with its length set to the stream's length.
    pub fn into_buffer(mut self) -> Result<B, BsonError> {
        self.check_open()?;
        if !self.buffer.is_read_only()? {
            self.buffer.set_length(self.length)?;
        }
        self.disposed = true;
        Ok(self.buffer)
    }

    /// Idempotent. The buffer is disposed too when the stream owns it.
    pub fn dispose(&mut self) {
        if !self.disposed {
            if self.owns_buffer {
                self.buffer.dispose();
            }
            self.disposed = true;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn check_open(&self) -> Result<(), BsonError> {
        if self.disposed {
            return Err(BufferError::Disposed(NAME).into());
        }
        Ok(())
    }

    fn prepare_to_read(&self, count: usize) -> Result<(), BsonError> {
        self.check_open()?;
        if count > self.length.saturating_sub(self.position) {
            return Err(BsonError::EndOfStream);
        }
        Ok(())
    }

    /// Grows the buffer to cover `count` bytes at the current position and
    /// zero-fills any gap left by seeking past the end.
    fn prepare_to_write(&mut self, count: usize) -> Result<(), BsonError> {
        self.check_open()?;
        let end = self.position + count;
        if end > MAX_BUFFER_SIZE {
            return Err(BsonError::invalid_operation("Stream was too long."));
        }
        self.buffer.ensure_capacity(end)?;
        let capacity = self.buffer.capacity()?;
        self.buffer.set_length(capacity)?;
        if self.position > self.length {
            self.buffer.clear(self.length, self.position - self.length)?;
        }
        Ok(())
    }

    fn finish_write(&mut self, count: usize) {
        self.position += count;
        self.length = self.length.max(self.position);
    }

    fn find_null_byte(&self) -> Result<usize, BsonError> {
        let mut position = self.position;
        while position < self.length {
            let run = self.buffer.access_backing_bytes(position)?;
            let run = &run[..run.len().min(self.length - position)];
            if run.is_empty() {
                break;
            }
            if let Some(i) = run.iter().position(|&b| b == 0) {
                return Ok(position + i);
            }
            position += run.len();
        }
        Err(BsonError::EndOfStream)
    }
}

impl<B: ByteBuffer> BsonStream for ByteBufferStream<B> {
    fn position(&self) -> u64 {
        self.position as u64
    }

    fn set_position(&mut self, position: u64) -> Result<(), BsonError> {
        self.check_open()?;
        if position > MAX_BUFFER_SIZE as u64 {
            return Err(BsonError::invalid_argument(
                "position",
                "Attempted to seek beyond the maximum value that can be represented using 32 bits.",
            ));
        }
        self.position = position as usize;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length as u64
    }

    fn read_byte(&mut self) -> Result<u8, BsonError> {
        self.prepare_to_read(1)?;
        let value = self.buffer.get_byte(self.position)?;
        self.position += 1;
        Ok(value)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), BsonError> {
        if buffer.len() == 1 {
            buffer[0] = self.read_byte()?;
            return Ok(());
        }
        self.prepare_to_read(buffer.len())?;
        self.buffer.get_bytes(self.position, buffer)?;
        self.position += buffer.len();
        Ok(())
    }

    fn write_byte(&mut self, value: u8) -> Result<(), BsonError> {
        self.prepare_to_write(1)?;
        self.buffer.set_byte(self.position, value)?;
        self.finish_write(1);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BsonError> {
        if bytes.len() == 1 {
            return self.write_byte(bytes[0]);
        }
        self.prepare_to_write(bytes.len())?;
        self.buffer.set_bytes(self.position, bytes)?;
        self.finish_write(bytes.len());
        Ok(())
    }

    fn read_cstring_bytes(&mut self) -> Result<Vec<u8>, BsonError> {
        self.check_open()?;
        let null = self.find_null_byte()?;
        let mut bytes = vec![0u8; null - self.position];
        self.buffer.get_bytes(self.position, &mut bytes)?;
        self.position = null + 1;
        Ok(bytes)
    }

    fn read_cstring(&mut self) -> Result<String, BsonError> {
        self.check_open()?;
        let null = self.find_null_byte()?;
        // Names rarely cross a chunk boundary; decode straight from the chunk when they don't
        let run = self.buffer.access_backing_bytes(self.position)?;
        let count = null - self.position;
        let value = if run.len() >= count {
            std::str::from_utf8(&run[..count])
                .map(str::to_owned)
                .map_err(|e| BsonError::format(format!("Invalid UTF-8 in string: {e}.")))?
        } else {
            let mut bytes = vec![0u8; count];
            self.buffer.get_bytes(self.position, &mut bytes)?;
            decode_utf8(bytes)?
        };
        self.position = null + 1;
        Ok(value)
    }

    fn skip_cstring(&mut self) -> Result<(), BsonError> {
        self.check_open()?;
        self.position = self.find_null_byte()? + 1;
        Ok(())
    }

    /// Zero-copy when the buffer is read-only; a mutable buffer cannot be
    /// sliced, so the bytes are copied instead.
    fn read_slice(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        let start = self.position;
        let length = self.read_int32()?;
        self.position = start;
        if length < 5 {
            return Err(BsonError::format(format!("Invalid document size: {length}.")));
        }
        let length = length as usize;
        self.prepare_to_read(length)?;
        let slice: Box<dyn ByteBuffer> = if self.buffer.is_read_only()? {
            self.buffer.get_slice(start, length)?
        } else {
            let mut bytes = vec![0u8; length];
            self.buffer.get_bytes(start, &mut bytes)?;
            Box::new(ByteArrayBuffer::with_length(bytes, length, true)?)
        };
        self.position = start + length;
        Ok(slice)
    }
}
