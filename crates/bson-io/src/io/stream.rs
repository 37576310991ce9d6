//! Position-tracked, typed I/O over bytes.

use std::io::{Read, Seek, SeekFrom, Write};

use bsonio_buffers::{ByteArrayBuffer, ByteBuffer};

use crate::decimal128::Decimal128;
use crate::object_id::ObjectId;
use crate::values::{BsonBinarySubType, BsonType};
use crate::BsonError;

const MAX_SIZE: u64 = i32::MAX as u64;

/// A seekable byte stream with the typed primitives of the binary format.
///
/// Implementors supply the raw byte operations; the typed reads and writes
/// are layered on top. All integers are little-endian except the fields
/// inside an [`ObjectId`].
pub trait BsonStream {
    fn position(&self) -> u64;

    fn set_position(&mut self, position: u64) -> Result<(), BsonError>;

    fn length(&self) -> u64;

    /// Fails with [`BsonError::EndOfStream`] at the end of the stream.
    fn read_byte(&mut self) -> Result<u8, BsonError>;

    /// Fills `buffer` completely or fails with [`BsonError::EndOfStream`].
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), BsonError>;

    fn write_byte(&mut self, value: u8) -> Result<(), BsonError>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BsonError>;

    fn flush(&mut self) -> Result<(), BsonError> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, BsonError> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
            SeekFrom::End(delta) => self.length().checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            BsonError::invalid_argument("offset", "Attempted to seek before the beginning of the stream.")
        })?;
        self.set_position(target)?;
        Ok(target)
    }

    fn skip(&mut self, count: u64) -> Result<(), BsonError> {
        let target = self.position() + count;
        self.set_position(target)
    }

    fn read_vec(&mut self, count: usize) -> Result<Vec<u8>, BsonError> {
        if count as u64 > self.length().saturating_sub(self.position()) {
            return Err(BsonError::EndOfStream);
        }
        let mut bytes = vec![0u8; count];
        self.read_bytes(&mut bytes)?;
        Ok(bytes)
    }

    fn read_int32(&mut self) -> Result<i32, BsonError> {
        let mut bytes = [0u8; 4];
        self.read_bytes(&mut bytes)?;
        Ok(i32::from_le_bytes(bytes))
    }

    fn read_int64(&mut self) -> Result<i64, BsonError> {
        let mut bytes = [0u8; 8];
        self.read_bytes(&mut bytes)?;
        Ok(i64::from_le_bytes(bytes))
    }

    fn read_double(&mut self) -> Result<f64, BsonError> {
        let mut bytes = [0u8; 8];
        self.read_bytes(&mut bytes)?;
        Ok(f64::from_le_bytes(bytes))
    }

    fn read_decimal128(&mut self) -> Result<Decimal128, BsonError> {
        let mut bytes = [0u8; 16];
        self.read_bytes(&mut bytes)?;
        Ok(Decimal128::from_le_bytes(bytes))
    }

    fn read_object_id(&mut self) -> Result<ObjectId, BsonError> {
        let mut bytes = [0u8; 12];
        self.read_bytes(&mut bytes)?;
        Ok(ObjectId::from_bytes(bytes))
    }

    fn read_boolean(&mut self) -> Result<bool, BsonError> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(BsonError::format(format!("Invalid BsonBoolean value: {b}."))),
        }
    }

    fn read_bson_type(&mut self) -> Result<BsonType, BsonError> {
        let code = self.read_byte()?;
        BsonType::from_u8(code).ok_or_else(|| {
            BsonError::format(format!(
                "Detected unknown BSON type \"\\x{code:02x}\". Are you using the latest driver version?"
            ))
        })
    }

    fn read_binary_sub_type(&mut self) -> Result<BsonBinarySubType, BsonError> {
        Ok(BsonBinarySubType::from_u8(self.read_byte()?))
    }

    /// Reads up to (and consumes) the next NUL, returning the bytes before it.
    fn read_cstring_bytes(&mut self) -> Result<Vec<u8>, BsonError> {
        let mut bytes = Vec::new();
        loop {
            match self.read_byte()? {
                0 => return Ok(bytes),
                b => bytes.push(b),
            }
        }
    }

    fn read_cstring(&mut self) -> Result<String, BsonError> {
        let bytes = self.read_cstring_bytes()?;
        decode_utf8(bytes)
    }

    fn skip_cstring(&mut self) -> Result<(), BsonError> {
        while self.read_byte()? != 0 {}
        Ok(())
    }

    /// Reads a length-prefixed string; the length includes the trailing NUL.
    fn read_string(&mut self) -> Result<String, BsonError> {
        let length = self.read_int32()?;
        if length <= 0 {
            return Err(BsonError::format(format!("Invalid string length: {length}.")));
        }
        let mut bytes = self.read_vec(length as usize)?;
        if bytes.pop() != Some(0) {
            return Err(BsonError::format("String is missing terminating null byte."));
        }
        decode_utf8(bytes)
    }

    /// Returns the length-prefixed document or array at the current
    /// position as its own read-only buffer and moves past it.
    fn read_slice(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        let start = self.position();
        let length = self.read_int32()?;
        if length < 5 {
            return Err(BsonError::format(format!("Invalid document size: {length}.")));
        }
        self.set_position(start)?;
        let bytes = self.read_vec(length as usize)?;
        let size = bytes.len();
        Ok(Box::new(ByteArrayBuffer::with_length(bytes, size, true)?))
    }

    fn write_int32(&mut self, value: i32) -> Result<(), BsonError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_int64(&mut self, value: i64) -> Result<(), BsonError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_double(&mut self, value: f64) -> Result<(), BsonError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_decimal128(&mut self, value: Decimal128) -> Result<(), BsonError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_object_id(&mut self, value: ObjectId) -> Result<(), BsonError> {
        self.write_bytes(&value.bytes())
    }

    fn write_boolean(&mut self, value: bool) -> Result<(), BsonError> {
        self.write_byte(value as u8)
    }

    fn write_bson_type(&mut self, value: BsonType) -> Result<(), BsonError> {
        self.write_byte(value.code())
    }

    fn write_binary_sub_type(&mut self, value: BsonBinarySubType) -> Result<(), BsonError> {
        self.write_byte(value.code())
    }

    fn write_cstring_bytes(&mut self, value: &[u8]) -> Result<(), BsonError> {
        if value.contains(&0) {
            return Err(BsonError::invalid_argument(
                "value",
                "UTF8 representation cannot contain null bytes when writing a BSON CString.",
            ));
        }
        self.write_bytes(value)?;
        self.write_byte(0)
    }

    fn write_cstring(&mut self, value: &str) -> Result<(), BsonError> {
        self.write_cstring_bytes(value.as_bytes())
    }

    fn write_string(&mut self, value: &str) -> Result<(), BsonError> {
        let length = i32::try_from(value.len() + 1).map_err(|_| {
            BsonError::format(format!("String of {} bytes is too large.", value.len()))
        })?;
        self.write_int32(length)?;
        self.write_bytes(value.as_bytes())?;
        self.write_byte(0)
    }

    /// Writes `position - start_position` as an int32 at `start_position`,
    /// leaving the position where it was.
    fn backpatch_size(&mut self, start_position: u64) -> Result<(), BsonError> {
        let position = self.position();
        if start_position > position {
            return Err(BsonError::invalid_argument(
                "start_position",
                "The start position is past the current position.",
            ));
        }
        let size = position - start_position;
        if size > MAX_SIZE {
            return Err(BsonError::format(format!(
                "Size {size} is larger than {MAX_SIZE} (the maximum size of a length field)."
            )));
        }
        self.set_position(start_position)?;
        self.write_int32(size as i32)?;
        self.set_position(position)
    }
}

pub(crate) fn decode_utf8(bytes: Vec<u8>) -> Result<String, BsonError> {
    String::from_utf8(bytes).map_err(|e| BsonError::format(format!("Invalid UTF-8 in string: {e}.")))
}

/// A [`BsonStream`] over any seekable `std::io` stream.
///
/// Position and length are tracked locally, so writes of any size are
/// accepted; the 2GB ceiling is only enforced when a size is backpatched.
pub struct BsonStreamAdapter<S> {
    stream: S,
    position: u64,
    length: u64,
}

impl<S: Read + Write + Seek> BsonStreamAdapter<S> {
    pub fn new(mut stream: S) -> Result<Self, BsonError> {
        let position = stream.stream_position()?;
        let length = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(position))?;
        Ok(Self {
            stream,
            position,
            length,
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn advance(&mut self, count: usize) {
        self.position += count as u64;
        self.length = self.length.max(self.position);
    }
}

impl<S: Read + Write + Seek> BsonStream for BsonStreamAdapter<S> {
    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<(), BsonError> {
        if position != self.position {
            self.stream.seek(SeekFrom::Start(position))?;
            self.position = position;
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn read_byte(&mut self) -> Result<u8, BsonError> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(BsonError::EndOfStream),
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.position += 1;
        Ok(byte[0])
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), BsonError> {
        if buffer.len() == 1 {
            buffer[0] = self.read_byte()?;
            return Ok(());
        }
        let mut offset = 0;
        while offset < buffer.len() {
            match self.stream.read(&mut buffer[offset..]) {
                Ok(0) => {
                    self.position += offset as u64;
                    return Err(BsonError::EndOfStream);
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.position += offset as u64;
                    return Err(e.into());
                }
            }
        }
        self.position += offset as u64;
        Ok(())
    }

    fn write_byte(&mut self, value: u8) -> Result<(), BsonError> {
        self.stream.write_all(&[value])?;
        self.advance(1);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BsonError> {
        if bytes.len() == 1 {
            return self.write_byte(bytes[0]);
        }
        self.stream.write_all(bytes)?;
        self.advance(bytes.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BsonError> {
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn over(bytes: &[u8]) -> BsonStreamAdapter<Cursor<Vec<u8>>> {
        BsonStreamAdapter::new(Cursor::new(bytes.to_vec())).unwrap()
    }

    /// Hands out at most two bytes per read call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(2);
            self.0.read(&mut buf[..n])
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Trickle {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    #[test]
    fn reads_little_endian_primitives() {
        let mut stream = over(&[1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xf0, 0x3f]);
        assert_eq!(stream.read_int32().unwrap(), 1);
        assert_eq!(stream.read_int64().unwrap(), 2);
        assert_eq!(stream.read_double().unwrap(), 1.0);
        assert_eq!(stream.position(), 20);
        assert_eq!(stream.read_byte(), Err(BsonError::EndOfStream));
    }

    #[test]
    fn partial_reads_are_retried() {
        let mut stream = BsonStreamAdapter::new(Trickle(Cursor::new(vec![1, 2, 3, 4, 5]))).unwrap();
        let mut bytes = [0u8; 5];
        stream.read_bytes(&mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5]);

        let mut stream = BsonStreamAdapter::new(Trickle(Cursor::new(vec![1, 2, 3]))).unwrap();
        let mut bytes = [0u8; 4];
        assert_eq!(stream.read_bytes(&mut bytes), Err(BsonError::EndOfStream));
    }

    #[test]
    fn strings_validate_length_and_terminator() {
        let mut stream = over(&[3, 0, 0, 0, b'h', b'i', 0]);
        assert_eq!(stream.read_string().unwrap(), "hi");

        let mut stream = over(&[0, 0, 0, 0]);
        assert_eq!(
            stream.read_string().unwrap_err().to_string(),
            "Invalid string length: 0."
        );

        let mut stream = over(&[2, 0, 0, 0, b'h', b'i']);
        assert_eq!(
            stream.read_string().unwrap_err().to_string(),
            "String is missing terminating null byte."
        );

        let mut stream = over(&[9, 0, 0, 0, b'h', 0]);
        assert_eq!(stream.read_string(), Err(BsonError::EndOfStream));
    }

    #[test]
    fn cstrings() {
        let mut stream = over(b"ab\0cd\0ef");
        assert_eq!(stream.read_cstring().unwrap(), "ab");
        stream.skip_cstring().unwrap();
        assert_eq!(stream.position(), 6);
        assert_eq!(stream.read_cstring(), Err(BsonError::EndOfStream));

        let mut stream = over(&[]);
        assert!(matches!(
            stream.write_cstring("a\0b"),
            Err(BsonError::InvalidArgument { param: "value", .. })
        ));
    }

    #[test]
    fn unknown_type_names_the_byte() {
        let mut stream = over(&[0x0c]);
        let message = stream.read_bson_type().unwrap_err().to_string();
        assert!(message.contains("\\x0c"), "{message}");
    }

    #[test]
    fn booleans_are_strict() {
        let mut stream = over(&[0, 1, 2]);
        assert!(!stream.read_boolean().unwrap());
        assert!(stream.read_boolean().unwrap());
        assert!(stream.read_boolean().unwrap_err().is_format());
    }

    #[test]
    fn backpatch_restores_position() {
        let mut stream = over(&[]);
        stream.write_int32(0).unwrap();
        stream.write_bytes(&[7, 7, 7]).unwrap();
        stream.backpatch_size(0).unwrap();
        assert_eq!(stream.position(), 7);
        assert_eq!(stream.get_ref().get_ref(), &vec![7, 0, 0, 0, 7, 7, 7]);
        assert!(matches!(
            stream.backpatch_size(8),
            Err(BsonError::InvalidArgument { param: "start_position", .. })
        ));
    }

    #[test]
    fn seek_from_each_origin() {
        let mut stream = over(&[0; 10]);
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(stream.seek(SeekFrom::Current(-3)).unwrap(), 5);
        assert_eq!(stream.seek(SeekFrom::Start(1)).unwrap(), 1);
        assert!(stream.seek(SeekFrom::Current(-2)).is_err());
    }

    #[test]
    fn copies_slices() {
        let mut stream = over(&[5, 0, 0, 0, 0, 9]);
        let slice = stream.read_slice().unwrap();
        assert_eq!(slice.to_vec().unwrap(), vec![5, 0, 0, 0, 0]);
        assert!(slice.is_read_only().unwrap());
        assert_eq!(stream.position(), 5);
    }
}
