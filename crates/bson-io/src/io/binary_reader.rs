//! Reader over the binary wire format.

use bsonio_buffers::ByteBuffer;

use super::context::{ContextStack, ContextType, Frame};
use super::reader::{check_not_closed, invalid_state, verify_bson_type, BsonReader, BsonReaderState};
use super::settings::BsonBinaryReaderSettings;
use super::stream::BsonStream;
use crate::decimal128::Decimal128;
use crate::guid::GuidRepresentation;
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonType};
use crate::BsonError;

#[derive(Debug, Clone)]
struct BinaryReaderFrame {
    context_type: ContextType,
    /// Position of the construct's length field.
    start_position: u64,
    size: u64,
}

impl Frame for BinaryReaderFrame {
    fn context_type(&self) -> ContextType {
        self.context_type
    }
}

/// Everything needed to resume a [`BsonBinaryReader`] where the bookmark
/// was taken.
#[derive(Debug, Clone)]
pub struct BsonBinaryReaderBookmark {
    state: BsonReaderState,
    current_bson_type: Option<BsonType>,
    current_name: Option<String>,
    context: ContextStack<BinaryReaderFrame>,
    position: u64,
}

/// Reads documents from a [`BsonStream`].
///
/// Lengths are validated as frames close: a document whose declared size
/// does not match the bytes actually consumed is a format error.
pub struct BsonBinaryReader<S: BsonStream> {
    stream: S,
    settings: BsonBinaryReaderSettings,
    state: BsonReaderState,
    current_bson_type: Option<BsonType>,
    current_name: Option<String>,
    context: ContextStack<BinaryReaderFrame>,
}

impl<S: BsonStream> BsonBinaryReader<S> {
    pub fn new(stream: S, settings: BsonBinaryReaderSettings) -> Self {
        Self {
            stream,
            settings,
            state: BsonReaderState::Initial,
            current_bson_type: None,
            current_name: None,
            context: ContextStack::new(BinaryReaderFrame {
                context_type: ContextType::TopLevel,
                start_position: 0,
                size: 0,
            }),
        }
    }

    pub fn settings(&self) -> &BsonBinaryReaderSettings {
        &self.settings
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Reads a length field, rejecting negative sizes and sizes above the
    /// configured maximum.
    fn read_size(&mut self) -> Result<u64, BsonError> {
        let size = self.stream.read_int32()?;
        if size < 0 {
            return Err(BsonError::format(format!(
                "Size {size} is not valid because it is negative."
            )));
        }
        if size as usize > self.settings.max_document_size {
            return Err(BsonError::format(format!(
                "Size {size} is not valid because it is larger than MaxDocumentSize {}.",
                self.settings.max_document_size
            )));
        }
        Ok(size as u64)
    }

    fn next_state(&self) -> BsonReaderState {
        match self.context.context_type() {
            ContextType::TopLevel => BsonReaderState::Done,
            _ => BsonReaderState::Type,
        }
    }

    fn push_frame(&mut self, context_type: ContextType, start_position: u64, size: u64) {
        self.context.push(BinaryReaderFrame {
            context_type,
            start_position,
            size,
        });
    }

    /// Pops the current frame, checking its declared size against the bytes consumed.
    fn pop_frame(&mut self) -> Result<(), BsonError> {
        let frame = self.context.pop()?;
        let actual = self.stream.position() - frame.start_position;
        if actual != frame.size {
            return Err(BsonError::format(format!(
                "Expected size to be {}, not {actual}.",
                frame.size
            )));
        }
        Ok(())
    }

    /// Builds the unknown-type error, naming the field when it can be read.
    fn unknown_type(&mut self, code: u8) -> BsonError {
        let name = self.stream.read_cstring().ok();
        match name {
            Some(name) => BsonError::format(format!(
                "Detected unknown BSON type \"\\x{code:02x}\" for fieldname \"{name}\". Are you using the latest driver version?"
            )),
            None => BsonError::format(format!(
                "Detected unknown BSON type \"\\x{code:02x}\". Are you using the latest driver version?"
            )),
        }
    }

    fn finish_value(&mut self) {
        self.state = self.next_state();
    }
}

impl<S: BsonStream> BsonReader for BsonBinaryReader<S> {
    type Bookmark = BsonBinaryReaderBookmark;

    fn state(&self) -> BsonReaderState {
        self.state
    }

    fn current_bson_type(&self) -> Option<BsonType> {
        self.current_bson_type
    }

    fn current_name(&self) -> Option<&str> {
        self.current_name.as_deref()
    }

    fn guid_representation(&self) -> GuidRepresentation {
        self.settings.guid_representation
    }

    fn is_at_end_of_file(&mut self) -> Result<bool, BsonError> {
        check_not_closed(self.state, "is_at_end_of_file")?;
        Ok(matches!(self.state, BsonReaderState::Initial | BsonReaderState::Done)
            && self.stream.position() >= self.stream.length())
    }

    fn read_bson_type(&mut self) -> Result<BsonType, BsonError> {
        check_not_closed(self.state, "read_bson_type")?;
        if matches!(
            self.state,
            BsonReaderState::Initial | BsonReaderState::Done | BsonReaderState::ScopeDocument
        ) {
            // Top-level values and scopes are always documents
            self.current_bson_type = Some(BsonType::Document);
            self.state = BsonReaderState::Value;
            return Ok(BsonType::Document);
        }
        if self.state != BsonReaderState::Type {
            return Err(invalid_state("read_bson_type", self.state, &[BsonReaderState::Type]));
        }

        let code = self.stream.read_byte()?;
        let bson_type = match BsonType::from_u8(code) {
            Some(t) => t,
            None => return Err(self.unknown_type(code)),
        };
        self.current_bson_type = Some(bson_type);

        if bson_type == BsonType::EndOfDocument {
            self.state = match self.context.context_type() {
                ContextType::Array => BsonReaderState::EndOfArray,
                ContextType::Document | ContextType::ScopeDocument => BsonReaderState::EndOfDocument,
                other => {
                    return Err(BsonError::format(format!(
                        "BsonType EndOfDocument is not valid when ContextType is {other:?}."
                    )))
                }
            };
            return Ok(bson_type);
        }

        match self.context.context_type() {
            ContextType::Array => {
                // Array element names are just indexes
                self.stream.skip_cstring()?;
                self.state = BsonReaderState::Value;
            }
            _ => self.state = BsonReaderState::Name,
        }
        Ok(bson_type)
    }

    fn read_name(&mut self) -> Result<String, BsonError> {
        check_not_closed(self.state, "read_name")?;
        if self.state == BsonReaderState::Type {
            self.read_bson_type()?;
        }
        if self.state != BsonReaderState::Name {
            return Err(invalid_state("read_name", self.state, &[BsonReaderState::Name]));
        }
        let name = self.stream.read_cstring()?;
        self.current_name = Some(name.clone());
        self.state = BsonReaderState::Value;
        Ok(name)
    }

    fn skip_name(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "skip_name")?;
        if self.state != BsonReaderState::Name {
            return Err(invalid_state("skip_name", self.state, &[BsonReaderState::Name]));
        }
        self.stream.skip_cstring()?;
        self.current_name = None;
        self.state = BsonReaderState::Value;
        Ok(())
    }

    fn skip_value(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "skip_value")?;
        if self.state != BsonReaderState::Value {
            return Err(invalid_state("skip_value", self.state, &[BsonReaderState::Value]));
        }
        let skip = match self.current_bson_type {
            Some(BsonType::Array | BsonType::Document | BsonType::JavaScriptWithScope) => {
                self.read_size()?.saturating_sub(4)
            }
            Some(BsonType::Binary) => self.read_size()? + 1,
            Some(BsonType::String | BsonType::JavaScript | BsonType::Symbol) => self.read_size()?,
            Some(BsonType::Boolean) => 1,
            Some(BsonType::Int32) => 4,
            Some(
                BsonType::DateTime | BsonType::Double | BsonType::Int64 | BsonType::Timestamp,
            ) => 8,
            Some(BsonType::ObjectId) => 12,
            Some(BsonType::Decimal128) => 16,
            Some(BsonType::RegularExpression) => {
                self.stream.skip_cstring()?;
                self.stream.skip_cstring()?;
                0
            }
            Some(BsonType::MaxKey | BsonType::MinKey | BsonType::Null | BsonType::Undefined) => 0,
            Some(BsonType::EndOfDocument) | None => {
                return Err(BsonError::invalid_operation("There is no value to skip."))
            }
        };
        self.stream.skip(skip)?;
        self.finish_value();
        Ok(())
    }

    fn read_start_document(&mut self) -> Result<(), BsonError> {
        let context_type = if self.state == BsonReaderState::ScopeDocument {
            ContextType::ScopeDocument
        } else {
            ContextType::Document
        };
        verify_bson_type(self, "read_start_document", BsonType::Document)?;
        let start_position = self.stream.position();
        let size = self.read_size()?;
        self.push_frame(context_type, start_position, size);
        self.state = BsonReaderState::Type;
        Ok(())
    }

    fn read_end_document(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "read_end_document")?;
        let context_type = self.context.context_type();
        if !matches!(context_type, ContextType::Document | ContextType::ScopeDocument) {
            return Err(BsonError::invalid_operation(format!(
                "read_end_document can only be called when ContextType is Document or ScopeDocument, not when ContextType is {context_type:?}."
            )));
        }
        if self.state == BsonReaderState::Type {
            self.read_bson_type()?;
        }
        if self.state != BsonReaderState::EndOfDocument {
            return Err(invalid_state(
                "read_end_document",
                self.state,
                &[BsonReaderState::EndOfDocument],
            ));
        }
        self.pop_frame()?;
        if self.context.context_type() == ContextType::JavaScriptWithScope {
            self.pop_frame()?;
        }
        self.finish_value();
        Ok(())
    }

    fn read_start_array(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_start_array", BsonType::Array)?;
        let start_position = self.stream.position();
        let size = self.read_size()?;
        self.push_frame(ContextType::Array, start_position, size);
        self.state = BsonReaderState::Type;
        Ok(())
    }

    fn read_end_array(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "read_end_array")?;
        let context_type = self.context.context_type();
        if context_type != ContextType::Array {
            return Err(BsonError::invalid_operation(format!(
                "read_end_array can only be called when ContextType is Array, not when ContextType is {context_type:?}."
            )));
        }
        if self.state == BsonReaderState::Type {
            self.read_bson_type()?;
        }
        if self.state != BsonReaderState::EndOfArray {
            return Err(invalid_state("read_end_array", self.state, &[BsonReaderState::EndOfArray]));
        }
        self.pop_frame()?;
        self.finish_value();
        Ok(())
    }

    fn read_binary_data(&mut self) -> Result<BsonBinaryData, BsonError> {
        verify_bson_type(self, "read_binary_data", BsonType::Binary)?;
        let mut size = self.read_size()?;
        let mut sub_type = self.stream.read_binary_sub_type()?;
        if sub_type == BsonBinarySubType::OldBinary {
            // Subtype 2 repeats the length inside the payload
            let inner = self.read_size()?;
            if inner + 4 != size {
                return Err(BsonError::format(
                    "Binary sub type OldBinary has inconsistent sizes.",
                ));
            }
            size = inner;
            if self.settings.fix_old_binary_subtype_on_input {
                sub_type = BsonBinarySubType::Binary;
            }
        }
        let bytes = self.stream.read_vec(size as usize)?;
        self.finish_value();
        Ok(BsonBinaryData::new(sub_type, bytes))
    }

    fn read_boolean(&mut self) -> Result<bool, BsonError> {
        verify_bson_type(self, "read_boolean", BsonType::Boolean)?;
        let value = self.stream.read_boolean()?;
        self.finish_value();
        Ok(value)
    }

    fn read_date_time(&mut self) -> Result<i64, BsonError> {
        verify_bson_type(self, "read_date_time", BsonType::DateTime)?;
        let value = self.stream.read_int64()?;
        self.finish_value();
        Ok(value)
    }

    fn read_decimal128(&mut self) -> Result<Decimal128, BsonError> {
        verify_bson_type(self, "read_decimal128", BsonType::Decimal128)?;
        let value = self.stream.read_decimal128()?;
        self.finish_value();
        Ok(value)
    }

    fn read_double(&mut self) -> Result<f64, BsonError> {
        verify_bson_type(self, "read_double", BsonType::Double)?;
        let value = self.stream.read_double()?;
        self.finish_value();
        Ok(value)
    }

    fn read_int32(&mut self) -> Result<i32, BsonError> {
        verify_bson_type(self, "read_int32", BsonType::Int32)?;
        let value = self.stream.read_int32()?;
        self.finish_value();
        Ok(value)
    }

    fn read_int64(&mut self) -> Result<i64, BsonError> {
        verify_bson_type(self, "read_int64", BsonType::Int64)?;
        let value = self.stream.read_int64()?;
        self.finish_value();
        Ok(value)
    }

    fn read_java_script(&mut self) -> Result<String, BsonError> {
        verify_bson_type(self, "read_java_script", BsonType::JavaScript)?;
        let value = self.stream.read_string()?;
        self.finish_value();
        Ok(value)
    }

    fn read_java_script_with_scope(&mut self) -> Result<String, BsonError> {
        verify_bson_type(self, "read_java_script_with_scope", BsonType::JavaScriptWithScope)?;
        let start_position = self.stream.position();
        let size = self.read_size()?;
        self.push_frame(ContextType::JavaScriptWithScope, start_position, size);
        let code = self.stream.read_string()?;
        self.state = BsonReaderState::ScopeDocument;
        Ok(code)
    }

    fn read_max_key(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_max_key", BsonType::MaxKey)?;
        self.finish_value();
        Ok(())
    }

    fn read_min_key(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_min_key", BsonType::MinKey)?;
        self.finish_value();
        Ok(())
    }

    fn read_null(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_null", BsonType::Null)?;
        self.finish_value();
        Ok(())
    }

    fn read_object_id(&mut self) -> Result<ObjectId, BsonError> {
        verify_bson_type(self, "read_object_id", BsonType::ObjectId)?;
        let value = self.stream.read_object_id()?;
        self.finish_value();
        Ok(value)
    }

    fn read_regular_expression(&mut self) -> Result<BsonRegularExpression, BsonError> {
        verify_bson_type(self, "read_regular_expression", BsonType::RegularExpression)?;
        let pattern = self.stream.read_cstring()?;
        let options = self.stream.read_cstring()?;
        self.finish_value();
        Ok(BsonRegularExpression::new(pattern, &options))
    }

    fn read_string(&mut self) -> Result<String, BsonError> {
        verify_bson_type(self, "read_string", BsonType::String)?;
        let value = self.stream.read_string()?;
        self.finish_value();
        Ok(value)
    }

    fn read_symbol(&mut self) -> Result<String, BsonError> {
        verify_bson_type(self, "read_symbol", BsonType::Symbol)?;
        let value = self.stream.read_string()?;
        self.finish_value();
        Ok(value)
    }

    fn read_timestamp(&mut self) -> Result<i64, BsonError> {
        verify_bson_type(self, "read_timestamp", BsonType::Timestamp)?;
        let value = self.stream.read_int64()?;
        self.finish_value();
        Ok(value)
    }

    fn read_undefined(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_undefined", BsonType::Undefined)?;
        self.finish_value();
        Ok(())
    }

    fn get_bookmark(&self) -> BsonBinaryReaderBookmark {
        BsonBinaryReaderBookmark {
            state: self.state,
            current_bson_type: self.current_bson_type,
            current_name: self.current_name.clone(),
            context: self.context.clone(),
            position: self.stream.position(),
        }
    }

    fn return_to_bookmark(&mut self, bookmark: &BsonBinaryReaderBookmark) -> Result<(), BsonError> {
        check_not_closed(self.state, "return_to_bookmark")?;
        self.stream.set_position(bookmark.position)?;
        self.state = bookmark.state;
        self.current_bson_type = bookmark.current_bson_type;
        self.current_name = bookmark.current_name.clone();
        self.context = bookmark.context.clone();
        Ok(())
    }

    fn close(&mut self) {
        self.state = BsonReaderState::Closed;
    }

    /// A slice of the underlying bytes: zero-copy over read-only buffers.
    fn read_raw_bson_document(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        verify_bson_type(self, "read_raw_bson_document", BsonType::Document)?;
        let slice = self.stream.read_slice()?;
        if self.context.context_type() == ContextType::JavaScriptWithScope {
            self.pop_frame()?;
        }
        self.finish_value();
        Ok(slice)
    }

    fn read_raw_bson_array(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        verify_bson_type(self, "read_raw_bson_array", BsonType::Array)?;
        let slice = self.stream.read_slice()?;
        self.finish_value();
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use bsonio_buffers::ByteArrayBuffer;

    use super::*;
    use crate::io::ByteBufferStream;

    fn reader(bytes: &[u8]) -> BsonBinaryReader<ByteBufferStream<ByteArrayBuffer>> {
        let mut buffer = ByteArrayBuffer::new(bytes.to_vec());
        buffer.make_read_only().unwrap();
        BsonBinaryReader::new(
            ByteBufferStream::new(buffer).unwrap(),
            BsonBinaryReaderSettings::default(),
        )
    }

    // { "a" : 1, "b" : "x" }
    const SMALL: &[u8] = &[
        21, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0x02, b'b', 0, 2, 0, 0, 0, b'x', 0, 0,
    ];

    #[test]
    fn reads_elements_in_order() {
        let mut reader = reader(SMALL);
        reader.read_start_document().unwrap();
        assert_eq!(reader.read_bson_type().unwrap(), BsonType::Int32);
        assert_eq!(reader.read_name().unwrap(), "a");
        assert_eq!(reader.read_int32().unwrap(), 1);
        assert_eq!(reader.read_bson_type().unwrap(), BsonType::String);
        assert_eq!(reader.read_name().unwrap(), "b");
        assert_eq!(reader.read_string().unwrap(), "x");
        assert_eq!(reader.read_bson_type().unwrap(), BsonType::EndOfDocument);
        reader.read_end_document().unwrap();
        assert_eq!(reader.state(), BsonReaderState::Done);
        assert!(reader.is_at_end_of_file().unwrap());
    }

    #[test]
    fn size_mismatch_is_detected_on_close() {
        let mut bytes = SMALL.to_vec();
        bytes[0] = 30;
        bytes.extend_from_slice(&[0; 7]);
        let mut reader = reader(&bytes);
        reader.read_start_document().unwrap();
        while reader.read_bson_type().unwrap() != BsonType::EndOfDocument {
            reader.skip_name().unwrap();
            reader.skip_value().unwrap();
        }
        let err = reader.read_end_document().unwrap_err();
        assert!(err.to_string().contains("Expected size to be 30"), "{err}");
    }

    #[test]
    fn value_reads_skip_type_and_name() {
        let mut reader = reader(SMALL);
        reader.read_start_document().unwrap();
        assert_eq!(reader.read_int32().unwrap(), 1);
        assert!(matches!(reader.read_int32(), Err(BsonError::InvalidOperation(_))));
    }

    #[test]
    fn unknown_type_names_byte_and_field() {
        let mut reader = reader(&[12, 0, 0, 0, 0x0c, b'x', 0, 0, 0, 0, 0, 0]);
        reader.read_start_document().unwrap();
        let message = reader.read_bson_type().unwrap_err().to_string();
        assert!(message.contains("\\x0c"), "{message}");
        assert!(message.contains("\"x\""), "{message}");
    }

    #[test]
    fn negative_and_oversized_lengths_fail() {
        let mut reader = reader(&[0xff, 0xff, 0xff, 0xff]);
        assert!(reader.read_start_document().unwrap_err().is_format());

        let settings = BsonBinaryReaderSettings::default().with_max_document_size(8);
        let mut buffer = ByteArrayBuffer::new(vec![9, 0, 0, 0, 0]);
        buffer.make_read_only().unwrap();
        let mut reader = BsonBinaryReader::new(ByteBufferStream::new(buffer).unwrap(), settings);
        let message = reader.read_start_document().unwrap_err().to_string();
        assert!(message.contains("MaxDocumentSize 8"), "{message}");
    }

    #[test]
    fn old_binary_is_unwrapped() {
        // { "b" : BinData(2, 0xAB) }
        let bytes = [
            18, 0, 0, 0, 0x05, b'b', 0, 5, 0, 0, 0, 2, 1, 0, 0, 0, 0xab, 0,
        ];
        let mut fixed = reader(&bytes);
        fixed.read_start_document().unwrap();
        let data = fixed.read_binary_data().unwrap();
        assert_eq!(data, BsonBinaryData::generic(vec![0xab]));

        let mut buffer = ByteArrayBuffer::new(bytes.to_vec());
        buffer.make_read_only().unwrap();
        let mut raw = BsonBinaryReader::new(
            ByteBufferStream::new(buffer).unwrap(),
            BsonBinaryReaderSettings::default().with_fix_old_binary_subtype_on_input(false),
        );
        raw.read_start_document().unwrap();
        assert_eq!(raw.read_bytes().unwrap(), vec![0xab]);
    }

    #[test]
    fn find_element_skips_to_the_name() {
        let mut reader = reader(SMALL);
        reader.read_start_document().unwrap();
        assert!(reader.find_element("b").unwrap());
        assert_eq!(reader.read_string().unwrap(), "x");
        assert!(!reader.find_element("zzz").unwrap());
        reader.read_end_document().unwrap();
    }

    #[test]
    fn raw_documents_are_slices() {
        // { "d" : { "x" : true } }
        let bytes = [
            17, 0, 0, 0, 0x03, b'd', 0, 9, 0, 0, 0, 0x08, b'x', 0, 1, 0, 0,
        ];
        let mut reader = reader(&bytes);
        reader.read_start_document().unwrap();
        reader.read_bson_type().unwrap();
        reader.read_name().unwrap();
        let raw = reader.read_raw_bson_document().unwrap();
        assert_eq!(raw.to_vec().unwrap(), bytes[7..16].to_vec());
        reader.read_end_document().unwrap();
    }

    #[test]
    fn closed_reader_rejects_calls() {
        let mut reader = reader(&[5, 0, 0, 0, 0]);
        reader.close();
        reader.close();
        assert!(matches!(reader.read_start_document(), Err(BsonError::InvalidOperation(_))));
        assert_eq!(reader.state(), BsonReaderState::Closed);
    }
}
