//! Writer producing the binary wire format.

use bsonio_buffers::ByteBuffer;
use log::debug;

use super::context::{ContextStack, ContextType, Frame};
use super::settings::BsonBinaryWriterSettings;
use super::stream::BsonStream;
use super::writer::{check_not_closed, depth_exceeded, invalid_state, BsonWriter, BsonWriterState};
use crate::decimal128::Decimal128;
use crate::guid::GuidRepresentation;
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonType};
use crate::BsonError;

#[derive(Debug, Clone)]
struct BinaryWriterFrame {
    context_type: ContextType,
    /// Position of the length placeholder.
    start_position: u64,
    /// Next element name inside an array.
    index: usize,
}

impl Frame for BinaryWriterFrame {
    fn context_type(&self) -> ContextType {
        self.context_type
    }
}

/// Writes documents to a [`BsonStream`].
///
/// Every document, array and code-with-scope value gets a length
/// placeholder that is backpatched when it closes.
pub struct BsonBinaryWriter<S: BsonStream> {
    stream: S,
    settings: BsonBinaryWriterSettings,
    max_document_size: usize,
    max_document_size_stack: Vec<usize>,
    state: BsonWriterState,
    name: Option<String>,
    context: ContextStack<BinaryWriterFrame>,
}

impl<S: BsonStream> BsonBinaryWriter<S> {
    pub fn new(stream: S, settings: BsonBinaryWriterSettings) -> Self {
        let max_document_size = settings.max_document_size;
        Self {
            stream,
            settings,
            max_document_size,
            max_document_size_stack: Vec::new(),
            state: BsonWriterState::Initial,
            name: None,
            context: ContextStack::new(BinaryWriterFrame {
                context_type: ContextType::TopLevel,
                start_position: 0,
                index: 0,
            }),
        }
    }

    pub fn settings(&self) -> &BsonBinaryWriterSettings {
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

    /// Limit applied to the documents closed from now on.
    pub fn max_document_size(&self) -> usize {
        self.max_document_size
    }

    /// Temporarily replaces the document size limit, e.g. for a command
    /// whose payload has a different ceiling.
    pub fn push_max_document_size(&mut self, max_document_size: usize) {
        self.max_document_size_stack.push(self.max_document_size);
        self.max_document_size = max_document_size;
    }

    pub fn pop_max_document_size(&mut self) -> Result<(), BsonError> {
        self.max_document_size = self.max_document_size_stack.pop().ok_or_else(|| {
            BsonError::invalid_operation("There is no pushed MaxDocumentSize to pop.")
        })?;
        Ok(())
    }

    fn next_state(&self) -> BsonWriterState {
        match self.context.context_type() {
            ContextType::TopLevel => BsonWriterState::Done,
            ContextType::Array => BsonWriterState::Value,
            _ => BsonWriterState::Name,
        }
    }

    /// Writes the type byte and element name of the next value.
    fn write_element_header(&mut self, method: &str, bson_type: BsonType) -> Result<(), BsonError> {
        check_not_closed(self.state, method)?;
        if self.state != BsonWriterState::Value {
            return Err(invalid_state(method, self.state, &[BsonWriterState::Value]));
        }
        self.stream.write_bson_type(bson_type)?;
        if self.context.context_type() == ContextType::Array {
            let frame = self.context.current_mut();
            let index = frame.index;
            frame.index += 1;
            self.stream.write_cstring(&index.to_string())
        } else {
            let name = self.name.take().unwrap_or_default();
            self.stream.write_cstring(&name)
        }
    }

    fn push_frame(&mut self, context_type: ContextType) -> Result<(), BsonError> {
        let start_position = self.stream.position();
        self.context.push(BinaryWriterFrame {
            context_type,
            start_position,
            index: 0,
        });
        // Length placeholder
        self.stream.write_int32(0)
    }

    fn check_depth(&self) -> Result<(), BsonError> {
        if self.context.depth() + 1 > self.settings.max_serialization_depth {
            return Err(depth_exceeded());
        }
        Ok(())
    }

    /// Backpatches a document-like length, enforcing the size limit.
    fn backpatch_document(&mut self, start_position: u64) -> Result<(), BsonError> {
        let size = self.stream.position() - start_position;
        if size > self.max_document_size as u64 {
            return Err(BsonError::format(format!(
                "Size {size} is larger than MaxDocumentSize {}.",
                self.max_document_size
            )));
        }
        self.stream.backpatch_size(start_position)
    }

    /// Closes the code-with-scope value the scope document just ended.
    fn close_java_script_with_scope(&mut self) -> Result<(), BsonError> {
        if self.context.context_type() == ContextType::JavaScriptWithScope {
            let start_position = self.context.current().start_position;
            self.backpatch_document(start_position)?;
            self.context.pop()?;
        }
        Ok(())
    }
}

impl<S: BsonStream> BsonWriter for BsonBinaryWriter<S> {
    fn state(&self) -> BsonWriterState {
        self.state
    }

    fn guid_representation(&self) -> GuidRepresentation {
        self.settings.guid_representation
    }

    fn write_name(&mut self, name: &str) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_name")?;
        if self.state != BsonWriterState::Name {
            return Err(invalid_state("write_name", self.state, &[BsonWriterState::Name]));
        }
        if name.contains('\0') {
            return Err(BsonError::invalid_argument(
                "name",
                "Element names cannot contain null bytes.",
            ));
        }
        self.name = Some(name.to_string());
        self.state = BsonWriterState::Value;
        Ok(())
    }

    fn write_start_document(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_start_document")?;
        self.check_depth()?;
        let context_type = match self.state {
            BsonWriterState::Initial | BsonWriterState::Done => ContextType::Document,
            BsonWriterState::ScopeDocument => ContextType::ScopeDocument,
            BsonWriterState::Value => {
                self.write_element_header("write_start_document", BsonType::Document)?;
                ContextType::Document
            }
            state => {
                return Err(invalid_state(
                    "write_start_document",
                    state,
                    &[
                        BsonWriterState::Initial,
                        BsonWriterState::Value,
                        BsonWriterState::ScopeDocument,
                        BsonWriterState::Done,
                    ],
                ))
            }
        };
        self.push_frame(context_type)?;
        self.state = BsonWriterState::Name;
        Ok(())
    }

    fn write_end_document(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_end_document")?;
        if self.state != BsonWriterState::Name {
            return Err(invalid_state("write_end_document", self.state, &[BsonWriterState::Name]));
        }
        let context_type = self.context.context_type();
        if !matches!(context_type, ContextType::Document | ContextType::ScopeDocument) {
            return Err(BsonError::invalid_operation(format!(
                "write_end_document can only be called when ContextType is Document or ScopeDocument, not when ContextType is {context_type:?}."
            )));
        }
        self.stream.write_byte(0)?;
        let start_position = self.context.current().start_position;
        self.backpatch_document(start_position)?;
        self.context.pop()?;
        self.close_java_script_with_scope()?;
        self.state = self.next_state();
        if self.state == BsonWriterState::Done {
            debug!("wrote top-level document ending at {}", self.stream.position());
        }
        Ok(())
    }

    fn write_start_array(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_start_array")?;
        self.check_depth()?;
        self.write_element_header("write_start_array", BsonType::Array)?;
        self.push_frame(ContextType::Array)?;
        self.state = BsonWriterState::Value;
        Ok(())
    }

    fn write_end_array(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_end_array")?;
        if self.state != BsonWriterState::Value {
            return Err(invalid_state("write_end_array", self.state, &[BsonWriterState::Value]));
        }
        let context_type = self.context.context_type();
        if context_type != ContextType::Array {
            return Err(BsonError::invalid_operation(format!(
                "write_end_array can only be called when ContextType is Array, not when ContextType is {context_type:?}."
            )));
        }
        self.stream.write_byte(0)?;
        let start_position = self.context.current().start_position;
        self.backpatch_document(start_position)?;
        self.context.pop()?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_binary_data(&mut self, data: &BsonBinaryData) -> Result<(), BsonError> {
        self.write_element_header("write_binary_data", BsonType::Binary)?;
        let length = i32::try_from(data.bytes.len()).map_err(|_| {
            BsonError::format(format!("Binary data of {} bytes is too large.", data.bytes.len()))
        })?;
        let mut sub_type = data.sub_type;
        if sub_type == BsonBinarySubType::OldBinary && self.settings.fix_old_binary_subtype_on_output {
            sub_type = BsonBinarySubType::Binary;
        }
        if sub_type == BsonBinarySubType::OldBinary {
            // Subtype 2 repeats the length inside the payload
            let outer = length.checked_add(4).ok_or_else(|| {
                BsonError::format(format!("Binary data of {length} bytes is too large."))
            })?;
            self.stream.write_int32(outer)?;
            self.stream.write_binary_sub_type(sub_type)?;
            self.stream.write_int32(length)?;
        } else {
            self.stream.write_int32(length)?;
            self.stream.write_binary_sub_type(sub_type)?;
        }
        self.stream.write_bytes(&data.bytes)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_boolean(&mut self, value: bool) -> Result<(), BsonError> {
        self.write_element_header("write_boolean", BsonType::Boolean)?;
        self.stream.write_boolean(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_date_time(&mut self, millis: i64) -> Result<(), BsonError> {
        self.write_element_header("write_date_time", BsonType::DateTime)?;
        self.stream.write_int64(millis)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_decimal128(&mut self, value: Decimal128) -> Result<(), BsonError> {
        self.write_element_header("write_decimal128", BsonType::Decimal128)?;
        self.stream.write_decimal128(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<(), BsonError> {
        self.write_element_header("write_double", BsonType::Double)?;
        self.stream.write_double(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_int32(&mut self, value: i32) -> Result<(), BsonError> {
        self.write_element_header("write_int32", BsonType::Int32)?;
        self.stream.write_int32(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_int64(&mut self, value: i64) -> Result<(), BsonError> {
        self.write_element_header("write_int64", BsonType::Int64)?;
        self.stream.write_int64(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_java_script(&mut self, code: &str) -> Result<(), BsonError> {
        self.write_element_header("write_java_script", BsonType::JavaScript)?;
        self.stream.write_string(code)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_java_script_with_scope(&mut self, code: &str) -> Result<(), BsonError> {
        self.write_element_header("write_java_script_with_scope", BsonType::JavaScriptWithScope)?;
        self.push_frame(ContextType::JavaScriptWithScope)?;
        self.stream.write_string(code)?;
        self.state = BsonWriterState::ScopeDocument;
        Ok(())
    }

    fn write_max_key(&mut self) -> Result<(), BsonError> {
        self.write_element_header("write_max_key", BsonType::MaxKey)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_min_key(&mut self) -> Result<(), BsonError> {
        self.write_element_header("write_min_key", BsonType::MinKey)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), BsonError> {
        self.write_element_header("write_null", BsonType::Null)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_object_id(&mut self, value: ObjectId) -> Result<(), BsonError> {
        self.write_element_header("write_object_id", BsonType::ObjectId)?;
        self.stream.write_object_id(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_regular_expression(&mut self, regex: &BsonRegularExpression) -> Result<(), BsonError> {
        self.write_element_header("write_regular_expression", BsonType::RegularExpression)?;
        self.stream.write_cstring(&regex.pattern)?;
        self.stream.write_cstring(regex.options())?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<(), BsonError> {
        self.write_element_header("write_string", BsonType::String)?;
        self.stream.write_string(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_symbol(&mut self, value: &str) -> Result<(), BsonError> {
        self.write_element_header("write_symbol", BsonType::Symbol)?;
        self.stream.write_string(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_timestamp(&mut self, value: i64) -> Result<(), BsonError> {
        self.write_element_header("write_timestamp", BsonType::Timestamp)?;
        self.stream.write_int64(value)?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_undefined(&mut self) -> Result<(), BsonError> {
        self.write_element_header("write_undefined", BsonType::Undefined)?;
        self.state = self.next_state();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "flush")?;
        self.stream.flush()
    }

    fn close(&mut self) -> Result<(), BsonError> {
        if self.state == BsonWriterState::Closed {
            return Ok(());
        }
        if self.state == BsonWriterState::Done {
            self.stream.flush()?;
        }
        self.context = ContextStack::new(BinaryWriterFrame {
            context_type: ContextType::TopLevel,
            start_position: 0,
            index: 0,
        });
        self.state = BsonWriterState::Closed;
        Ok(())
    }

    /// Copies the encoded bytes through untouched.
    fn write_raw_bson_document(&mut self, document: &dyn ByteBuffer) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_raw_bson_document")?;
        let in_scope = match self.state {
            BsonWriterState::Initial | BsonWriterState::Done => false,
            BsonWriterState::ScopeDocument => true,
            BsonWriterState::Value => {
                self.write_element_header("write_raw_bson_document", BsonType::Document)?;
                false
            }
            state => {
                return Err(invalid_state(
                    "write_raw_bson_document",
                    state,
                    &[
                        BsonWriterState::Initial,
                        BsonWriterState::Value,
                        BsonWriterState::ScopeDocument,
                        BsonWriterState::Done,
                    ],
                ))
            }
        };
        self.stream.write_bytes(&document.to_vec()?)?;
        if in_scope {
            self.close_java_script_with_scope()?;
        }
        self.state = self.next_state();
        Ok(())
    }

    fn write_raw_bson_array(&mut self, array: &dyn ByteBuffer) -> Result<(), BsonError> {
        self.write_element_header("write_raw_bson_array", BsonType::Array)?;
        self.stream.write_bytes(&array.to_vec()?)?;
        self.state = self.next_state();
        Ok(())
    }
}
