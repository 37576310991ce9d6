//! The writer contract shared by the binary and JSON writers.

use std::fmt;

use bsonio_buffers::ByteBuffer;

use super::copy;
use crate::decimal128::Decimal128;
use crate::guid::{Guid, GuidRepresentation};
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonRegularExpression, BsonValue};
use crate::BsonError;

/// Where a writer is in the element protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsonWriterState {
    /// Before the first top-level value.
    Initial,
    /// Expecting `write_name` or `write_end_document`.
    Name,
    /// Expecting a value (or `write_end_array` inside an array).
    Value,
    /// Expecting the scope document of a code-with-scope value.
    ScopeDocument,
    /// A top-level value has been written; another may follow.
    Done,
    Closed,
}

impl fmt::Display for BsonWriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Push-style writer mirroring [`crate::BsonReader`].
///
/// Inside a document each value is preceded by `write_name`; inside an
/// array values are written directly.
pub trait BsonWriter {
    fn state(&self) -> BsonWriterState;

    /// Representation `write_guid` encodes with.
    fn guid_representation(&self) -> GuidRepresentation;

    fn write_name(&mut self, name: &str) -> Result<(), BsonError>;

    fn write_start_document(&mut self) -> Result<(), BsonError>;

    fn write_end_document(&mut self) -> Result<(), BsonError>;

    fn write_start_array(&mut self) -> Result<(), BsonError>;

    fn write_end_array(&mut self) -> Result<(), BsonError>;

    fn write_binary_data(&mut self, data: &BsonBinaryData) -> Result<(), BsonError>;

    fn write_boolean(&mut self, value: bool) -> Result<(), BsonError>;

    fn write_date_time(&mut self, millis: i64) -> Result<(), BsonError>;

    fn write_decimal128(&mut self, value: Decimal128) -> Result<(), BsonError>;

    fn write_double(&mut self, value: f64) -> Result<(), BsonError>;

    fn write_int32(&mut self, value: i32) -> Result<(), BsonError>;

    fn write_int64(&mut self, value: i64) -> Result<(), BsonError>;

    fn write_java_script(&mut self, code: &str) -> Result<(), BsonError>;

    /// Must be followed by exactly one scope document.
    fn write_java_script_with_scope(&mut self, code: &str) -> Result<(), BsonError>;

    fn write_max_key(&mut self) -> Result<(), BsonError>;

    fn write_min_key(&mut self) -> Result<(), BsonError>;

    fn write_null(&mut self) -> Result<(), BsonError>;

    fn write_object_id(&mut self, value: ObjectId) -> Result<(), BsonError>;

    fn write_regular_expression(&mut self, regex: &BsonRegularExpression) -> Result<(), BsonError>;

    fn write_string(&mut self, value: &str) -> Result<(), BsonError>;

    fn write_symbol(&mut self, value: &str) -> Result<(), BsonError>;

    fn write_timestamp(&mut self, value: i64) -> Result<(), BsonError>;

    fn write_undefined(&mut self) -> Result<(), BsonError>;

    fn flush(&mut self) -> Result<(), BsonError>;

    /// Flushes and closes. Idempotent; every later write fails.
    fn close(&mut self) -> Result<(), BsonError>;

    /// Writes an encoded document as the current value.
    fn write_raw_bson_document(&mut self, document: &dyn ByteBuffer) -> Result<(), BsonError> {
        let fields = decode_fields(document)?;
        copy::write_document(self, &fields)
    }

    /// Writes an encoded array (a document keyed "0", "1", ...) as the current value.
    fn write_raw_bson_array(&mut self, array: &dyn ByteBuffer) -> Result<(), BsonError> {
        let fields = decode_fields(array)?;
        self.write_start_array()?;
        for (_, value) in &fields {
            copy::write_value(self, value)?;
        }
        self.write_end_array()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BsonError> {
        self.write_binary_data(&BsonBinaryData::generic(bytes.to_vec()))
    }

    fn write_guid(&mut self, guid: Guid) -> Result<(), BsonError> {
        let representation = self.guid_representation();
        self.write_guid_with(guid, representation)
    }

    fn write_guid_with(&mut self, guid: Guid, representation: GuidRepresentation) -> Result<(), BsonError> {
        let data = BsonBinaryData::from_guid(guid, representation)?;
        self.write_binary_data(&data)
    }

    fn write_start_document_named(&mut self, name: &str) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_start_document()
    }

    fn write_start_array_named(&mut self, name: &str) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_start_array()
    }

    fn write_binary_data_field(&mut self, name: &str, data: &BsonBinaryData) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_binary_data(data)
    }

    fn write_boolean_field(&mut self, name: &str, value: bool) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_boolean(value)
    }

    fn write_date_time_field(&mut self, name: &str, millis: i64) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_date_time(millis)
    }

    fn write_double_field(&mut self, name: &str, value: f64) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_double(value)
    }

    fn write_int32_field(&mut self, name: &str, value: i32) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_int32(value)
    }

    fn write_int64_field(&mut self, name: &str, value: i64) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_int64(value)
    }

    fn write_null_field(&mut self, name: &str) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_null()
    }

    fn write_object_id_field(&mut self, name: &str, value: ObjectId) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_object_id(value)
    }

    fn write_string_field(&mut self, name: &str, value: &str) -> Result<(), BsonError> {
        self.write_name(name)?;
        self.write_string(value)
    }

    /// Writes any value under `name`.
    fn write_field(&mut self, name: &str, value: &BsonValue) -> Result<(), BsonError> {
        self.write_name(name)?;
        copy::write_value(self, value)
    }
}

fn decode_fields(bytes: &dyn ByteBuffer) -> Result<Vec<(String, BsonValue)>, BsonError> {
    copy::from_bson_bytes(&bytes.to_vec()?)
}

pub(crate) fn check_not_closed(state: BsonWriterState, method: &str) -> Result<(), BsonError> {
    if state == BsonWriterState::Closed {
        return Err(BsonError::invalid_operation(format!(
            "{method} cannot be called on a closed writer."
        )));
    }
    Ok(())
}

pub(crate) fn invalid_state(
    method: &str,
    actual: BsonWriterState,
    expected: &[BsonWriterState],
) -> BsonError {
    let expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    BsonError::invalid_operation(format!(
        "{method} can only be called when State is {}, not when State is {actual}.",
        expected.join(" or ")
    ))
}

pub(crate) fn depth_exceeded() -> BsonError {
    BsonError::invalid_operation(
        "Maximum serialization depth exceeded (does the value being written have a circular reference?).",
    )
}
