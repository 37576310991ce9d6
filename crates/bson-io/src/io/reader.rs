//! The reader contract shared by the binary and JSON readers.

use std::fmt;

use bsonio_buffers::{ByteArrayBuffer, ByteBuffer};

use super::copy;
use crate::decimal128::Decimal128;
use crate::guid::{Guid, GuidRepresentation};
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonType, BsonValue};
use crate::BsonError;

/// Where a reader is in the element protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsonReaderState {
    /// Before the first top-level value.
    Initial,
    /// Expecting `read_bson_type`.
    Type,
    /// Expecting `read_name` or `skip_name`.
    Name,
    /// Expecting a value read or `skip_value`.
    Value,
    /// Expecting the scope document of a code-with-scope value.
    ScopeDocument,
    /// Expecting `read_end_document`.
    EndOfDocument,
    /// Expecting `read_end_array`.
    EndOfArray,
    /// A top-level value has been read; another may follow.
    Done,
    Closed,
}

impl fmt::Display for BsonReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pull-style reader over an encoded document stream.
///
/// A document is read as `read_start_document`, then for each element
/// `read_bson_type` + `read_name` + one value read, until `read_bson_type`
/// returns [`BsonType::EndOfDocument`], then `read_end_document`. Array
/// elements have no names. Value reads called straight from the `Type` or
/// `Name` state read the type and skip the name on the caller's behalf.
pub trait BsonReader {
    /// A snapshot from which reading can resume.
    type Bookmark: Clone;

    fn state(&self) -> BsonReaderState;

    /// Type of the element most recently announced by `read_bson_type`.
    fn current_bson_type(&self) -> Option<BsonType>;

    fn current_name(&self) -> Option<&str>;

    /// Representation `read_guid` resolves subtype 3 payloads with.
    fn guid_representation(&self) -> GuidRepresentation;

    /// True between top-level values when no input remains.
    fn is_at_end_of_file(&mut self) -> Result<bool, BsonError>;

    fn read_bson_type(&mut self) -> Result<BsonType, BsonError>;

    fn read_name(&mut self) -> Result<String, BsonError>;

    fn skip_name(&mut self) -> Result<(), BsonError>;

    fn skip_value(&mut self) -> Result<(), BsonError>;

    fn read_start_document(&mut self) -> Result<(), BsonError>;

    fn read_end_document(&mut self) -> Result<(), BsonError>;

    fn read_start_array(&mut self) -> Result<(), BsonError>;

    fn read_end_array(&mut self) -> Result<(), BsonError>;

    fn read_binary_data(&mut self) -> Result<BsonBinaryData, BsonError>;

    fn read_boolean(&mut self) -> Result<bool, BsonError>;

    /// Milliseconds since the Unix epoch.
    fn read_date_time(&mut self) -> Result<i64, BsonError>;

    fn read_decimal128(&mut self) -> Result<Decimal128, BsonError>;

    fn read_double(&mut self) -> Result<f64, BsonError>;

    fn read_int32(&mut self) -> Result<i32, BsonError>;

    fn read_int64(&mut self) -> Result<i64, BsonError>;

    fn read_java_script(&mut self) -> Result<String, BsonError>;

    /// Returns the code; the scope follows as a document.
    fn read_java_script_with_scope(&mut self) -> Result<String, BsonError>;

    fn read_max_key(&mut self) -> Result<(), BsonError>;

    fn read_min_key(&mut self) -> Result<(), BsonError>;

    fn read_null(&mut self) -> Result<(), BsonError>;

    fn read_object_id(&mut self) -> Result<ObjectId, BsonError>;

    fn read_regular_expression(&mut self) -> Result<BsonRegularExpression, BsonError>;

    fn read_string(&mut self) -> Result<String, BsonError>;

    fn read_symbol(&mut self) -> Result<String, BsonError>;

    /// The packed timestamp, see [`crate::BsonTimestamp`].
    fn read_timestamp(&mut self) -> Result<i64, BsonError>;

    fn read_undefined(&mut self) -> Result<(), BsonError>;

    fn get_bookmark(&self) -> Self::Bookmark;

    fn return_to_bookmark(&mut self, bookmark: &Self::Bookmark) -> Result<(), BsonError>;

    /// Idempotent. Every later call fails.
    fn close(&mut self);

    /// The current document as standalone encoded bytes.
    fn read_raw_bson_document(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        let fields = copy::read_document(self)?;
        encode_fields(&fields)
    }

    /// The current array as standalone encoded bytes (an array encodes as a
    /// document keyed "0", "1", ...).
    fn read_raw_bson_array(&mut self) -> Result<Box<dyn ByteBuffer>, BsonError> {
        let items = copy::read_array(self)?;
        let fields: Vec<(String, BsonValue)> = items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        encode_fields(&fields)
    }

    fn read_guid(&mut self) -> Result<Guid, BsonError> {
        let representation = self.guid_representation();
        self.read_guid_with(representation)
    }

    fn read_guid_with(&mut self, representation: GuidRepresentation) -> Result<Guid, BsonError> {
        self.read_binary_data()?.to_guid(representation)
    }

    /// Reads a subtype 0 (or old subtype 2) payload.
    fn read_bytes(&mut self) -> Result<Vec<u8>, BsonError> {
        let data = self.read_binary_data()?;
        match data.sub_type {
            BsonBinarySubType::Binary | BsonBinarySubType::OldBinary => Ok(data.bytes),
            other => Err(BsonError::format(format!(
                "read_bytes requires the binary sub type to be Binary, not {other:?}."
            ))),
        }
    }

    /// Reads the name and fails unless it is `expected`.
    fn read_name_expecting(&mut self, expected: &str) -> Result<(), BsonError> {
        let name = self.read_name()?;
        if name != expected {
            return Err(BsonError::format(format!(
                "Expected element name to be '{expected}', not '{name}'."
            )));
        }
        Ok(())
    }

    /// Skips elements of the current document until one named `name`.
    /// Returns false, positioned at the end of the document, if there is none.
    fn find_element(&mut self, name: &str) -> Result<bool, BsonError> {
        loop {
            if self.read_bson_type()? == BsonType::EndOfDocument {
                return Ok(false);
            }
            if self.read_name()? == name {
                return Ok(true);
            }
            self.skip_value()?;
        }
    }
}

fn encode_fields(fields: &[(String, BsonValue)]) -> Result<Box<dyn ByteBuffer>, BsonError> {
    let bytes = copy::to_bson_bytes(fields)?;
    let length = bytes.len();
    Ok(Box::new(ByteArrayBuffer::with_length(bytes, length, true)?))
}

/// Moves a reader to the `Value` state of an element of type `required`,
/// reading the type and skipping the name if the caller has not.
pub(crate) fn verify_bson_type<R: BsonReader + ?Sized>(
    reader: &mut R,
    method: &str,
    required: BsonType,
) -> Result<(), BsonError> {
    check_not_closed(reader.state(), method)?;
    if matches!(
        reader.state(),
        BsonReaderState::Initial
            | BsonReaderState::Done
            | BsonReaderState::ScopeDocument
            | BsonReaderState::Type
    ) {
        reader.read_bson_type()?;
    }
    if reader.state() == BsonReaderState::Name {
        reader.skip_name()?;
    }
    if reader.state() != BsonReaderState::Value {
        return Err(invalid_state(method, reader.state(), &[BsonReaderState::Value]));
    }
    match reader.current_bson_type() {
        Some(current) if current == required => Ok(()),
        current => Err(BsonError::invalid_operation(format!(
            "{method} can only be called when CurrentBsonType is {required}, not when CurrentBsonType is {}.",
            current.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        ))),
    }
}

pub(crate) fn check_not_closed(state: BsonReaderState, method: &str) -> Result<(), BsonError> {
    if state == BsonReaderState::Closed {
        return Err(BsonError::invalid_operation(format!(
            "{method} cannot be called on a closed reader."
        )));
    }
    Ok(())
}

pub(crate) fn invalid_state(
    method: &str,
    actual: BsonReaderState,
    expected: &[BsonReaderState],
) -> BsonError {
    let expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    BsonError::invalid_operation(format!(
        "{method} can only be called when State is {}, not when State is {actual}.",
        expected.join(" or ")
    ))
}
