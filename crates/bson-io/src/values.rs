//! Value types exchanged through the reader/writer contract.

use std::fmt;

use crate::decimal128::Decimal128;
use crate::guid::{Guid, GuidConverter, GuidRepresentation};
use crate::object_id::ObjectId;
use crate::BsonError;

/// Element type codes of the binary format.
///
/// `EndOfDocument` doubles as the marker returned by `read_bson_type` when a
/// document or array has no more elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsonType {
    EndOfDocument,
    Double,
    String,
    Document,
    Array,
    Binary,
    Undefined,
    ObjectId,
    Boolean,
    DateTime,
    Null,
    RegularExpression,
    JavaScript,
    Symbol,
    JavaScriptWithScope,
    Int32,
    Timestamp,
    Int64,
    Decimal128,
    MinKey,
    MaxKey,
}

impl BsonType {
    /// Maps a wire byte to its type. DbPointer (0x0C) and unassigned codes
    /// return `None`.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => BsonType::EndOfDocument,
            0x01 => BsonType::Double,
            0x02 => BsonType::String,
            0x03 => BsonType::Document,
            0x04 => BsonType::Array,
            0x05 => BsonType::Binary,
            0x06 => BsonType::Undefined,
            0x07 => BsonType::ObjectId,
            0x08 => BsonType::Boolean,
            0x09 => BsonType::DateTime,
            0x0a => BsonType::Null,
            0x0b => BsonType::RegularExpression,
            0x0d => BsonType::JavaScript,
            0x0e => BsonType::Symbol,
            0x0f => BsonType::JavaScriptWithScope,
            0x10 => BsonType::Int32,
            0x11 => BsonType::Timestamp,
            0x12 => BsonType::Int64,
            0x13 => BsonType::Decimal128,
            0xff => BsonType::MinKey,
            0x7f => BsonType::MaxKey,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            BsonType::EndOfDocument => 0x00,
            BsonType::Double => 0x01,
            BsonType::String => 0x02,
            BsonType::Document => 0x03,
            BsonType::Array => 0x04,
            BsonType::Binary => 0x05,
            BsonType::Undefined => 0x06,
            BsonType::ObjectId => 0x07,
            BsonType::Boolean => 0x08,
            BsonType::DateTime => 0x09,
            BsonType::Null => 0x0a,
            BsonType::RegularExpression => 0x0b,
            BsonType::JavaScript => 0x0d,
            BsonType::Symbol => 0x0e,
            BsonType::JavaScriptWithScope => 0x0f,
            BsonType::Int32 => 0x10,
            BsonType::Timestamp => 0x11,
            BsonType::Int64 => 0x12,
            BsonType::Decimal128 => 0x13,
            BsonType::MinKey => 0xff,
            BsonType::MaxKey => 0x7f,
        }
    }
}

impl fmt::Display for BsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Binary payload subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsonBinarySubType {
    Binary,
    Function,
    /// Subtype 2, which carries a redundant inner length on the wire.
    OldBinary,
    UuidLegacy,
    UuidStandard,
    Md5,
    Encrypted,
    /// 0x80 and above.
    UserDefined(u8),
    /// Reserved codes this library does not interpret.
    Other(u8),
}

impl BsonBinarySubType {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => BsonBinarySubType::Binary,
            0x01 => BsonBinarySubType::Function,
            0x02 => BsonBinarySubType::OldBinary,
            0x03 => BsonBinarySubType::UuidLegacy,
            0x04 => BsonBinarySubType::UuidStandard,
            0x05 => BsonBinarySubType::Md5,
            0x06 => BsonBinarySubType::Encrypted,
            0x80..=0xff => BsonBinarySubType::UserDefined(code),
            _ => BsonBinarySubType::Other(code),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            BsonBinarySubType::Binary => 0x00,
            BsonBinarySubType::Function => 0x01,
            BsonBinarySubType::OldBinary => 0x02,
            BsonBinarySubType::UuidLegacy => 0x03,
            BsonBinarySubType::UuidStandard => 0x04,
            BsonBinarySubType::Md5 => 0x05,
            BsonBinarySubType::Encrypted => 0x06,
            BsonBinarySubType::UserDefined(code) | BsonBinarySubType::Other(code) => code,
        }
    }

    pub fn is_uuid(self) -> bool {
        matches!(
            self,
            BsonBinarySubType::UuidLegacy | BsonBinarySubType::UuidStandard
        )
    }
}

/// Binary data: a subtype plus raw bytes.
///
/// UUID subtypes stay raw until [`BsonBinaryData::to_guid`] is asked for a
/// particular representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BsonBinaryData {
    pub sub_type: BsonBinarySubType,
    pub bytes: Vec<u8>,
}

impl BsonBinaryData {
    pub fn new(sub_type: BsonBinarySubType, bytes: Vec<u8>) -> Self {
        Self { sub_type, bytes }
    }

    /// Plain subtype 0 binary.
    pub fn generic(bytes: Vec<u8>) -> Self {
        Self::new(BsonBinarySubType::Binary, bytes)
    }

    /// Encodes a GUID with the subtype and byte order `representation` calls for.
    pub fn from_guid(guid: Guid, representation: GuidRepresentation) -> Result<Self, BsonError> {
        let sub_type = GuidConverter::sub_type_for(representation)?;
        let bytes = GuidConverter::to_bytes(guid, representation)?;
        Ok(Self::new(sub_type, bytes.to_vec()))
    }

    /// Resolves a UUID payload to a GUID under `representation`.
    pub fn to_guid(&self, representation: GuidRepresentation) -> Result<Guid, BsonError> {
        GuidConverter::from_binary(&self.bytes, self.sub_type, representation)
    }
}

/// A regular expression: pattern plus option letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BsonRegularExpression {
    pub pattern: String,
    options: String,
}

impl BsonRegularExpression {
    /// Option letters are stored sorted, the order the wire format expects.
    pub fn new(pattern: impl Into<String>, options: &str) -> Self {
        let mut letters: Vec<char> = options.chars().collect();
        letters.sort_unstable();
        Self {
            pattern: pattern.into(),
            options: letters.into_iter().collect(),
        }
    }

    pub fn options(&self) -> &str {
        &self.options
    }
}

/// Replication timestamp split into its two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BsonTimestamp {
    pub timestamp: u32,
    pub increment: u32,
}

impl BsonTimestamp {
    pub fn new(timestamp: u32, increment: u32) -> Self {
        Self {
            timestamp,
            increment,
        }
    }

    /// The packed wire value: timestamp in the high half, increment in the low half.
    pub fn value(self) -> i64 {
        (((self.timestamp as u64) << 32) | self.increment as u64) as i64
    }

    pub fn from_value(value: i64) -> Self {
        let raw = value as u64;
        Self::new((raw >> 32) as u32, raw as u32)
    }
}

/// A minimal value tree used to pipe elements from any reader into any
/// writer. Field order is preserved; there is no lookup API.
#[derive(Debug, Clone, PartialEq)]
pub enum BsonValue {
    Double(f64),
    String(String),
    Document(Vec<(String, BsonValue)>),
    Array(Vec<BsonValue>),
    Binary(BsonBinaryData),
    Undefined,
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(i64),
    Null,
    RegularExpression(BsonRegularExpression),
    JavaScript(String),
    Symbol(String),
    JavaScriptWithScope {
        code: String,
        scope: Vec<(String, BsonValue)>,
    },
    Int32(i32),
    Timestamp(i64),
    Int64(i64),
    Decimal128(Decimal128),
    MinKey,
    MaxKey,
}

impl BsonValue {
    pub fn bson_type(&self) -> BsonType {
        match self {
            BsonValue::Double(_) => BsonType::Double,
            BsonValue::String(_) => BsonType::String,
            BsonValue::Document(_) => BsonType::Document,
            BsonValue::Array(_) => BsonType::Array,
            BsonValue::Binary(_) => BsonType::Binary,
            BsonValue::Undefined => BsonType::Undefined,
            BsonValue::ObjectId(_) => BsonType::ObjectId,
            BsonValue::Boolean(_) => BsonType::Boolean,
            BsonValue::DateTime(_) => BsonType::DateTime,
            BsonValue::Null => BsonType::Null,
            BsonValue::RegularExpression(_) => BsonType::RegularExpression,
            BsonValue::JavaScript(_) => BsonType::JavaScript,
            BsonValue::Symbol(_) => BsonType::Symbol,
            BsonValue::JavaScriptWithScope { .. } => BsonType::JavaScriptWithScope,
            BsonValue::Int32(_) => BsonType::Int32,
            BsonValue::Timestamp(_) => BsonType::Timestamp,
            BsonValue::Int64(_) => BsonType::Int64,
            BsonValue::Decimal128(_) => BsonType::Decimal128,
            BsonValue::MinKey => BsonType::MinKey,
            BsonValue::MaxKey => BsonType::MaxKey,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for code in 0u8..=0xff {
            if let Some(t) = BsonType::from_u8(code) {
                assert_eq!(t.code(), code);
            }
        }
        assert_eq!(BsonType::from_u8(0x0c), None);
        assert_eq!(BsonType::from_u8(0x14), None);
        assert_eq!(BsonType::from_u8(0x7f), Some(BsonType::MaxKey));
    }

    #[test]
    fn sub_types_keep_their_code() {
        for code in 0u8..=0xff {
            assert_eq!(BsonBinarySubType::from_u8(code).code(), code);
        }
        assert_eq!(
            BsonBinarySubType::from_u8(0x80),
            BsonBinarySubType::UserDefined(0x80)
        );
        assert!(BsonBinarySubType::UuidLegacy.is_uuid());
        assert!(!BsonBinarySubType::Md5.is_uuid());
    }

    #[test]
    fn regex_options_are_sorted() {
        let regex = BsonRegularExpression::new("a", "xmi");
        assert_eq!(regex.options(), "imx");
    }

    #[test]
    fn timestamp_packs_halves() {
        let ts = BsonTimestamp::new(1, 2);
        assert_eq!(ts.value(), 0x0000_0001_0000_0002);
        assert_eq!(BsonTimestamp::from_value(-1), BsonTimestamp::new(u32::MAX, u32::MAX));
    }
}
