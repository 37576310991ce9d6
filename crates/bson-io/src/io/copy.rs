//! Piping values between any reader and any writer.

use std::io::Cursor;

use bsonio_buffers::ByteArrayBuffer;

use super::binary_reader::BsonBinaryReader;
use super::binary_writer::BsonBinaryWriter;
use super::byte_buffer_stream::ByteBufferStream;
use super::json_reader::JsonReader;
use super::json_writer::JsonWriter;
use super::reader::{BsonReader, BsonReaderState};
use super::settings::{BsonBinaryReaderSettings, BsonBinaryWriterSettings, JsonWriterSettings};
use super::stream::BsonStreamAdapter;
use super::writer::BsonWriter;
use crate::values::{BsonType, BsonValue};
use crate::BsonError;

/// Reads the value the reader is positioned at, reading its type and
/// skipping its name first if the caller has not.
pub fn read_value<R: BsonReader + ?Sized>(reader: &mut R) -> Result<BsonValue, BsonError> {
    if matches!(
        reader.state(),
        BsonReaderState::Initial
            | BsonReaderState::Done
            | BsonReaderState::Type
            | BsonReaderState::ScopeDocument
    ) {
        reader.read_bson_type()?;
    }
    if reader.state() == BsonReaderState::Name {
        reader.skip_name()?;
    }
    let bson_type = reader
        .current_bson_type()
        .ok_or_else(|| BsonError::invalid_operation("read_value called before read_bson_type."))?;
    Ok(match bson_type {
        BsonType::Double => BsonValue::Double(reader.read_double()?),
        BsonType::String => BsonValue::String(reader.read_string()?),
        BsonType::Document => BsonValue::Document(read_document(reader)?),
        BsonType::Array => BsonValue::Array(read_array(reader)?),
        BsonType::Binary => BsonValue::Binary(reader.read_binary_data()?),
        BsonType::Undefined => {
            reader.read_undefined()?;
            BsonValue::Undefined
        }
        BsonType::ObjectId => BsonValue::ObjectId(reader.read_object_id()?),
        BsonType::Boolean => BsonValue::Boolean(reader.read_boolean()?),
        BsonType::DateTime => BsonValue::DateTime(reader.read_date_time()?),
        BsonType::Null => {
            reader.read_null()?;
            BsonValue::Null
        }
        BsonType::RegularExpression => BsonValue::RegularExpression(reader.read_regular_expression()?),
        BsonType::JavaScript => BsonValue::JavaScript(reader.read_java_script()?),
        BsonType::Symbol => BsonValue::Symbol(reader.read_symbol()?),
        BsonType::JavaScriptWithScope => {
            let code = reader.read_java_script_with_scope()?;
            let scope = read_document(reader)?;
            BsonValue::JavaScriptWithScope { code, scope }
        }
        BsonType::Int32 => BsonValue::Int32(reader.read_int32()?),
        BsonType::Timestamp => BsonValue::Timestamp(reader.read_timestamp()?),
        BsonType::Int64 => BsonValue::Int64(reader.read_int64()?),
        BsonType::Decimal128 => BsonValue::Decimal128(reader.read_decimal128()?),
        BsonType::MinKey => {
            reader.read_min_key()?;
            BsonValue::MinKey
        }
        BsonType::MaxKey => {
            reader.read_max_key()?;
            BsonValue::MaxKey
        }
        BsonType::EndOfDocument => {
            return Err(BsonError::invalid_operation(
                "There is no value to read at the end of a document.",
            ))
        }
    })
}

/// Reads a whole document: start, every element, end.
pub fn read_document<R: BsonReader + ?Sized>(
    reader: &mut R,
) -> Result<Vec<(String, BsonValue)>, BsonError> {
    reader.read_start_document()?;
    let mut fields = Vec::new();
    while reader.read_bson_type()? != BsonType::EndOfDocument {
        let name = reader.read_name()?;
        fields.push((name, read_value(reader)?));
    }
    reader.read_end_document()?;
    Ok(fields)
}

pub fn read_array<R: BsonReader + ?Sized>(reader: &mut R) -> Result<Vec<BsonValue>, BsonError> {
    reader.read_start_array()?;
    let mut items = Vec::new();
    while reader.read_bson_type()? != BsonType::EndOfDocument {
        items.push(read_value(reader)?);
    }
    reader.read_end_array()?;
    Ok(items)
}

/// Writes `value` as the writer's current value.
pub fn write_value<W: BsonWriter + ?Sized>(writer: &mut W, value: &BsonValue) -> Result<(), BsonError> {
    match value {
        BsonValue::Double(v) => writer.write_double(*v),
        BsonValue::String(v) => writer.write_string(v),
        BsonValue::Document(fields) => write_document(writer, fields),
        BsonValue::Array(items) => {
            writer.write_start_array()?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_end_array()
        }
        BsonValue::Binary(data) => writer.write_binary_data(data),
        BsonValue::Undefined => writer.write_undefined(),
        BsonValue::ObjectId(id) => writer.write_object_id(*id),
        BsonValue::Boolean(v) => writer.write_boolean(*v),
        BsonValue::DateTime(millis) => writer.write_date_time(*millis),
        BsonValue::Null => writer.write_null(),
        BsonValue::RegularExpression(regex) => writer.write_regular_expression(regex),
        BsonValue::JavaScript(code) => writer.write_java_script(code),
        BsonValue::Symbol(symbol) => writer.write_symbol(symbol),
        BsonValue::JavaScriptWithScope { code, scope } => {
            writer.write_java_script_with_scope(code)?;
            write_document(writer, scope)
        }
        BsonValue::Int32(v) => writer.write_int32(*v),
        BsonValue::Timestamp(v) => writer.write_timestamp(*v),
        BsonValue::Int64(v) => writer.write_int64(*v),
        BsonValue::Decimal128(v) => writer.write_decimal128(*v),
        BsonValue::MinKey => writer.write_min_key(),
        BsonValue::MaxKey => writer.write_max_key(),
    }
}

pub fn write_document<W: BsonWriter + ?Sized>(
    writer: &mut W,
    fields: &[(String, BsonValue)],
) -> Result<(), BsonError> {
    writer.write_start_document()?;
    for (name, value) in fields {
        writer.write_name(name)?;
        write_value(writer, value)?;
    }
    writer.write_end_document()
}

/// Copies the document the reader is positioned at into the writer.
pub fn copy_document<R, W>(reader: &mut R, writer: &mut W) -> Result<(), BsonError>
where
    R: BsonReader + ?Sized,
    W: BsonWriter + ?Sized,
{
    let fields = read_document(reader)?;
    write_document(writer, &fields)
}

/// Encodes a top-level document to bytes.
pub fn to_bson_bytes(fields: &[(String, BsonValue)]) -> Result<Vec<u8>, BsonError> {
    let stream = BsonStreamAdapter::new(Cursor::new(Vec::new()))?;
    let mut writer = BsonBinaryWriter::new(stream, BsonBinaryWriterSettings::default());
    write_document(&mut writer, fields)?;
    Ok(writer.into_stream().into_inner().into_inner())
}

/// Decodes one top-level document from bytes.
pub fn from_bson_bytes(bytes: &[u8]) -> Result<Vec<(String, BsonValue)>, BsonError> {
    let stream = ByteBufferStream::new(ByteArrayBuffer::new(bytes.to_vec()))?;
    let mut reader = BsonBinaryReader::new(stream, BsonBinaryReaderSettings::default());
    read_document(&mut reader)
}

/// Renders one value as extended JSON.
pub fn to_json(value: &BsonValue, settings: JsonWriterSettings) -> Result<String, BsonError> {
    let mut writer = JsonWriter::new(Vec::new(), settings);
    write_value(&mut writer, value)?;
    super::stream::decode_utf8(writer.into_inner())
}

/// Parses one top-level extended JSON value; trailing values are ignored.
pub fn from_json(json: &str) -> Result<BsonValue, BsonError> {
    read_value(&mut JsonReader::new(json))
}
