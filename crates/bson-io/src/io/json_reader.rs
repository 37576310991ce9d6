//! Reader over extended JSON text.
//!
//! Both the strict `$`-prefixed wrapper objects and the shell constructor
//! forms (`ObjectId("...")`, `NumberLong(...)`, `/re/i`, ...) are accepted.
//! A `{` is disambiguated by peeking at the first name: a known `$` key
//! makes it a wrapped scalar, anything else a plain document.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use super::context::{ContextStack, ContextType, Frame};
use super::iso_date::{format_date_string, parse_iso_date};
use super::json_scanner::{JsonBuffer, JsonToken};
use super::reader::{check_not_closed, invalid_state, verify_bson_type, BsonReader, BsonReaderState};
use super::settings::JsonReaderSettings;
use super::stream::decode_utf8;
use crate::decimal128::Decimal128;
use crate::guid::{hex_value, Guid, GuidRepresentation};
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonType, BsonValue};
use crate::BsonError;

/// A parsed value: its type plus the scalar payload, if it has one.
type Parsed = (BsonType, Option<BsonValue>);

#[derive(Debug, Clone)]
struct JsonReaderFrame {
    context_type: ContextType,
}

impl Frame for JsonReaderFrame {
    fn context_type(&self) -> ContextType {
        self.context_type
    }
}

#[derive(Debug, Clone)]
pub struct JsonReaderBookmark {
    state: BsonReaderState,
    current_bson_type: Option<BsonType>,
    current_name: Option<String>,
    context: ContextStack<JsonReaderFrame>,
    current_value: Option<BsonValue>,
    pushed_token: Option<JsonToken>,
    position: usize,
}

/// Reads extended JSON through the [`BsonReader`] protocol.
///
/// Any value may appear at the top level, and several top-level values may
/// follow each other back to back.
pub struct JsonReader {
    buffer: JsonBuffer,
    settings: JsonReaderSettings,
    state: BsonReaderState,
    current_bson_type: Option<BsonType>,
    current_name: Option<String>,
    context: ContextStack<JsonReaderFrame>,
    current_value: Option<BsonValue>,
    pushed_token: Option<JsonToken>,
}

impl JsonReader {
    pub fn new(json: impl Into<String>) -> Self {
        Self::with_settings(json, JsonReaderSettings::default())
    }

    pub fn with_settings(json: impl Into<String>, settings: JsonReaderSettings) -> Self {
        Self {
            buffer: JsonBuffer::new(json.into()),
            settings,
            state: BsonReaderState::Initial,
            current_bson_type: None,
            current_name: None,
            context: ContextStack::new(JsonReaderFrame {
                context_type: ContextType::TopLevel,
            }),
            current_value: None,
            pushed_token: None,
        }
    }

    /// Decodes `bytes` by their byte order mark: UTF-8, UTF-16 LE or
    /// UTF-16 BE. Input without a mark must be UTF-8.
    pub fn from_bytes(bytes: &[u8], settings: JsonReaderSettings) -> Result<Self, BsonError> {
        Ok(Self::with_settings(decode_text(bytes)?, settings))
    }

    pub fn settings(&self) -> &JsonReaderSettings {
        &self.settings
    }

    fn next_state(&self) -> BsonReaderState {
        match self.context.context_type() {
            ContextType::TopLevel => BsonReaderState::Done,
            _ => BsonReaderState::Type,
        }
    }

    fn in_document(&self) -> bool {
        matches!(
            self.context.context_type(),
            ContextType::Document | ContextType::ScopeDocument
        )
    }

    fn pop_token(&mut self) -> Result<JsonToken, BsonError> {
        match self.pushed_token.take() {
            Some(token) => Ok(token),
            None => self.buffer.next_token(),
        }
    }

    fn push_token(&mut self, token: JsonToken) -> Result<(), BsonError> {
        if self.pushed_token.is_some() {
            return Err(BsonError::invalid_operation("There is already a pending token."));
        }
        self.pushed_token = Some(token);
        Ok(())
    }

    /// Consumes the comma after a value, if there is one.
    fn consume_comma(&mut self) -> Result<(), BsonError> {
        if matches!(
            self.context.context_type(),
            ContextType::Array | ContextType::Document | ContextType::ScopeDocument
        ) {
            let token = self.pop_token()?;
            if token != JsonToken::Comma {
                self.push_token(token)?;
            }
        }
        Ok(())
    }

    /// Expects a punctuation or bare-word token with this exact text.
    fn verify_token(&mut self, expected: &str) -> Result<(), BsonError> {
        let token = self.pop_token()?;
        if token.lexeme() != expected || matches!(token, JsonToken::String(_)) {
            return Err(expected_but_found(&format!("'{expected}'"), &token));
        }
        Ok(())
    }

    /// Expects a name, quoted or not.
    fn verify_string(&mut self, expected: &str) -> Result<(), BsonError> {
        let token = self.pop_token()?;
        if token.string() != Some(expected) {
            return Err(expected_but_found(&format!("'{expected}'"), &token));
        }
        Ok(())
    }

    fn pop_string(&mut self) -> Result<String, BsonError> {
        match self.pop_token()? {
            JsonToken::String(s) => Ok(s),
            other => Err(expected_but_found("a string", &other)),
        }
    }

    /// Maps the token that starts a value to its type and payload.
    fn parse_value(&mut self, token: JsonToken) -> Result<Parsed, BsonError> {
        let parsed = match token {
            JsonToken::BeginArray => (BsonType::Array, None),
            JsonToken::BeginObject => self.parse_extended_json()?,
            JsonToken::Double { value, .. } => (BsonType::Double, Some(BsonValue::Double(value))),
            JsonToken::Int32 { value, .. } => (BsonType::Int32, Some(BsonValue::Int32(value))),
            JsonToken::Int64 { value, .. } => (BsonType::Int64, Some(BsonValue::Int64(value))),
            JsonToken::RegularExpression(regex) => (
                BsonType::RegularExpression,
                Some(BsonValue::RegularExpression(regex)),
            ),
            JsonToken::String(s) => (BsonType::String, Some(BsonValue::String(s))),
            JsonToken::UnquotedString(ref word) => match word.as_str() {
                "true" => (BsonType::Boolean, Some(BsonValue::Boolean(true))),
                "false" => (BsonType::Boolean, Some(BsonValue::Boolean(false))),
                "null" => (BsonType::Null, Some(BsonValue::Null)),
                "undefined" => (BsonType::Undefined, Some(BsonValue::Undefined)),
                "MaxKey" => (BsonType::MaxKey, Some(BsonValue::MaxKey)),
                "MinKey" => (BsonType::MinKey, Some(BsonValue::MinKey)),
                "NaN" => (BsonType::Double, Some(BsonValue::Double(f64::NAN))),
                "Infinity" => (BsonType::Double, Some(BsonValue::Double(f64::INFINITY))),
                "Date" => self.parse_date_constructor(false)?,
                "new" => self.parse_new()?,
                constructor => match self.parse_constructor(constructor)? {
                    Some(parsed) => parsed,
                    None => return Err(expecting_value(&token)),
                },
            },
            other => return Err(expecting_value(&other)),
        };
        Ok(parsed)
    }

    /// Constructors that may be written with or without `new`.
    fn parse_constructor(&mut self, name: &str) -> Result<Option<Parsed>, BsonError> {
        let parsed = match name {
            "BinData" => self.parse_bin_data_constructor()?,
            "HexData" => self.parse_hex_data_constructor()?,
            "ISODate" => self.parse_iso_date_constructor()?,
            "NumberDecimal" => self.parse_number_decimal_constructor()?,
            "Number" | "NumberInt" => self.parse_number_constructor()?,
            "NumberLong" => self.parse_number_long_constructor()?,
            "ObjectId" => self.parse_object_id_constructor()?,
            "RegExp" => self.parse_regular_expression_constructor()?,
            "Timestamp" => self.parse_timestamp_constructor()?,
            "UUID" | "GUID" => self.parse_uuid_constructor(GuidRepresentation::Standard)?,
            "CSUUID" | "CSGUID" => self.parse_uuid_constructor(GuidRepresentation::CSharpLegacy)?,
            "JUUID" | "JGUID" => self.parse_uuid_constructor(GuidRepresentation::JavaLegacy)?,
            "PYUUID" | "PYGUID" => self.parse_uuid_constructor(GuidRepresentation::PythonLegacy)?,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    fn parse_new(&mut self) -> Result<Parsed, BsonError> {
        let token = self.pop_token()?;
        match token.string() {
            Some("Date") => self.parse_date_constructor(true),
            Some(name) if matches!(token, JsonToken::UnquotedString(_)) => {
                let name = name.to_string();
                self.parse_constructor(&name)?
                    .ok_or_else(|| expected_but_found("a type name", &token))
            }
            _ => Err(expected_but_found("a type name", &token)),
        }
    }

    fn parse_extended_json(&mut self) -> Result<Parsed, BsonError> {
        let name_token = self.pop_token()?;
        if let Some(name) = name_token.string() {
            let parsed = match name {
                "$binary" => Some(self.parse_binary_extended_json()?),
                "$code" => Some(self.parse_java_script_extended_json()?),
                "$date" => Some(self.parse_date_time_extended_json()?),
                "$maxKey" | "$maxkey" => Some(self.parse_key_extended_json(BsonType::MaxKey)?),
                "$minKey" | "$minkey" => Some(self.parse_key_extended_json(BsonType::MinKey)?),
                "$numberDecimal" => Some(self.parse_number_decimal_extended_json()?),
                "$numberDouble" => Some(self.parse_number_double_extended_json()?),
                "$numberInt" => Some(self.parse_number_int_extended_json()?),
                "$numberLong" => Some(self.parse_number_long_extended_json()?),
                "$oid" => Some(self.parse_object_id_extended_json()?),
                "$regex" => Some(self.parse_regex_extended_json()?),
                "$regularExpression" => Some(self.parse_regular_expression_extended_json()?),
                "$symbol" => Some(self.parse_symbol_extended_json()?),
                "$timestamp" => Some(self.parse_timestamp_extended_json()?),
                "$undefined" => Some(self.parse_undefined_extended_json()?),
                _ => None,
            };
            if let Some(parsed) = parsed {
                return Ok(parsed);
            }
        }
        self.push_token(name_token)?;
        Ok((BsonType::Document, None))
    }

    /// Reads `name : value, name : value }` with the two names in either
    /// order. Returns the value tokens in the order the names were given.
    fn read_pair(&mut self, first: &str, second: &str) -> Result<(JsonToken, JsonToken), BsonError> {
        let mut values: [Option<JsonToken>; 2] = [None, None];
        for i in 0..2 {
            if i == 1 {
                self.verify_token(",")?;
            }
            let name_token = self.pop_token()?;
            let slot = match name_token.string() {
                Some(name) if name == first && values[0].is_none() => 0,
                Some(name) if name == second && values[1].is_none() => 1,
                _ => {
                    return Err(expected_but_found(
                        &format!("'{first}' or '{second}'"),
                        &name_token,
                    ))
                }
            };
            self.verify_token(":")?;
            values[slot] = Some(self.pop_token()?);
        }
        self.verify_token("}")?;
        match values {
            [Some(a), Some(b)] => Ok((a, b)),
            _ => Err(BsonError::format(format!(
                "JSON reader expected both '{first}' and '{second}'."
            ))),
        }
    }

    fn parse_binary_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let (bytes, sub_type) = if token == JsonToken::BeginObject {
            self.read_pair("base64", "subType")?
        } else {
            self.verify_token(",")?;
            self.verify_string("$type")?;
            self.verify_token(":")?;
            (token, self.pop_token()?)
        };
        let data = BsonBinaryData::new(sub_type_from_token(&sub_type)?, base64_from_token(&bytes)?);
        self.verify_token("}")?;
        Ok((BsonType::Binary, Some(BsonValue::Binary(data))))
    }

    fn parse_java_script_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let code = self.pop_string()?;
        match self.pop_token()? {
            JsonToken::Comma => {
                self.verify_string("$scope")?;
                self.verify_token(":")?;
                Ok((BsonType::JavaScriptWithScope, Some(BsonValue::JavaScript(code))))
            }
            JsonToken::EndObject => Ok((BsonType::JavaScript, Some(BsonValue::JavaScript(code)))),
            other => Err(expected_but_found("',' or '}'", &other)),
        }
    }

    fn parse_date_time_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let millis = match token {
            JsonToken::Int32 { .. } | JsonToken::Int64 { .. } => token.integer().unwrap_or_default(),
            JsonToken::String(ref text) => parse_iso_date(text)?,
            JsonToken::BeginObject => {
                self.verify_string("$numberLong")?;
                self.verify_token(":")?;
                let value = self.pop_token()?;
                let millis = int64_from_token(&value)?;
                self.verify_token("}")?;
                millis
            }
            other => return Err(expected_but_found("a $date value", &other)),
        };
        self.verify_token("}")?;
        Ok((BsonType::DateTime, Some(BsonValue::DateTime(millis))))
    }

    fn parse_key_extended_json(&mut self, bson_type: BsonType) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        self.verify_token("1")?;
        self.verify_token("}")?;
        let value = if bson_type == BsonType::MaxKey {
            BsonValue::MaxKey
        } else {
            BsonValue::MinKey
        };
        Ok((bson_type, Some(value)))
    }

    fn parse_number_decimal_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let value = decimal128_from_token(&token)?;
        self.verify_token("}")?;
        Ok((BsonType::Decimal128, Some(BsonValue::Decimal128(value))))
    }

    fn parse_number_double_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let value = match token {
            JsonToken::String(ref text) => parse_double_text(text)
                .ok_or_else(|| BsonError::format(format!("Invalid $numberDouble string: '{text}'.")))?,
            JsonToken::Double { value, .. } => value,
            JsonToken::Int32 { value, .. } => f64::from(value),
            JsonToken::Int64 { value, .. } => value as f64,
            other => return Err(expected_but_found("a $numberDouble value", &other)),
        };
        self.verify_token("}")?;
        Ok((BsonType::Double, Some(BsonValue::Double(value))))
    }

    fn parse_number_int_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let value = int32_from_token(&token)?;
        self.verify_token("}")?;
        Ok((BsonType::Int32, Some(BsonValue::Int32(value))))
    }

    fn parse_number_long_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let value = int64_from_token(&token)?;
        self.verify_token("}")?;
        Ok((BsonType::Int64, Some(BsonValue::Int64(value))))
    }

    fn parse_object_id_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let id = ObjectId::from_str(&self.pop_string()?)?;
        self.verify_token("}")?;
        Ok((BsonType::ObjectId, Some(BsonValue::ObjectId(id))))
    }

    /// The legacy `{ $regex : "...", $options : "..." }` form.
    fn parse_regex_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let pattern = self.pop_string()?;
        self.verify_token(",")?;
        self.verify_string("$options")?;
        self.verify_token(":")?;
        let options = self.pop_string()?;
        self.verify_token("}")?;
        let regex = BsonRegularExpression::new(pattern, &options);
        Ok((BsonType::RegularExpression, Some(BsonValue::RegularExpression(regex))))
    }

    fn parse_regular_expression_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        self.verify_token("{")?;
        let (pattern, options) = self.read_pair("pattern", "options")?;
        let (JsonToken::String(pattern), JsonToken::String(options)) = (&pattern, &options) else {
            let offender = if matches!(pattern, JsonToken::String(_)) {
                &options
            } else {
                &pattern
            };
            return Err(expected_but_found("a string", offender));
        };
        let regex = BsonRegularExpression::new(pattern.clone(), options);
        self.verify_token("}")?;
        Ok((BsonType::RegularExpression, Some(BsonValue::RegularExpression(regex))))
    }

    fn parse_symbol_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let symbol = self.pop_string()?;
        self.verify_token("}")?;
        Ok((BsonType::Symbol, Some(BsonValue::Symbol(symbol))))
    }

    fn parse_timestamp_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        let token = self.pop_token()?;
        let value = match token {
            JsonToken::BeginObject => {
                let (t, i) = self.read_pair("t", "i")?;
                timestamp_value(&t, &i)?
            }
            JsonToken::Int32 { .. } | JsonToken::Int64 { .. } => token.integer().unwrap_or_default(),
            JsonToken::UnquotedString(ref word) if word == "NumberLong" => {
                match self.parse_number_long_constructor()? {
                    (_, Some(BsonValue::Int64(value))) => value,
                    _ => return Err(expected_but_found("a $timestamp value", &token)),
                }
            }
            other => return Err(expected_but_found("a $timestamp value", &other)),
        };
        self.verify_token("}")?;
        Ok((BsonType::Timestamp, Some(BsonValue::Timestamp(value))))
    }

    fn parse_undefined_extended_json(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token(":")?;
        self.verify_token("true")?;
        self.verify_token("}")?;
        Ok((BsonType::Undefined, Some(BsonValue::Undefined)))
    }

    fn parse_bin_data_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let sub_type = self.pop_token()?;
        self.verify_token(",")?;
        let bytes = self.pop_token()?;
        self.verify_token(")")?;
        let data = BsonBinaryData::new(sub_type_from_token(&sub_type)?, base64_from_token(&bytes)?);
        Ok((BsonType::Binary, Some(BsonValue::Binary(data))))
    }

    fn parse_hex_data_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let sub_type = self.pop_token()?;
        self.verify_token(",")?;
        let hex = self.pop_string()?;
        self.verify_token(")")?;
        let data = BsonBinaryData::new(sub_type_from_token(&sub_type)?, parse_hex(&hex)?);
        Ok((BsonType::Binary, Some(BsonValue::Binary(data))))
    }

    fn parse_uuid_constructor(&mut self, representation: GuidRepresentation) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let guid = Guid::from_str(&self.pop_string()?)?;
        self.verify_token(")")?;
        let data = BsonBinaryData::from_guid(guid, representation)?;
        Ok((BsonType::Binary, Some(BsonValue::Binary(data))))
    }

    fn parse_iso_date_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let millis = match self.pop_token()? {
            JsonToken::RightParen => return Ok(now()),
            JsonToken::String(text) => parse_iso_date(&text)?,
            other => return Err(expected_but_found("a string", &other)),
        };
        self.verify_token(")")?;
        Ok((BsonType::DateTime, Some(BsonValue::DateTime(millis))))
    }

    /// `new Date(...)` yields a date; a bare `Date()` yields the current
    /// time as a string, as the shell does.
    fn parse_date_constructor(&mut self, with_new: bool) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        if !with_new {
            self.verify_token(")")?;
            let text = format_date_string(Utc::now());
            return Ok((BsonType::String, Some(BsonValue::String(text))));
        }
        let millis = match self.pop_token()? {
            JsonToken::RightParen => return Ok(now()),
            JsonToken::String(text) => parse_iso_date(&text)?,
            JsonToken::Int32 { value, .. } => i64::from(value),
            JsonToken::Int64 { value, .. } => value,
            JsonToken::Double { value, .. } => value as i64,
            other => return Err(expected_but_found("a date value", &other)),
        };
        self.verify_token(")")?;
        Ok((BsonType::DateTime, Some(BsonValue::DateTime(millis))))
    }

    fn parse_number_decimal_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let token = self.pop_token()?;
        let value = decimal128_from_token(&token)?;
        self.verify_token(")")?;
        Ok((BsonType::Decimal128, Some(BsonValue::Decimal128(value))))
    }

    fn parse_number_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let token = self.pop_token()?;
        let value = int32_from_token(&token)?;
        self.verify_token(")")?;
        Ok((BsonType::Int32, Some(BsonValue::Int32(value))))
    }

    fn parse_number_long_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let token = self.pop_token()?;
        let value = int64_from_token(&token)?;
        self.verify_token(")")?;
        Ok((BsonType::Int64, Some(BsonValue::Int64(value))))
    }

    fn parse_object_id_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let id = ObjectId::from_str(&self.pop_string()?)?;
        self.verify_token(")")?;
        Ok((BsonType::ObjectId, Some(BsonValue::ObjectId(id))))
    }

    fn parse_regular_expression_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let pattern = self.pop_string()?;
        let options = match self.pop_token()? {
            JsonToken::Comma => {
                let options = self.pop_string()?;
                self.verify_token(")")?;
                options
            }
            JsonToken::RightParen => String::new(),
            other => return Err(expected_but_found("',' or ')'", &other)),
        };
        let regex = BsonRegularExpression::new(pattern, &options);
        Ok((BsonType::RegularExpression, Some(BsonValue::RegularExpression(regex))))
    }

    fn parse_timestamp_constructor(&mut self) -> Result<Parsed, BsonError> {
        self.verify_token("(")?;
        let t = self.pop_token()?;
        self.verify_token(",")?;
        let i = self.pop_token()?;
        self.verify_token(")")?;
        Ok((BsonType::Timestamp, Some(BsonValue::Timestamp(timestamp_value(&t, &i)?))))
    }

    /// Verifies the type, moves past the value and hands back its payload.
    fn take_value(&mut self, method: &str, required: BsonType) -> Result<BsonValue, BsonError> {
        verify_bson_type(self, method, required)?;
        let value = self.current_value.clone().ok_or_else(|| {
            BsonError::invalid_operation(format!("{method} found no current value."))
        })?;
        self.state = self.next_state();
        Ok(value)
    }
}

impl BsonReader for JsonReader {
    type Bookmark = JsonReaderBookmark;

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
        if !matches!(self.state, BsonReaderState::Initial | BsonReaderState::Done) {
            return Ok(false);
        }
        Ok(match self.pushed_token {
            None | Some(JsonToken::EndOfFile) => self.buffer.is_exhausted(),
            Some(_) => false,
        })
    }

    fn read_bson_type(&mut self) -> Result<BsonType, BsonError> {
        check_not_closed(self.state, "read_bson_type")?;
        if matches!(
            self.state,
            BsonReaderState::Initial | BsonReaderState::Done | BsonReaderState::ScopeDocument
        ) {
            // Any value may stand at the top level
            self.state = BsonReaderState::Type;
        }
        if self.state != BsonReaderState::Type {
            return Err(invalid_state("read_bson_type", self.state, &[BsonReaderState::Type]));
        }

        let in_document = self.in_document();
        if in_document {
            match self.pop_token()? {
                JsonToken::String(name) | JsonToken::UnquotedString(name) => {
                    self.current_name = Some(name);
                }
                JsonToken::EndObject => {
                    self.current_bson_type = Some(BsonType::EndOfDocument);
                    self.state = BsonReaderState::EndOfDocument;
                    return Ok(BsonType::EndOfDocument);
                }
                other => {
                    return Err(BsonError::format(format!(
                        "JSON reader was expecting a name but found '{other}'."
                    )))
                }
            }
            self.verify_token(":")?;
        }

        let token = self.pop_token()?;
        if self.context.context_type() == ContextType::Array && token == JsonToken::EndArray {
            self.current_bson_type = Some(BsonType::EndOfDocument);
            self.state = BsonReaderState::EndOfArray;
            return Ok(BsonType::EndOfDocument);
        }

        let (bson_type, value) = self.parse_value(token)?;
        self.current_bson_type = Some(bson_type);
        self.current_value = value;
        if !matches!(
            bson_type,
            BsonType::Document | BsonType::Array | BsonType::JavaScriptWithScope
        ) {
            self.consume_comma()?;
        }
        self.state = if in_document {
            BsonReaderState::Name
        } else {
            BsonReaderState::Value
        };
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
        self.state = BsonReaderState::Value;
        Ok(self.current_name.clone().unwrap_or_default())
    }

    fn skip_name(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "skip_name")?;
        if self.state != BsonReaderState::Name {
            return Err(invalid_state("skip_name", self.state, &[BsonReaderState::Name]));
        }
        self.state = BsonReaderState::Value;
        Ok(())
    }

    fn skip_value(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "skip_value")?;
        if self.state != BsonReaderState::Value {
            return Err(invalid_state("skip_value", self.state, &[BsonReaderState::Value]));
        }
        match self.current_bson_type {
            Some(BsonType::Array) => {
                self.read_start_array()?;
                while self.read_bson_type()? != BsonType::EndOfDocument {
                    self.skip_value()?;
                }
                self.read_end_array()
            }
            Some(BsonType::Document) => {
                self.read_start_document()?;
                while self.read_bson_type()? != BsonType::EndOfDocument {
                    self.skip_name()?;
                    self.skip_value()?;
                }
                self.read_end_document()
            }
            Some(BsonType::JavaScriptWithScope) => {
                self.read_java_script_with_scope()?;
                self.read_start_document()?;
                while self.read_bson_type()? != BsonType::EndOfDocument {
                    self.skip_name()?;
                    self.skip_value()?;
                }
                self.read_end_document()
            }
            Some(BsonType::EndOfDocument) | None => {
                Err(BsonError::invalid_operation("There is no value to skip."))
            }
            Some(_) => {
                self.state = self.next_state();
                Ok(())
            }
        }
    }

    fn read_start_document(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_start_document", BsonType::Document)?;
        let context_type = if self.context.context_type() == ContextType::JavaScriptWithScope {
            ContextType::ScopeDocument
        } else {
            ContextType::Document
        };
        self.context.push(JsonReaderFrame { context_type });
        self.state = BsonReaderState::Type;
        Ok(())
    }

    fn read_end_document(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "read_end_document")?;
        if !self.in_document() {
            return Err(BsonError::invalid_operation(format!(
                "read_end_document can only be called when ContextType is Document or ScopeDocument, not when ContextType is {:?}.",
                self.context.context_type()
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
        self.context.pop()?;
        if self.context.context_type() == ContextType::JavaScriptWithScope {
            self.context.pop()?;
            // Closing brace of the `$code` wrapper
            self.verify_token("}")?;
        }
        self.state = self.next_state();
        self.consume_comma()
    }

    fn read_start_array(&mut self) -> Result<(), BsonError> {
        verify_bson_type(self, "read_start_array", BsonType::Array)?;
        self.context.push(JsonReaderFrame {
            context_type: ContextType::Array,
        });
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
        self.context.pop()?;
        self.state = self.next_state();
        self.consume_comma()
    }

    fn read_binary_data(&mut self) -> Result<BsonBinaryData, BsonError> {
        match self.take_value("read_binary_data", BsonType::Binary)? {
            BsonValue::Binary(data) => Ok(data),
            other => Err(mismatched("read_binary_data", &other)),
        }
    }

    fn read_boolean(&mut self) -> Result<bool, BsonError> {
        match self.take_value("read_boolean", BsonType::Boolean)? {
            BsonValue::Boolean(value) => Ok(value),
            other => Err(mismatched("read_boolean", &other)),
        }
    }

    fn read_date_time(&mut self) -> Result<i64, BsonError> {
        match self.take_value("read_date_time", BsonType::DateTime)? {
            BsonValue::DateTime(millis) => Ok(millis),
            other => Err(mismatched("read_date_time", &other)),
        }
    }

    fn read_decimal128(&mut self) -> Result<Decimal128, BsonError> {
        match self.take_value("read_decimal128", BsonType::Decimal128)? {
            BsonValue::Decimal128(value) => Ok(value),
            other => Err(mismatched("read_decimal128", &other)),
        }
    }

    fn read_double(&mut self) -> Result<f64, BsonError> {
        match self.take_value("read_double", BsonType::Double)? {
            BsonValue::Double(value) => Ok(value),
            other => Err(mismatched("read_double", &other)),
        }
    }

    fn read_int32(&mut self) -> Result<i32, BsonError> {
        match self.take_value("read_int32", BsonType::Int32)? {
            BsonValue::Int32(value) => Ok(value),
            other => Err(mismatched("read_int32", &other)),
        }
    }

    fn read_int64(&mut self) -> Result<i64, BsonError> {
        match self.take_value("read_int64", BsonType::Int64)? {
            BsonValue::Int64(value) => Ok(value),
            other => Err(mismatched("read_int64", &other)),
        }
    }

    fn read_java_script(&mut self) -> Result<String, BsonError> {
        match self.take_value("read_java_script", BsonType::JavaScript)? {
            BsonValue::JavaScript(code) => Ok(code),
            other => Err(mismatched("read_java_script", &other)),
        }
    }

    fn read_java_script_with_scope(&mut self) -> Result<String, BsonError> {
        verify_bson_type(self, "read_java_script_with_scope", BsonType::JavaScriptWithScope)?;
        let code = match &self.current_value {
            Some(BsonValue::JavaScript(code)) => code.clone(),
            _ => {
                return Err(BsonError::invalid_operation(
                    "read_java_script_with_scope found no current code.",
                ))
            }
        };
        self.context.push(JsonReaderFrame {
            context_type: ContextType::JavaScriptWithScope,
        });
        self.state = BsonReaderState::ScopeDocument;
        Ok(code)
    }

    fn read_max_key(&mut self) -> Result<(), BsonError> {
        self.take_value("read_max_key", BsonType::MaxKey).map(drop)
    }

    fn read_min_key(&mut self) -> Result<(), BsonError> {
        self.take_value("read_min_key", BsonType::MinKey).map(drop)
    }

    fn read_null(&mut self) -> Result<(), BsonError> {
        self.take_value("read_null", BsonType::Null).map(drop)
    }

    fn read_object_id(&mut self) -> Result<ObjectId, BsonError> {
        match self.take_value("read_object_id", BsonType::ObjectId)? {
            BsonValue::ObjectId(id) => Ok(id),
            other => Err(mismatched("read_object_id", &other)),
        }
    }

    fn read_regular_expression(&mut self) -> Result<BsonRegularExpression, BsonError> {
        match self.take_value("read_regular_expression", BsonType::RegularExpression)? {
            BsonValue::RegularExpression(regex) => Ok(regex),
            other => Err(mismatched("read_regular_expression", &other)),
        }
    }

    fn read_string(&mut self) -> Result<String, BsonError> {
        match self.take_value("read_string", BsonType::String)? {
            BsonValue::String(value) => Ok(value),
            other => Err(mismatched("read_string", &other)),
        }
    }

    fn read_symbol(&mut self) -> Result<String, BsonError> {
        match self.take_value("read_symbol", BsonType::Symbol)? {
            BsonValue::Symbol(value) => Ok(value),
            other => Err(mismatched("read_symbol", &other)),
        }
    }

    fn read_timestamp(&mut self) -> Result<i64, BsonError> {
        match self.take_value("read_timestamp", BsonType::Timestamp)? {
            BsonValue::Timestamp(value) => Ok(value),
            other => Err(mismatched("read_timestamp", &other)),
        }
    }

    fn read_undefined(&mut self) -> Result<(), BsonError> {
        self.take_value("read_undefined", BsonType::Undefined).map(drop)
    }

    fn get_bookmark(&self) -> JsonReaderBookmark {
        JsonReaderBookmark {
            state: self.state,
            current_bson_type: self.current_bson_type,
            current_name: self.current_name.clone(),
            context: self.context.clone(),
            current_value: self.current_value.clone(),
            pushed_token: self.pushed_token.clone(),
            position: self.buffer.position(),
        }
    }

    fn return_to_bookmark(&mut self, bookmark: &JsonReaderBookmark) -> Result<(), BsonError> {
        check_not_closed(self.state, "return_to_bookmark")?;
        self.state = bookmark.state;
        self.current_bson_type = bookmark.current_bson_type;
        self.current_name = bookmark.current_name.clone();
        self.context = bookmark.context.clone();
        self.current_value = bookmark.current_value.clone();
        self.pushed_token = bookmark.pushed_token.clone();
        self.buffer.set_position(bookmark.position);
        Ok(())
    }

    fn close(&mut self) {
        self.state = BsonReaderState::Closed;
    }
}

fn decode_text(bytes: &[u8]) -> Result<String, BsonError> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]) {
        return decode_utf8(rest.to_vec());
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF][..]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE][..]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    decode_utf8(bytes.to_vec())
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, BsonError> {
    if bytes.len() % 2 != 0 {
        return Err(BsonError::format("UTF-16 input has an odd number of bytes."));
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| BsonError::format(format!("Invalid UTF-16 input: {e}.")))
}

fn now() -> Parsed {
    let millis = Utc::now().timestamp_millis();
    (BsonType::DateTime, Some(BsonValue::DateTime(millis)))
}

fn expected_but_found(what: &str, token: &JsonToken) -> BsonError {
    BsonError::format(format!("JSON reader expected {what} but found '{token}'."))
}

fn expecting_value(token: &JsonToken) -> BsonError {
    BsonError::format(format!("JSON reader was expecting a value but found '{token}'."))
}

fn mismatched(method: &str, value: &BsonValue) -> BsonError {
    BsonError::invalid_operation(format!(
        "{method} found a current value of type {}.",
        value.bson_type()
    ))
}

fn base64_from_token(token: &JsonToken) -> Result<Vec<u8>, BsonError> {
    match token {
        JsonToken::String(text) => STANDARD
            .decode(text)
            .map_err(|e| BsonError::format(format!("Invalid base64 string '{text}': {e}."))),
        other => Err(expected_but_found("a base64 string", other)),
    }
}

/// A subtype written as a hex string (`"00"`, `"80"`) or as an integer.
fn sub_type_from_token(token: &JsonToken) -> Result<BsonBinarySubType, BsonError> {
    let code = match token {
        JsonToken::String(text) if (1..=2).contains(&text.len()) => u8::from_str_radix(text, 16).ok(),
        JsonToken::Int32 { value, .. } => u8::try_from(*value).ok(),
        _ => None,
    };
    code.map(BsonBinarySubType::from_u8)
        .ok_or_else(|| expected_but_found("a binary subtype", token))
}

fn int32_from_token(token: &JsonToken) -> Result<i32, BsonError> {
    match token {
        JsonToken::Int32 { value, .. } => Ok(*value),
        JsonToken::String(text) => text
            .parse()
            .map_err(|_| BsonError::format(format!("Invalid Int32 string: '{text}'."))),
        other => Err(expected_but_found("an Int32 value", other)),
    }
}

fn int64_from_token(token: &JsonToken) -> Result<i64, BsonError> {
    match token {
        JsonToken::Int32 { .. } | JsonToken::Int64 { .. } => Ok(token.integer().unwrap_or_default()),
        JsonToken::String(text) => text
            .parse()
            .map_err(|_| BsonError::format(format!("Invalid Int64 string: '{text}'."))),
        other => Err(expected_but_found("an Int64 value", other)),
    }
}

fn decimal128_from_token(token: &JsonToken) -> Result<Decimal128, BsonError> {
    match token {
        JsonToken::Int32 { value, .. } => Ok(Decimal128::from(*value)),
        JsonToken::Int64 { value, .. } => Ok(Decimal128::from(*value)),
        JsonToken::String(text) => text.parse(),
        other => Err(expected_but_found("a Decimal128 value", other)),
    }
}

fn parse_double_text(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok().filter(|v: &f64| v.is_finite()),
    }
}

/// Packs the two halves of a timestamp. Each half is 32 bits; negative
/// inputs are taken as their two's complement bit pattern.
fn timestamp_value(t: &JsonToken, i: &JsonToken) -> Result<i64, BsonError> {
    let half = |token: &JsonToken| {
        token
            .integer()
            .filter(|v| (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(v))
            .map(|v| v as u32)
            .ok_or_else(|| expected_but_found("a 32-bit integer", token))
    };
    let (timestamp, increment) = (half(t)?, half(i)?);
    Ok((((timestamp as u64) << 32) | increment as u64) as i64)
}

/// Hex digits to bytes; an odd count gets a leading zero.
fn parse_hex(text: &str) -> Result<Vec<u8>, BsonError> {
    let padded = if text.len() % 2 == 1 {
        format!("0{text}")
    } else {
        text.to_string()
    };
    padded
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(BsonError::format(format!("Invalid hex string: '{text}'."))),
        })
        .collect()
}
