//! Writer producing extended JSON text.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;

use super::context::{ContextStack, ContextType, Frame};
use super::iso_date::format_iso_date;
use super::settings::{JsonOutputMode, JsonWriterSettings};
use super::writer::{check_not_closed, depth_exceeded, invalid_state, BsonWriter, BsonWriterState};
use crate::decimal128::Decimal128;
use crate::guid::GuidRepresentation;
use crate::object_id::ObjectId;
use crate::values::{BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonTimestamp};
use crate::BsonError;

const SCALAR_STATES: &[BsonWriterState] = &[BsonWriterState::Value, BsonWriterState::Initial];
const CONTAINER_STATES: &[BsonWriterState] =
    &[BsonWriterState::Value, BsonWriterState::Initial, BsonWriterState::Done];

#[derive(Debug, Clone)]
struct JsonWriterFrame {
    context_type: ContextType,
    /// Prefix for elements of this frame when indenting.
    indentation: String,
    has_elements: bool,
}

impl Frame for JsonWriterFrame {
    fn context_type(&self) -> ContextType {
        self.context_type
    }
}

/// Writes values as extended JSON to any [`std::io::Write`].
///
/// Several top-level values may be written one after another; they are
/// emitted back to back with no separator.
pub struct JsonWriter<W: Write> {
    writer: W,
    settings: JsonWriterSettings,
    state: BsonWriterState,
    name: Option<String>,
    context: ContextStack<JsonWriterFrame>,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(writer: W, settings: JsonWriterSettings) -> Self {
        Self {
            writer,
            settings,
            state: BsonWriterState::Initial,
            name: None,
            context: ContextStack::new(JsonWriterFrame {
                context_type: ContextType::TopLevel,
                indentation: String::new(),
                has_elements: false,
            }),
        }
    }

    pub fn settings(&self) -> &JsonWriterSettings {
        &self.settings
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn strict(&self) -> bool {
        self.settings.output_mode == JsonOutputMode::Strict
    }

    fn next_state(&self) -> BsonWriterState {
        match self.context.context_type() {
            ContextType::TopLevel => BsonWriterState::Done,
            ContextType::Array => BsonWriterState::Value,
            _ => BsonWriterState::Name,
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), BsonError> {
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Writes the separator and, inside a document, the pending name.
    fn write_name_helper(&mut self) -> Result<(), BsonError> {
        let name = self.name.take().unwrap_or_default();
        let mut prefix = String::new();
        let frame = self.context.current();
        match frame.context_type {
            ContextType::Array => {
                if frame.has_elements {
                    prefix.push_str(", ");
                }
            }
            ContextType::Document | ContextType::ScopeDocument | ContextType::JavaScriptWithScope => {
                if frame.has_elements {
                    prefix.push(',');
                }
                if self.settings.indent {
                    prefix.push_str(&self.settings.new_line_chars);
                    prefix.push_str(&frame.indentation);
                } else {
                    prefix.push(' ');
                }
                push_quoted(&mut prefix, &name);
                prefix.push_str(" : ");
            }
            ContextType::TopLevel => {}
        }
        self.context.current_mut().has_elements = true;
        self.write_text(&prefix)
    }

    /// Moves to a value slot, writing its separator and name. Only
    /// documents and arrays may follow a finished top-level value.
    fn begin_value(&mut self, method: &str, allowed: &[BsonWriterState]) -> Result<(), BsonError> {
        check_not_closed(self.state, method)?;
        if !allowed.contains(&self.state) {
            return Err(invalid_state(method, self.state, allowed));
        }
        self.write_name_helper()
    }

    fn write_scalar(&mut self, method: &str, text: &str) -> Result<(), BsonError> {
        self.begin_value(method, SCALAR_STATES)?;
        self.write_text(text)?;
        self.state = self.next_state();
        Ok(())
    }

    fn check_depth(&self) -> Result<(), BsonError> {
        if self.context.depth() + 1 > self.settings.max_serialization_depth {
            return Err(depth_exceeded());
        }
        Ok(())
    }

    fn push_frame(&mut self, context_type: ContextType) {
        let mut indentation = self.context.current().indentation.clone();
        if self.settings.indent {
            indentation.push_str(&self.settings.indent_chars);
        }
        self.context.push(JsonWriterFrame {
            context_type,
            indentation,
            has_elements: false,
        });
    }

    /// Pops an object frame and writes its closing brace.
    fn close_object(&mut self) -> Result<(), BsonError> {
        let frame = self.context.pop()?;
        let mut text = String::new();
        if self.settings.indent && frame.has_elements {
            text.push_str(&self.settings.new_line_chars);
            text.push_str(&self.context.current().indentation);
        } else {
            text.push(' ');
        }
        text.push('}');
        self.write_text(&text)
    }

    /// Renders a binary value in shell syntax, using the UUID helpers for
    /// 16-byte UUID subtypes whose byte order is known.
    fn shell_binary(&self, data: &BsonBinaryData) -> String {
        let constructor = match data.sub_type {
            BsonBinarySubType::UuidStandard => Some(("UUID", GuidRepresentation::Standard)),
            BsonBinarySubType::UuidLegacy => match self.settings.guid_representation {
                GuidRepresentation::CSharpLegacy => Some(("CSUUID", GuidRepresentation::CSharpLegacy)),
                GuidRepresentation::JavaLegacy => Some(("JUUID", GuidRepresentation::JavaLegacy)),
                GuidRepresentation::PythonLegacy => Some(("PYUUID", GuidRepresentation::PythonLegacy)),
                _ => None,
            },
            _ => None,
        };
        if let Some((name, representation)) = constructor {
            if let Ok(guid) = data.to_guid(representation) {
                return format!("{name}(\"{guid}\")");
            }
        }
        format!(
            "new BinData({}, \"{}\")",
            data.sub_type.code(),
            STANDARD.encode(&data.bytes)
        )
    }
}

impl<W: Write> BsonWriter for JsonWriter<W> {
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
        self.name = Some(name.to_string());
        self.state = BsonWriterState::Value;
        Ok(())
    }

    fn write_start_document(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_start_document")?;
        self.check_depth()?;
        let context_type = match self.state {
            BsonWriterState::Initial | BsonWriterState::Done | BsonWriterState::Value => {
                self.write_name_helper()?;
                ContextType::Document
            }
            // The "$scope" name was written along with the code
            BsonWriterState::ScopeDocument => ContextType::ScopeDocument,
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
        self.write_text("{")?;
        self.push_frame(context_type);
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
        self.close_object()?;
        if context_type == ContextType::ScopeDocument {
            // Closes the enclosing { "$code" : ..., "$scope" : ... }
            self.close_object()?;
        }
        self.state = self.next_state();
        if self.state == BsonWriterState::Done {
            debug!("wrote top-level JSON document");
        }
        Ok(())
    }

    fn write_start_array(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "write_start_array")?;
        self.check_depth()?;
        self.begin_value("write_start_array", CONTAINER_STATES)?;
        self.write_text("[")?;
        self.push_frame(ContextType::Array);
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
        self.context.pop()?;
        self.write_text("]")?;
        self.state = self.next_state();
        Ok(())
    }

    fn write_binary_data(&mut self, data: &BsonBinaryData) -> Result<(), BsonError> {
        let text = if self.strict() {
            format!(
                "{{ \"$binary\" : \"{}\", \"$type\" : \"{:02x}\" }}",
                STANDARD.encode(&data.bytes),
                data.sub_type.code()
            )
        } else {
            self.shell_binary(data)
        };
        self.write_scalar("write_binary_data", &text)
    }

    fn write_boolean(&mut self, value: bool) -> Result<(), BsonError> {
        self.write_scalar("write_boolean", if value { "true" } else { "false" })
    }

    fn write_date_time(&mut self, millis: i64) -> Result<(), BsonError> {
        let text = if self.strict() {
            format!("{{ \"$date\" : {millis} }}")
        } else {
            match format_iso_date(millis) {
                Some(iso) => format!("ISODate(\"{iso}\")"),
                None => format!("new Date({millis})"),
            }
        };
        self.write_scalar("write_date_time", &text)
    }

    fn write_decimal128(&mut self, value: Decimal128) -> Result<(), BsonError> {
        let text = if self.strict() {
            format!("{{ \"$numberDecimal\" : \"{value}\" }}")
        } else {
            format!("NumberDecimal(\"{value}\")")
        };
        self.write_scalar("write_decimal128", &text)
    }

    fn write_double(&mut self, value: f64) -> Result<(), BsonError> {
        self.write_scalar("write_double", &format_double(value))
    }

    fn write_int32(&mut self, value: i32) -> Result<(), BsonError> {
        self.write_scalar("write_int32", &value.to_string())
    }

    fn write_int64(&mut self, value: i64) -> Result<(), BsonError> {
        let text = if self.strict() {
            format!("{{ \"$numberLong\" : \"{value}\" }}")
        } else if i32::try_from(value).is_ok() {
            format!("NumberLong({value})")
        } else {
            format!("NumberLong(\"{value}\")")
        };
        self.write_scalar("write_int64", &text)
    }

    fn write_java_script(&mut self, code: &str) -> Result<(), BsonError> {
        let mut text = String::from("{ \"$code\" : ");
        push_quoted(&mut text, code);
        text.push_str(" }");
        self.write_scalar("write_java_script", &text)
    }

    fn write_java_script_with_scope(&mut self, code: &str) -> Result<(), BsonError> {
        self.check_depth()?;
        self.begin_value("write_java_script_with_scope", SCALAR_STATES)?;
        self.write_text("{")?;
        self.push_frame(ContextType::JavaScriptWithScope);
        self.name = Some("$code".to_string());
        self.write_name_helper()?;
        let mut quoted = String::new();
        push_quoted(&mut quoted, code);
        self.write_text(&quoted)?;
        self.name = Some("$scope".to_string());
        self.write_name_helper()?;
        self.state = BsonWriterState::ScopeDocument;
        Ok(())
    }

    fn write_max_key(&mut self) -> Result<(), BsonError> {
        let text = if self.strict() { "{ \"$maxKey\" : 1 }" } else { "MaxKey" };
        self.write_scalar("write_max_key", text)
    }

    fn write_min_key(&mut self) -> Result<(), BsonError> {
        let text = if self.strict() { "{ \"$minKey\" : 1 }" } else { "MinKey" };
        self.write_scalar("write_min_key", text)
    }

    fn write_null(&mut self) -> Result<(), BsonError> {
        self.write_scalar("write_null", "null")
    }

    fn write_object_id(&mut self, value: ObjectId) -> Result<(), BsonError> {
        let text = if self.strict() {
            format!("{{ \"$oid\" : \"{value}\" }}")
        } else {
            format!("ObjectId(\"{value}\")")
        };
        self.write_scalar("write_object_id", &text)
    }

    fn write_regular_expression(&mut self, regex: &BsonRegularExpression) -> Result<(), BsonError> {
        let text = if self.strict() {
            let mut text = String::from("{ \"$regex\" : ");
            push_quoted(&mut text, &regex.pattern);
            text.push_str(", \"$options\" : ");
            push_quoted(&mut text, regex.options());
            text.push_str(" }");
            text
        } else {
            let pattern = if regex.pattern.is_empty() {
                "(?:)".to_string()
            } else {
                regex.pattern.replace('/', "\\/")
            };
            format!("/{pattern}/{}", regex.options())
        };
        self.write_scalar("write_regular_expression", &text)
    }

    fn write_string(&mut self, value: &str) -> Result<(), BsonError> {
        let mut text = String::with_capacity(value.len() + 2);
        push_quoted(&mut text, value);
        self.write_scalar("write_string", &text)
    }

    fn write_symbol(&mut self, value: &str) -> Result<(), BsonError> {
        let mut text = String::from("{ \"$symbol\" : ");
        push_quoted(&mut text, value);
        text.push_str(" }");
        self.write_scalar("write_symbol", &text)
    }

    fn write_timestamp(&mut self, value: i64) -> Result<(), BsonError> {
        let BsonTimestamp { timestamp, increment } = BsonTimestamp::from_value(value);
        let text = if self.strict() {
            format!("{{ \"$timestamp\" : {{ \"t\" : {timestamp}, \"i\" : {increment} }} }}")
        } else {
            format!("Timestamp({timestamp}, {increment})")
        };
        self.write_scalar("write_timestamp", &text)
    }

    fn write_undefined(&mut self) -> Result<(), BsonError> {
        let text = if self.strict() { "{ \"$undefined\" : true }" } else { "undefined" };
        self.write_scalar("write_undefined", text)
    }

    fn flush(&mut self) -> Result<(), BsonError> {
        check_not_closed(self.state, "flush")?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BsonError> {
        if self.state == BsonWriterState::Closed {
            return Ok(());
        }
        self.writer.flush()?;
        self.context = ContextStack::new(JsonWriterFrame {
            context_type: ContextType::TopLevel,
            indentation: String::new(),
            has_elements: false,
        });
        self.state = BsonWriterState::Closed;
        Ok(())
    }
}

/// Shortest text that reads back as the same double, always with a
/// fraction or exponent so it is not mistaken for an integer.
fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let mut text = format!("{value:?}");
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    text
}

fn push_quoted(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;
    use crate::io::copy;
    use crate::values::BsonValue;

    fn json(value: &BsonValue, settings: JsonWriterSettings) -> String {
        let mut writer = JsonWriter::new(Vec::new(), settings);
        copy::write_value(&mut writer, value).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    fn shell(value: BsonValue) -> String {
        json(&value, JsonWriterSettings::default())
    }

    fn strict(value: BsonValue) -> String {
        json(&value, JsonWriterSettings::strict())
    }

    fn doc(fields: &[(&str, BsonValue)]) -> BsonValue {
        BsonValue::Document(
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn layouts() {
        assert_eq!(
            shell(doc(&[("a", BsonValue::Int32(1)), ("b", BsonValue::Int32(2))])),
            "{ \"a\" : 1, \"b\" : 2 }"
        );
        assert_eq!(shell(doc(&[])), "{ }");
        assert_eq!(shell(BsonValue::Array(vec![])), "[]");
        assert_eq!(
            shell(BsonValue::Array(vec![BsonValue::Int32(1), BsonValue::Int32(2), BsonValue::Int32(3)])),
            "[1, 2, 3]"
        );
        assert_eq!(
            shell(doc(&[("a", doc(&[("b", BsonValue::Null)]))])),
            "{ \"a\" : { \"b\" : null } }"
        );
    }

    #[test]
    fn indentation() {
        let settings = JsonWriterSettings::default().with_indent(true);
        assert_eq!(
            json(&doc(&[("name", BsonValue::String("value".into()))]), settings.clone()),
            "{\r\n  \"name\" : \"value\"\r\n}"
        );
        assert_eq!(
            json(
                &doc(&[("doc", doc(&[("a", BsonValue::Int32(1)), ("b", BsonValue::Int32(2))]))]),
                settings.clone()
            ),
            "{\r\n  \"doc\" : {\r\n    \"a\" : 1,\r\n    \"b\" : 2\r\n  }\r\n}"
        );
        assert_eq!(json(&doc(&[]), settings.clone()), "{ }");
        assert_eq!(
            json(&doc(&[("a", BsonValue::Array(vec![BsonValue::Int32(1), BsonValue::Int32(2)]))]), settings),
            "{\r\n  \"a\" : [1, 2]\r\n}"
        );
    }

    #[test]
    fn shell_forms() {
        let id: ObjectId = "0102030405060708090a0b0c".parse().unwrap();
        let cases = [
            (BsonValue::Int64(5), "NumberLong(5)"),
            (BsonValue::Int64(i64::from(i32::MAX) + 1), "NumberLong(\"2147483648\")"),
            (BsonValue::DateTime(0), "ISODate(\"1970-01-01T00:00:00Z\")"),
            (BsonValue::DateTime(i64::MAX), "new Date(9223372036854775807)"),
            (BsonValue::ObjectId(id), "ObjectId(\"0102030405060708090a0b0c\")"),
            (BsonValue::Decimal128(Decimal128::from(1)), "NumberDecimal(\"1\")"),
            (BsonValue::Timestamp(0x1_0000_0002), "Timestamp(1, 2)"),
            (BsonValue::MaxKey, "MaxKey"),
            (BsonValue::MinKey, "MinKey"),
            (BsonValue::Undefined, "undefined"),
            (BsonValue::Symbol("s".into()), "{ \"$symbol\" : \"s\" }"),
            (BsonValue::JavaScript("f()".into()), "{ \"$code\" : \"f()\" }"),
            (
                BsonValue::RegularExpression(BsonRegularExpression::new("a/b", "mi")),
                "/a\\/b/im",
            ),
            (
                BsonValue::RegularExpression(BsonRegularExpression::new("", "")),
                "/(?:)/",
            ),
            (
                BsonValue::Binary(BsonBinaryData::generic(vec![1, 2, 3])),
                "new BinData(0, \"AQID\")",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(shell(value), expected);
        }
    }

    #[test]
    fn strict_forms() {
        let id: ObjectId = "0102030405060708090a0b0c".parse().unwrap();
        let cases = [
            (BsonValue::Int64(5), "{ \"$numberLong\" : \"5\" }"),
            (BsonValue::DateTime(-1), "{ \"$date\" : -1 }"),
            (BsonValue::ObjectId(id), "{ \"$oid\" : \"0102030405060708090a0b0c\" }"),
            (
                BsonValue::Timestamp(0x1_0000_0002),
                "{ \"$timestamp\" : { \"t\" : 1, \"i\" : 2 } }",
            ),
            (BsonValue::MaxKey, "{ \"$maxKey\" : 1 }"),
            (BsonValue::Undefined, "{ \"$undefined\" : true }"),
            (
                BsonValue::RegularExpression(BsonRegularExpression::new("a/b", "i")),
                "{ \"$regex\" : \"a/b\", \"$options\" : \"i\" }",
            ),
            (
                BsonValue::Binary(BsonBinaryData::new(BsonBinarySubType::UserDefined(0x80), vec![1])),
                "{ \"$binary\" : \"AQ==\", \"$type\" : \"80\" }",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(strict(value), expected);
        }
    }

    #[test]
    fn guids_use_the_constructor_for_their_representation() {
        let guid: Guid = "01020304-0506-0708-090a-0b0c0d0e0f10".parse().unwrap();
        let standard = BsonBinaryData::from_guid(guid, GuidRepresentation::Standard).unwrap();
        assert_eq!(
            shell(BsonValue::Binary(standard)),
            "UUID(\"01020304-0506-0708-090a-0b0c0d0e0f10\")"
        );
        for (representation, name) in [
            (GuidRepresentation::CSharpLegacy, "CSUUID"),
            (GuidRepresentation::JavaLegacy, "JUUID"),
            (GuidRepresentation::PythonLegacy, "PYUUID"),
        ] {
            let legacy = BsonBinaryData::from_guid(guid, representation).unwrap();
            let settings = JsonWriterSettings::default().with_guid_representation(representation);
            assert_eq!(
                json(&BsonValue::Binary(legacy), settings),
                format!("{name}(\"01020304-0506-0708-090a-0b0c0d0e0f10\")")
            );
        }
        let legacy = BsonBinaryData::from_guid(guid, GuidRepresentation::CSharpLegacy).unwrap();
        let settings = JsonWriterSettings::default().with_guid_representation(GuidRepresentation::Unspecified);
        assert!(json(&BsonValue::Binary(legacy), settings).starts_with("new BinData(3, "));
    }

    #[test]
    fn code_with_scope() {
        let value = BsonValue::JavaScriptWithScope {
            code: "f()".into(),
            scope: vec![("n".into(), BsonValue::Int32(1))],
        };
        assert_eq!(
            shell(doc(&[("f", value)])),
            "{ \"f\" : { \"$code\" : \"f()\", \"$scope\" : { \"n\" : 1 } } }"
        );
    }

    #[test]
    fn doubles() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(-0.0), "-0.0");
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(1.5e300), "1.5e300");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "Infinity");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn escapes() {
        let mut out = String::new();
        push_quoted(&mut out, "\"\\\u{8}\u{c}\n\r\t\u{1}\u{7f}\u{9f}é");
        assert_eq!(out, "\"\\\"\\\\\\b\\f\\n\\r\\t\\u0001\\u007f\\u009fé\"");
    }

    #[test]
    fn back_to_back_top_level_values() {
        let mut writer = JsonWriter::new(Vec::new(), JsonWriterSettings::default());
        copy::write_value(&mut writer, &doc(&[("x", BsonValue::Int32(1))])).unwrap();
        copy::write_value(&mut writer, &BsonValue::Array(vec![BsonValue::Int32(2)])).unwrap();
        copy::write_value(&mut writer, &doc(&[])).unwrap();
        assert_eq!(writer.state(), BsonWriterState::Done);
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "{ \"x\" : 1 }[2]{ }"
        );
    }

    #[test]
    fn scalar_after_finished_top_level_value_is_rejected() {
        let mut writer = JsonWriter::new(Vec::new(), JsonWriterSettings::default());
        writer.write_int32(1).unwrap();
        assert_eq!(writer.state(), BsonWriterState::Done);
        assert!(matches!(writer.write_int32(2), Err(BsonError::InvalidOperation(_))));
        assert!(matches!(writer.write_null(), Err(BsonError::InvalidOperation(_))));
        assert!(matches!(
            writer.write_java_script_with_scope("f"),
            Err(BsonError::InvalidOperation(_))
        ));
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "1");

        let mut writer = JsonWriter::new(Vec::new(), JsonWriterSettings::default());
        copy::write_value(&mut writer, &doc(&[])).unwrap();
        assert!(matches!(writer.write_boolean(true), Err(BsonError::InvalidOperation(_))));
        writer.write_start_array().unwrap();
        writer.write_end_array().unwrap();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "{ }[]");
    }

    #[test]
    fn protocol_violations() {
        let mut writer = JsonWriter::new(Vec::new(), JsonWriterSettings::default());
        assert!(matches!(writer.write_name("x"), Err(BsonError::InvalidOperation(_))));
        writer.write_start_document().unwrap();
        assert!(matches!(writer.write_int32(1), Err(BsonError::InvalidOperation(_))));
        assert!(matches!(writer.write_end_array(), Err(BsonError::InvalidOperation(_))));
        writer.write_end_document().unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.write_null(), Err(BsonError::InvalidOperation(_))));
    }

    #[test]
    fn depth_is_limited() {
        let settings = JsonWriterSettings::default().with_max_serialization_depth(2);
        let mut writer = JsonWriter::new(Vec::new(), settings);
        writer.write_start_document().unwrap();
        writer.write_name("a").unwrap();
        writer.write_start_array().unwrap();
        assert!(matches!(writer.write_start_document(), Err(BsonError::InvalidOperation(_))));
    }
}
