use bsonio::io::{copy, BsonReader, BsonReaderState, JsonReader};
use bsonio::{BsonType, BsonValue};

/// Every recognized form, each a complete value none of whose proper
/// prefixes is itself a complete value.
const FORMS: &[&str] = &[
    r#"{ "$binary" : "AQID", "$type" : "00" }"#,
    r#"{ "$binary" : { "base64" : "AQID", "subType" : "80" } }"#,
    r#"{ "$binary" : { "subType" : "80", "base64" : "AQID" } }"#,
    r#"{ "$code" : "f()" }"#,
    r#"{ "$code" : "f()", "$scope" : { "x" : 1 } }"#,
    r#"{ "$date" : 0 }"#,
    r#"{ "$date" : { "$numberLong" : "0" } }"#,
    r#"{ "$date" : "1970-01-01T00:00:00Z" }"#,
    r#"{ "$maxKey" : 1 }"#,
    r#"{ "$maxkey" : 1 }"#,
    r#"{ "$minKey" : 1 }"#,
    r#"{ "$minkey" : 1 }"#,
    r#"{ "$numberDecimal" : "1.5" }"#,
    r#"{ "$numberDouble" : "1.5" }"#,
    r#"{ "$numberInt" : "1" }"#,
    r#"{ "$numberLong" : "1" }"#,
    r#"{ "$oid" : "0102030405060708090a0b0c" }"#,
    r#"{ "$regex" : "a", "$options" : "i" }"#,
    r#"{ "$regularExpression" : { "pattern" : "a", "options" : "i" } }"#,
    r#"{ "$regularExpression" : { "options" : "i", "pattern" : "a" } }"#,
    r#"{ "$symbol" : "s" }"#,
    r#"{ "$timestamp" : { "t" : 1, "i" : 2 } }"#,
    r#"{ "$timestamp" : { "i" : 2, "t" : 1 } }"#,
    r#"{ "$timestamp" : NumberLong(5) }"#,
    r#"{ "$undefined" : true }"#,
    r#"BinData(0, "AQID")"#,
    r#"HexData(0, "0102")"#,
    r#"UUID("01020304-0506-0708-090a-0b0c0d0e0f10")"#,
    r#"GUID("01020304-0506-0708-090a-0b0c0d0e0f10")"#,
    r#"CSUUID("01020304-0506-0708-090a-0b0c0d0e0f10")"#,
    r#"JUUID("01020304-0506-0708-090a-0b0c0d0e0f10")"#,
    r#"PYUUID("01020304-0506-0708-090a-0b0c0d0e0f10")"#,
    r#"ISODate("1970-01-01T00:00:00Z")"#,
    r#"new Date(0)"#,
    r#"new Date("1970-01-01")"#,
    r#"Date()"#,
    r#"NumberDecimal("1.5")"#,
    r#"NumberInt(1)"#,
    r#"Number("1")"#,
    r#"NumberLong("1")"#,
    r#"new NumberLong(1)"#,
    r#"ObjectId("0102030405060708090a0b0c")"#,
    r#"RegExp("a", "i")"#,
    r#"Timestamp(1, 2)"#,
    r#"{ "a" : [1, { "b" : null }], 'c' : true }"#,
    r#"[1, "two", [3]]"#,
    r#""a string""#,
];

fn read(json: &str) -> Result<BsonValue, bsonio::BsonError> {
    copy::read_value(&mut JsonReader::new(json))
}

#[test]
fn every_form_reads() {
    for json in FORMS {
        let mut reader = JsonReader::new(*json);
        copy::read_value(&mut reader).unwrap_or_else(|e| panic!("{json}: {e}"));
        assert!(reader.is_at_end_of_file().unwrap(), "{json}");
    }
}

#[test]
fn every_proper_prefix_is_a_format_error() {
    for json in FORMS {
        for end in 0..json.len() {
            let prefix = &json[..end];
            match read(prefix) {
                Err(e) => assert!(e.is_format(), "{prefix:?}: {e:?}"),
                Ok(value) => panic!("{prefix:?} read as {value:?}"),
            }
        }
    }
}

#[test]
fn invalid_tokens_are_format_errors() {
    let cases = [
        r#"{ "$binary" : 1, "$type" : "00" }"#,
        r#"{ "$binary" : "AQID", "$kind" : "00" }"#,
        r#"{ "$binary" : "AQID", "$type" : "xyz" }"#,
        r#"{ "$binary" : "!!", "$type" : "00" }"#,
        r#"{ "$binary" : { "base64" : "AQID", "base64" : "AQID" } }"#,
        r#"{ "$code" : 1 }"#,
        r#"{ "$code" : "f", "$context" : { } }"#,
        r#"{ "$date" : true }"#,
        r#"{ "$date" : "yesterday" }"#,
        r#"{ "$date" : { "$numberInt" : "0" } }"#,
        r#"{ "$maxKey" : 0 }"#,
        r#"{ "$numberDecimal" : "one" }"#,
        r#"{ "$numberDouble" : "1.5x" }"#,
        r#"{ "$numberInt" : "2147483648" }"#,
        r#"{ "$numberLong" : "9223372036854775808" }"#,
        r#"{ "$numberLong" : 1.5 }"#,
        r#"{ "$oid" : "0102" }"#,
        r#"{ "$regex" : "a", "$flags" : "i" }"#,
        r#"{ "$regularExpression" : { "pattern" : "a" } }"#,
        r#"{ "$symbol" : null }"#,
        r#"{ "$timestamp" : { "t" : 4294967296, "i" : 0 } }"#,
        r#"{ "$timestamp" : { "t" : 1, "x" : 2 } }"#,
        r#"{ "$undefined" : false }"#,
        r#"BinData(256, "AQID")"#,
        r#"BinData(0 "AQID")"#,
        r#"HexData(0, "0g")"#,
        r#"UUID("0102")"#,
        r#"ISODate("1970-13-01")"#,
        r#"new Date(true)"#,
        r#"new Nothing(1)"#,
        r#"Date(1)"#,
        r#"NumberInt(1.5)"#,
        r#"NumberLong([1])"#,
        r#"ObjectId(1)"#,
        r#"RegExp(1)"#,
        r#"Timestamp(1; 2)"#,
        r#"{ "a" 1 }"#,
        r#"{ "a" : 1 ]"#,
        r#"[1 }"#,
        r#"{ 1 : 1 }"#,
        r#"}"#,
        r#":"#,
    ];
    for json in cases {
        match read(json) {
            Err(e) => assert!(e.is_format(), "{json}: {e:?}"),
            Ok(value) => panic!("{json} read as {value:?}"),
        }
    }
}

#[test]
fn end_of_document_is_reported_once() {
    let mut reader = JsonReader::new("{ \"a\" : [] }");
    reader.read_start_document().unwrap();
    assert_eq!(reader.read_bson_type().unwrap(), BsonType::Array);
    reader.read_name().unwrap();
    reader.read_start_array().unwrap();
    assert_eq!(reader.read_bson_type().unwrap(), BsonType::EndOfDocument);
    assert_eq!(reader.state(), BsonReaderState::EndOfArray);
    assert!(reader.read_bson_type().is_err());
    reader.read_end_array().unwrap();
    assert_eq!(reader.read_bson_type().unwrap(), BsonType::EndOfDocument);
    reader.read_end_document().unwrap();
    assert!(reader.read_end_document().is_err());
}

#[test]
fn skip_value_passes_over_nested_values() {
    let json = r#"{ "skip" : { "a" : [1, { "$code" : "f", "$scope" : { } }] }, "keep" : 2 }"#;
    let mut reader = JsonReader::new(json);
    reader.read_start_document().unwrap();
    assert!(reader.find_element("keep").unwrap());
    assert_eq!(reader.read_int32().unwrap(), 2);
    reader.read_end_document().unwrap();
    assert!(reader.is_at_end_of_file().unwrap());
}

#[test]
fn closed_reader_rejects_everything() {
    let mut reader = JsonReader::new("{ }");
    reader.close();
    reader.close();
    assert!(reader.read_start_document().is_err());
    assert!(reader.is_at_end_of_file().is_err());
}
