use bsonio::io::{
    copy, BsonBinaryReader, BsonBinaryReaderSettings, BsonBinaryWriter, BsonBinaryWriterSettings,
    BsonReader, BsonStreamAdapter, BsonWriter, ByteBufferStream, JsonReader, JsonReaderSettings,
    JsonWriter, JsonWriterSettings,
};
use bsonio::{BsonBinaryData, BsonBinarySubType, BsonValue, Guid, GuidConverter, GuidRepresentation};
use bsonio_buffers::ByteArrayBuffer;
use proptest::prelude::*;
use std::io::Cursor;

const SPECIFIED: [GuidRepresentation; 4] = [
    GuidRepresentation::Standard,
    GuidRepresentation::CSharpLegacy,
    GuidRepresentation::JavaLegacy,
    GuidRepresentation::PythonLegacy,
];

const ALL: [GuidRepresentation; 5] = [
    GuidRepresentation::Unspecified,
    GuidRepresentation::Standard,
    GuidRepresentation::CSharpLegacy,
    GuidRepresentation::JavaLegacy,
    GuidRepresentation::PythonLegacy,
];

fn legal(sub_type: BsonBinarySubType, representation: GuidRepresentation) -> bool {
    match sub_type {
        BsonBinarySubType::UuidStandard => matches!(
            representation,
            GuidRepresentation::Standard | GuidRepresentation::Unspecified
        ),
        BsonBinarySubType::UuidLegacy => matches!(
            representation,
            GuidRepresentation::CSharpLegacy
                | GuidRepresentation::JavaLegacy
                | GuidRepresentation::PythonLegacy
        ),
        _ => false,
    }
}

proptest! {
    #[test]
    fn bytes_round_trip_for_every_representation(raw in any::<[u8; 16]>()) {
        let guid = Guid::from_bytes(raw);
        for representation in SPECIFIED {
            let bytes = GuidConverter::to_bytes(guid, representation).unwrap();
            let sub_type = GuidConverter::sub_type_for(representation).unwrap();
            let back = GuidConverter::from_binary(&bytes, sub_type, representation).unwrap();
            prop_assert_eq!(back, guid, "{:?}", representation);
            prop_assert_eq!(GuidConverter::from_bytes(&bytes, representation).unwrap(), guid);
        }
    }

    #[test]
    fn illegal_pairs_always_fail(raw in any::<[u8; 16]>()) {
        for sub_type in [BsonBinarySubType::UuidStandard, BsonBinarySubType::UuidLegacy, BsonBinarySubType::Binary] {
            for representation in ALL {
                let result = GuidConverter::from_binary(&raw, sub_type, representation);
                if legal(sub_type, representation) {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(result.unwrap_err().is_format(), "{:?} {:?}", sub_type, representation);
                }
            }
        }
    }

    #[test]
    fn binary_codec_preserves_guids(raw in any::<[u8; 16]>()) {
        let guid = Guid::from_bytes(raw);
        for representation in SPECIFIED {
            let stream = BsonStreamAdapter::new(Cursor::new(Vec::new())).unwrap();
            let settings = BsonBinaryWriterSettings::default().with_guid_representation(representation);
            let mut writer = BsonBinaryWriter::new(stream, settings);
            writer.write_start_document().unwrap();
            writer.write_name("g").unwrap();
            writer.write_guid(guid).unwrap();
            writer.write_end_document().unwrap();
            let bytes = writer.into_stream().into_inner().into_inner();

            let stream = ByteBufferStream::new(ByteArrayBuffer::new(bytes)).unwrap();
            let settings = BsonBinaryReaderSettings::default().with_guid_representation(representation);
            let mut reader = BsonBinaryReader::new(stream, settings);
            reader.read_start_document().unwrap();
            reader.read_name_expecting("g").unwrap();
            prop_assert_eq!(reader.read_guid().unwrap(), guid);
            reader.read_end_document().unwrap();
        }
    }

    #[test]
    fn json_codec_preserves_guids(raw in any::<[u8; 16]>()) {
        let guid = Guid::from_bytes(raw);
        for representation in SPECIFIED {
            let settings = JsonWriterSettings::default().with_guid_representation(representation);
            let mut writer = JsonWriter::new(Vec::new(), settings);
            writer.write_guid(guid).unwrap();
            let json = String::from_utf8(writer.into_inner()).unwrap();

            let settings = JsonReaderSettings::default().with_guid_representation(representation);
            let mut reader = JsonReader::with_settings(json.as_str(), settings);
            prop_assert_eq!(reader.read_guid().unwrap(), guid, "{}", json);
        }
    }
}

#[test]
fn wrong_lengths_fail_under_every_representation() {
    for length in [0usize, 15, 17] {
        let bytes = vec![0u8; length];
        for representation in SPECIFIED {
            let sub_type = GuidConverter::sub_type_for(representation).unwrap();
            let err = GuidConverter::from_binary(&bytes, sub_type, representation).unwrap_err();
            assert!(err.is_format(), "{length} {representation:?}");
            assert!(err.to_string().contains(&length.to_string()), "{err}");
        }
    }
}

#[test]
fn unspecified_cannot_write() {
    let guid = Guid::from_bytes([7; 16]);
    assert!(GuidConverter::to_bytes(guid, GuidRepresentation::Unspecified).is_err());
    assert!(GuidConverter::sub_type_for(GuidRepresentation::Unspecified).is_err());

    let stream = BsonStreamAdapter::new(Cursor::new(Vec::new())).unwrap();
    let mut writer = BsonBinaryWriter::new(stream, BsonBinaryWriterSettings::default());
    writer.write_start_document().unwrap();
    writer.write_name("g").unwrap();
    assert!(writer.write_guid(guid).is_err());
}

#[test]
fn explicit_representation_overrides_settings() {
    let guid: Guid = "01020304-0506-0708-090a-0b0c0d0e0f10".parse().unwrap();
    let data = BsonBinaryData::from_guid(guid, GuidRepresentation::JavaLegacy).unwrap();
    assert_eq!(
        data.bytes,
        vec![8, 7, 6, 5, 4, 3, 2, 1, 0x10, 0x0f, 0x0e, 0x0d, 0x0c, 0x0b, 0x0a, 9]
    );
    let fields = vec![("g".to_string(), BsonValue::Binary(data))];
    let bytes = copy::to_bson_bytes(&fields).unwrap();
    let stream = ByteBufferStream::new(ByteArrayBuffer::new(bytes)).unwrap();
    let mut reader = BsonBinaryReader::new(stream, BsonBinaryReaderSettings::default());
    reader.read_start_document().unwrap();
    reader.read_name_expecting("g").unwrap();
    assert_eq!(reader.read_guid_with(GuidRepresentation::JavaLegacy).unwrap(), guid);
}
