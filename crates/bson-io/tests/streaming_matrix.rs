use std::io::Cursor;
use std::sync::Arc;

use bsonio::io::{
    copy, BsonBinaryReader, BsonBinaryReaderSettings, BsonBinaryWriter, BsonBinaryWriterSettings,
    BsonReader, BsonStream, BsonStreamAdapter, BsonWriter, ByteBufferStream, JsonReader,
    JsonWriter, JsonWriterSettings,
};
use bsonio::BsonValue;
use bsonio_buffers::{BsonChunkPool, ByteArrayBuffer, ByteBuffer, MultiChunkBuffer};

type Fields = Vec<(String, BsonValue)>;

fn documents(n: usize) -> Vec<Fields> {
    (0..n)
        .map(|i| {
            vec![
                ("i".to_string(), BsonValue::Int32(i as i32)),
                ("s".to_string(), BsonValue::String("x".repeat(i * 7))),
                (
                    "a".to_string(),
                    BsonValue::Array((0..i).map(|j| BsonValue::Int64(j as i64)).collect()),
                ),
            ]
        })
        .collect()
}

fn concatenated(docs: &[Fields]) -> Vec<u8> {
    docs.iter()
        .flat_map(|fields| copy::to_bson_bytes(fields).unwrap())
        .collect()
}

fn read_all<R: BsonReader>(reader: &mut R) -> Vec<Fields> {
    let mut out = Vec::new();
    while !reader.is_at_end_of_file().unwrap() {
        let index = out.len();
        out.push(copy::read_document(reader).unwrap_or_else(|e| panic!("document {index}: {e}")));
    }
    out
}

#[test]
fn back_to_back_binary_over_byte_buffer() {
    for n in 0..=3 {
        let docs = documents(n);
        let bytes = concatenated(&docs);
        let stream = ByteBufferStream::new(ByteArrayBuffer::new(bytes.clone())).unwrap();
        let mut reader = BsonBinaryReader::new(stream, BsonBinaryReaderSettings::default());
        assert_eq!(read_all(&mut reader), docs, "n={n}");
        assert_eq!(reader.stream().position(), bytes.len() as u64, "n={n}");
    }
}

#[test]
fn back_to_back_binary_over_std_stream() {
    for n in 0..=3 {
        let docs = documents(n);
        let bytes = concatenated(&docs);
        let stream = BsonStreamAdapter::new(Cursor::new(bytes.clone())).unwrap();
        let mut reader = BsonBinaryReader::new(stream, BsonBinaryReaderSettings::default());
        assert_eq!(read_all(&mut reader), docs, "n={n}");
        assert_eq!(reader.stream().position(), bytes.len() as u64, "n={n}");
    }
}

#[test]
fn writer_over_pooled_chunks_reads_back() {
    let pool = Arc::new(BsonChunkPool::new(8, 16).unwrap());
    for n in 0..=3 {
        let docs = documents(n);
        let buffer = MultiChunkBuffer::new(pool.clone());
        let stream = ByteBufferStream::new(buffer).unwrap();
        let mut writer = BsonBinaryWriter::new(stream, BsonBinaryWriterSettings::default());
        for fields in &docs {
            copy::write_document(&mut writer, fields).unwrap();
        }
        let mut buffer = writer.into_stream().into_buffer().unwrap();
        assert_eq!(buffer.to_vec().unwrap(), concatenated(&docs), "n={n}");

        buffer.make_read_only().unwrap();
        let stream = ByteBufferStream::new(buffer).unwrap();
        let mut reader = BsonBinaryReader::new(stream, BsonBinaryReaderSettings::default());
        assert_eq!(read_all(&mut reader), docs, "n={n}");
    }
}

#[test]
fn back_to_back_json() {
    for n in 0..=3 {
        let docs = documents(n);
        let mut writer = JsonWriter::new(Vec::new(), JsonWriterSettings::default());
        for fields in &docs {
            copy::write_document(&mut writer, fields).unwrap();
        }
        let json = String::from_utf8(writer.into_inner()).unwrap();
        let mut reader = JsonReader::new(json.as_str());
        assert_eq!(read_all(&mut reader), docs, "n={n} json={json}");
    }
}

#[test]
fn back_to_back_json_values_of_any_kind() {
    for (json, expected) in [
        (
            "[1,2][1,2]",
            vec![
                BsonValue::Array(vec![BsonValue::Int32(1), BsonValue::Int32(2)]),
                BsonValue::Array(vec![BsonValue::Int32(1), BsonValue::Int32(2)]),
            ],
        ),
        (
            "{x:1}{x:1}",
            vec![
                BsonValue::Document(vec![("x".into(), BsonValue::Int32(1))]),
                BsonValue::Document(vec![("x".into(), BsonValue::Int32(1))]),
            ],
        ),
        ("1 2 \"three\"", vec![BsonValue::Int32(1), BsonValue::Int32(2), BsonValue::String("three".into())]),
        ("   ", vec![]),
    ] {
        let mut reader = JsonReader::new(json);
        let mut values = Vec::new();
        while !reader.is_at_end_of_file().unwrap() {
            values.push(copy::read_value(&mut reader).unwrap_or_else(|e| panic!("{json}: {e}")));
        }
        assert_eq!(values, expected, "{json}");
    }
}

#[test]
fn writer_reports_done_between_documents() {
    let stream = BsonStreamAdapter::new(Cursor::new(Vec::new())).unwrap();
    let mut writer = BsonBinaryWriter::new(stream, BsonBinaryWriterSettings::default());
    for fields in documents(2) {
        copy::write_document(&mut writer, &fields).unwrap();
        assert_eq!(writer.state(), bsonio::io::BsonWriterState::Done);
    }
    writer.close().unwrap();
}
