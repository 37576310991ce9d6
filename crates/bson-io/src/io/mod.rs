//! Streams, readers and writers for the binary format and extended JSON.

mod binary_reader;
mod binary_writer;
mod byte_buffer_stream;
mod context;
mod iso_date;
mod json_reader;
mod json_scanner;
mod json_writer;
mod reader;
mod settings;
mod stream;
mod writer;

pub mod copy;

pub use binary_reader::{BsonBinaryReader, BsonBinaryReaderBookmark};
pub use binary_writer::BsonBinaryWriter;
pub use byte_buffer_stream::ByteBufferStream;
pub use context::ContextType;
pub use json_reader::{JsonReader, JsonReaderBookmark};
pub use json_writer::JsonWriter;
pub use reader::{BsonReader, BsonReaderState};
pub use settings::{
    BsonBinaryReaderSettings, BsonBinaryWriterSettings, JsonOutputMode, JsonReaderSettings,
    JsonWriterSettings, DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_SERIALIZATION_DEPTH,
};
pub use stream::{BsonStream, BsonStreamAdapter};
pub use writer::{BsonWriter, BsonWriterState};
