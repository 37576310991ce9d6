//! BSON and MongoDB Extended JSON readers and writers.
//!
//! Both encodings implement the same element protocol: [`io::BsonReader`]
//! walks a document as a sequence of type, name and value steps, and
//! [`io::BsonWriter`] produces one the same way. The binary codec runs over
//! any [`io::BsonStream`], either a `std::io` stream wrapped in
//! [`io::BsonStreamAdapter`] or a pooled [`bsonio_buffers::ByteBuffer`]
//! wrapped in [`io::ByteBufferStream`].
//!
//! ```
//! use bsonio::io::{copy, JsonWriterSettings};
//! use bsonio::BsonValue;
//!
//! let value = copy::from_json(r#"{ "n" : NumberLong(5) }"#).unwrap();
//! assert_eq!(
//!     value,
//!     BsonValue::Document(vec![("n".to_string(), BsonValue::Int64(5))])
//! );
//! let strict = copy::to_json(&value, JsonWriterSettings::strict()).unwrap();
//! assert_eq!(strict, r#"{ "n" : { "$numberLong" : "5" } }"#);
//! ```

mod decimal128;
mod error;
mod guid;
mod object_id;
mod values;

pub mod io;

pub use decimal128::Decimal128;
pub use error::BsonError;
pub use guid::{Guid, GuidConverter, GuidRepresentation};
pub use object_id::ObjectId;
pub use values::{
    BsonBinaryData, BsonBinarySubType, BsonRegularExpression, BsonTimestamp, BsonType, BsonValue,
};
