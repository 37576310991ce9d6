use bsonio_buffers::BufferError;
use thiserror::Error;

/// Errors raised while reading or writing BSON and Extended JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BsonError {
    /// Malformed binary or text input.
    #[error("{0}")]
    Format(String),
    /// The input ended in the middle of a construct.
    #[error("unexpected end of stream")]
    EndOfStream,
    /// A call that is not legal in the current reader/writer state, or on a
    /// closed reader/writer.
    #[error("{0}")]
    InvalidOperation(String),
    /// An argument the operation cannot accept.
    #[error("{param}: {message}")]
    InvalidArgument { param: &'static str, message: String },
    /// A failure from the underlying buffer.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// A failure from a wrapped `std::io` stream.
    #[error("I/O error: {0}")]
    Io(String),
}

impl BsonError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        BsonError::Format(message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        BsonError::InvalidOperation(message.into())
    }

    pub(crate) fn invalid_argument(param: &'static str, message: impl Into<String>) -> Self {
        BsonError::InvalidArgument {
            param,
            message: message.into(),
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, BsonError::Format(_))
    }
}

impl From<std::io::Error> for BsonError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => BsonError::EndOfStream,
            _ => BsonError::Io(err.to_string()),
        }
    }
}
