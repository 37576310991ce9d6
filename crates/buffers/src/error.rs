use thiserror::Error;

/// Errors raised by byte buffers and chunk sources.
///
/// These are contract and capacity errors: they signal misuse of a buffer
/// (bad positions, a disposed or read-only buffer) or growth the buffer
/// cannot satisfy. Malformed data is reported by the codec layers above.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A position, count or length argument is outside the legal range.
    #[error("{param}: {message}")]
    OutOfRange {
        param: &'static str,
        message: &'static str,
    },
    /// The object was used after `dispose`.
    #[error("cannot access a disposed object: {0}")]
    Disposed(&'static str),
    /// The operation is not valid in the current mode of the object.
    #[error("{0}")]
    InvalidOperation(String),
}

impl BufferError {
    pub(crate) fn out_of_range(param: &'static str, message: &'static str) -> Self {
        BufferError::OutOfRange { param, message }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BufferError::InvalidOperation(message.into())
    }

    pub(crate) fn read_only() -> Self {
        BufferError::InvalidOperation("Buffer is read only.".to_string())
    }

    /// Name of the offending parameter for out-of-range errors.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            BufferError::OutOfRange { param, .. } => Some(param),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_names_parameter() {
        let err = BufferError::out_of_range("position", "Position is outside of the buffer.");
        assert_eq!(err.param(), Some("position"));
        assert_eq!(err.to_string(), "position: Position is outside of the buffer.");
    }

    #[test]
    fn disposed_names_type() {
        let err = BufferError::Disposed("MultiChunkBuffer");
        assert!(err.to_string().contains("MultiChunkBuffer"));
        assert_eq!(err.param(), None);
    }
}
