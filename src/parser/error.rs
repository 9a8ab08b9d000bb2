use std::io;

use thiserror::Error;

/// Failures of the image data decoder. Any of these aborts the current image.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read image data: {0}")]
    Io(#[source] io::Error),

    #[error("image data ended unexpectedly")]
    UnexpectedEof,

    #[error("malformed image data: {0}")]
    MalformedStream(String),

    #[error("unsupported image data: {0}")]
    UnsupportedFormat(String),
}

impl DecodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        DecodeError::MalformedStream(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        DecodeError::UnsupportedFormat(message.into())
    }
}

impl From<io::Error> for DecodeError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof,
            _ => DecodeError::Io(error),
        }
    }
}
