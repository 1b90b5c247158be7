//! Error taxonomy shared by every message component.

use thiserror::Error;

pub type Result<T, E = HttpError> = std::result::Result<T, E>;

/// Errors raised while building, deriving or reading HTTP messages.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A value handed to a constructor or `with_*` method was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A resource was not in a state that allows the operation.
    #[error("{0}")]
    Runtime(String),

    /// The underlying OS resource failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A registered body parser produced a scalar instead of a structure.
    #[error("body parser for `{media_type}` must return an object, an array, or nothing")]
    ParserContract { media_type: String },
}

impl HttpError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        HttpError::InvalidArgument(msg.into())
    }

    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        HttpError::Runtime(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, HttpError::InvalidArgument(_))
    }

    /// True for failures of the underlying resource rather than of the input.
    pub fn is_runtime(&self) -> bool {
        matches!(self, HttpError::Runtime(_) | HttpError::Io(_))
    }
}
