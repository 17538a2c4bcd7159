use std::any::Any;

use mpx_error::{ConnectionError, ErrorExt, StatusCode};
use thiserror::Error;

/// Ошибка разбора RESP-потока от брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown RESP type byte 0x{0:02x}")]
    UnknownType(u8),

    #[error("invalid integer in frame header")]
    InvalidInteger,

    #[error("invalid length {0}")]
    InvalidLength(i64),

    #[error("bulk string of {len} bytes exceeds limit of {max}")]
    BulkTooLong { len: usize, max: usize },

    #[error("array nesting exceeds {0} levels")]
    DepthExceeded(usize),

    #[error("line exceeds {0} bytes without CRLF")]
    LineTooLong(usize),

    #[error("bulk string is not terminated by CRLF")]
    MissingCrlf,

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),
}

impl ErrorExt for ProtocolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInteger | Self::InvalidLength(_) => StatusCode::InvalidInteger,
            Self::BulkTooLong { .. } | Self::LineTooLong(_) => StatusCode::SizeLimit,
            Self::DepthExceeded(_) => StatusCode::DepthLimit,
            Self::InvalidUtf8 => StatusCode::InvalidUtf8,
            Self::UnknownType(_) | Self::MissingCrlf | Self::UnexpectedFrame(_) => {
                StatusCode::InvalidFrame
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        ConnectionError::Protocol {
            reason: err.to_string(),
        }
    }
}
