use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки соединения с брокером.
///
/// Наружу из операций мультиплексора не поднимаются: соединение само
/// переподключается, а подписчики узнают о потере связи через
/// disconnect-уведомления. Используются при старте и в логах.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Не удалось подключиться
    ConnectFailed { address: String, reason: String },
    /// Таймаут подключения
    ConnectTimeout { address: String, timeout_ms: u64 },
    /// Соединение закрыто брокером
    Closed,
    /// Ошибка ввода-вывода
    Io { reason: String },
    /// Брокер прислал некорректный фрейм
    Protocol { reason: String },
    /// Брокер ответил ошибкой
    Server { message: String },
}

impl std::fmt::Display for ConnectionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ConnectFailed { address, reason } => {
                write!(f, "Failed to connect to {address}: {reason}")
            }
            Self::ConnectTimeout {
                address,
                timeout_ms,
            } => write!(f, "Connection to {address} timed out after {timeout_ms} ms"),
            Self::Closed => write!(f, "Connection closed by broker"),
            Self::Io { reason } => write!(f, "I/O error: {reason}"),
            Self::Protocol { reason } => write!(f, "Protocol error: {reason}"),
            Self::Server { message } => write!(f, "Broker error: {message}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl ErrorExt for ConnectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectTimeout { .. } => StatusCode::Timeout,
            Self::Closed => StatusCode::ConnectionClosed,
            Self::Io { .. } => StatusCode::Io,
            Self::Protocol { .. } | Self::Server { .. } => StatusCode::ProtocolError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "connection".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Self::ConnectFailed { address, .. } | Self::ConnectTimeout { address, .. } = self {
            tags.push(("address", address.clone()));
        }

        tags
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ConnectionError::Closed,
            _ => ConnectionError::Io {
                reason: err.to_string(),
            },
        }
    }
}
