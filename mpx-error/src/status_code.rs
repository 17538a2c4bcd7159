use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса ошибок мультиплексора.
///
/// # Диапазоны:
/// - 1xxx: Внутренние ошибки и конфигурация
/// - 2xxx: Использование подписок
/// - 6xxx: Соединение с брокером
/// - 8xxx: Разбор RESP
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 1xxx ===
    Internal = 1000,
    InvalidConfig = 1001,

    // === 2xxx ===
    SubscriptionClosed = 2000,
    SubscriptionInactive = 2001,

    // === 6xxx ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ProtocolError = 6003,
    ConnectionFailed = 6004,

    // === 8xxx ===
    InvalidFrame = 8000,
    InvalidUtf8 = 8001,
    InvalidInteger = 8002,
    SizeLimit = 8003,
    DepthLimit = 8004,
}

/// Рекомендуемый уровень логирования ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Повтор операции может пройти успешно.
    ///
    /// После `SubscriptionInactive` повтор имеет смысл только после
    /// ожидания активации.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::SubscriptionInactive
                | Self::ConnectionFailed
                | Self::ConnectionClosed
        )
    }

    /// Ошибка вызывающей стороны: закрытая подписка или плохие настройки.
    pub fn is_usage_error(&self) -> bool {
        (2000..3000).contains(&self.code()) || *self == Self::InvalidConfig
    }

    /// Ошибка разбора ответа брокера (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..9000).contains(&self.code())
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::SubscriptionClosed | Self::SubscriptionInactive => LogLevel::Debug,
            Self::InvalidConfig => LogLevel::Info,
            Self::Internal => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{}({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?}({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
