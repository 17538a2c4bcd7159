use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки операций над мультиплексором и подписками.
///
/// Три вида ошибок различаются вариантом (и статус-кодом), чтобы вызывающая
/// сторона могла ветвиться без разбора строк.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Операция над закрытым мультиплексором или подпиской, либо повторный
    /// `close()`.
    Closed { entity: &'static str },
    /// Rendezvous запрошен, пока шаблон не подтверждён брокером.
    Inactive { prefix: String },
    /// Ожидание rendezvous истекло без сообщения.
    Timeout { channel: String, timeout_ms: u64 },
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SubscriptionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для SubscriptionError
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for SubscriptionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Closed { entity } => write!(f, "Tried to use a closed {entity}"),
            Self::Inactive { prefix } => {
                write!(f, "Rendezvous subscription '{prefix}*' is not active")
            }
            Self::Timeout {
                channel,
                timeout_ms,
            } => write!(f, "Rendezvous on '{channel}' timed out after {timeout_ms} ms"),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl ErrorExt for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed { .. } => StatusCode::SubscriptionClosed,
            Self::Inactive { .. } => StatusCode::SubscriptionInactive,
            Self::Timeout { .. } => StatusCode::Timeout,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "subscription".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::Closed { entity } => tags.push(("entity", entity.to_string())),
            Self::Inactive { prefix } => tags.push(("prefix", prefix.clone())),
            Self::Timeout {
                channel,
                timeout_ms,
            } => {
                tags.push(("channel", channel.clone()));
                tags.push(("timeout_ms", timeout_ms.to_string()));
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let closed = SubscriptionError::Closed {
            entity: "multiplexer",
        };
        let inactive = SubscriptionError::Inactive {
            prefix: "req:".to_string(),
        };
        let timeout = SubscriptionError::Timeout {
            channel: "req:42".to_string(),
            timeout_ms: 100,
        };

        assert_eq!(closed.status_code(), StatusCode::SubscriptionClosed);
        assert_eq!(inactive.status_code(), StatusCode::SubscriptionInactive);
        assert_eq!(timeout.status_code(), StatusCode::Timeout);
        assert!(closed.is_closed() && inactive.is_inactive() && timeout.is_timeout());
    }

    #[test]
    fn test_display() {
        let err = SubscriptionError::Timeout {
            channel: "req:42".to_string(),
            timeout_ms: 100,
        };
        assert_eq!(
            err.to_string(),
            "Rendezvous on 'req:42' timed out after 100 ms"
        );
        assert_eq!(
            SubscriptionError::Closed {
                entity: "pattern subscription"
            }
            .to_string(),
            "Tried to use a closed pattern subscription"
        );
    }

    #[test]
    fn test_log_fields() {
        let err = SubscriptionError::Timeout {
            channel: "req:7".to_string(),
            timeout_ms: 5000,
        };
        let tags = err.log_fields();
        assert!(tags.iter().any(|(k, v)| *k == "channel" && v == "req:7"));
        assert!(tags.iter().any(|(k, v)| *k == "timeout_ms" && v == "5000"));
    }
}
