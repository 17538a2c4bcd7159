use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Типизированная ошибка с цепочкой контекстов.
///
/// Используется на границах, где ошибка подписки, соединения или настроек
/// поднимается выше: запуск мультиплексора, загрузка настроек, CLI.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    contexts: Vec<ErrorContext>,
}

/// Один уровень контекста и место, где он добавлен.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: &'static Location<'static>,
}

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            contexts: Vec::new(),
        }
    }

    /// Добавляет внешний уровень контекста.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.contexts.push(ErrorContext {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn is_retryable(&self) -> bool {
        self.root.is_retryable()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Контексты от внутреннего к внешнему.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let contexts: Vec<String> = self
            .contexts
            .iter()
            .map(|c| format!("{} ({}:{})", c.message, c.location.file(), c.location.line()))
            .collect();
        f.debug_struct("StackError")
            .field("root", &self.root.to_string())
            .field("status_code", &self.status_code())
            .field("contexts", &contexts)
            .finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for ctx in self.contexts.iter().rev() {
            write!(f, "{}: ", ctx.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionError, SubscriptionError};

    /// Внешний контекст печатается первым, место вызова запоминается.
    #[test]
    fn test_context_chain() {
        let err = ConnectionError::ConnectTimeout {
            address: "127.0.0.1:6379".to_string(),
            timeout_ms: 500,
        };
        let stack = StackError::new(err)
            .context("Connecting multiplexer")
            .context("Starting listener");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "Connecting multiplexer");
        assert!(stack.contexts()[0].location.file().ends_with("stack.rs"));
        assert!(stack
            .to_string()
            .starts_with("Starting listener: Connecting multiplexer: "));
        assert!(stack.is_retryable());
    }

    #[test]
    fn test_downcast() {
        let stack: StackError = SubscriptionError::Inactive {
            prefix: "req:".to_string(),
        }
        .into();

        assert!(matches!(
            stack.downcast_ref::<SubscriptionError>(),
            Some(SubscriptionError::Inactive { .. })
        ));
        assert!(stack.downcast_ref::<ConnectionError>().is_none());
        assert_eq!(stack.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_source_is_root() {
        use std::error::Error;

        let stack = StackError::new(SubscriptionError::Closed {
            entity: "multiplexer",
        })
        .context("Closing");
        let source = stack.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Tried to use a closed multiplexer"));
    }
}
