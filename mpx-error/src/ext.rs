use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок мультиплексора (object-safe).
///
/// Даёт статус-код для ветвления без разбора строк и набор полей для
/// структурированного логирования.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Нужен для downcast из [`StackError`](crate::StackError).
    fn as_any(&self) -> &dyn Any;

    fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }

    /// Пары ключ–значение для `tracing`-событий.
    fn log_fields(&self) -> Vec<(&'static str, String)> {
        vec![("status_code", self.status_code().to_string())]
    }
}
