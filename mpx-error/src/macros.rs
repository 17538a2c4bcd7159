/// Немедленно возвращает [`StackError`](crate::StackError).
///
/// - `bail!(err)`: готовая типизированная ошибка;
/// - `bail!(code, "fmt", args..)`: [`GenericError`](crate::GenericError) с
///   кодом и сообщением.
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return Err($crate::StackError::new(
            $crate::GenericError::new($code, format!($($fmt)+))
        ))
    };
}

/// Вызывает [`bail!`], если условие ложно.
///
/// ```
/// use mpx_error::{ensure, MpxResult, StatusCode};
///
/// fn check_backoff(base_ms: u64, max_ms: u64) -> MpxResult<()> {
///     ensure!(base_ms > 0, StatusCode::InvalidConfig, "backoff base must be positive");
///     ensure!(
///         base_ms <= max_ms,
///         StatusCode::InvalidConfig,
///         "backoff base {} exceeds max {}",
///         base_ms,
///         max_ms
///     );
///     Ok(())
/// }
///
/// assert!(check_backoff(8, 512).is_ok());
/// assert!(check_backoff(1024, 512).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Добавление контекста к `Result` с ошибкой, приводимой к
/// [`StackError`](crate::StackError).
pub trait ResultExt<T> {
    fn context(
        self,
        ctx: impl Into<String>,
    ) -> Result<T, crate::StackError>;

    /// Контекст строится только при ошибке.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context(
        self,
        ctx: impl Into<String>,
    ) -> Result<T, crate::StackError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(ctx)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}
