use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового sink: пока handle жив, фоновый писатель работает;
/// при удалении буфер сбрасывается на диск.
#[must_use = "dropping the handle stops the file log writer"]
pub struct LoggingHandle {
    _file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            _file_guard: file_guard,
        }
    }

    /// Включён ли файловый sink.
    pub fn has_file_sink(&self) -> bool {
        self._file_guard.is_some()
    }

    /// Явное завершение с записью итогового события.
    pub fn shutdown(mut self) {
        tracing::info!("Logging shutdown");
        drop(self._file_guard.take());
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .finish()
    }
}
