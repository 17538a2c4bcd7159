use std::{env, path::PathBuf, str::FromStr};

use mpx_error::{ensure, MpxResult, StatusCode};

/// Переменная окружения, переопределяющая уровень логов.
pub const ENV_LOG_LEVEL: &str = "MPX_LOG_LEVEL";
/// Переменная окружения, переопределяющая формат логов.
pub const ENV_LOG_FORMAT: &str = "MPX_LOG_FORMAT";

/// Формат вывода логов.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Файловый sink с ежедневной ротацией.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSinkConfig {
    pub dir: PathBuf,
    /// Префикс имени файла, например `mpx.log`.
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Директива фильтра (`info`, `zumic_mpx=debug,warn`).
    pub level: String,
    pub format: LogFormat,
    /// Цветной вывод в консоль.
    pub ansi: bool,
    /// `None`: только консоль.
    pub file: Option<FileSinkConfig>,
}

impl LoggingConfig {
    pub fn with_level(
        mut self,
        level: impl Into<String>,
    ) -> Self {
        self.level = level.into();
        self
    }

    /// Применяет `MPX_LOG_LEVEL` и `MPX_LOG_FORMAT`, если заданы.
    ///
    /// Некорректный формат игнорируется с предупреждением в stderr.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.level = level;
            }
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring {ENV_LOG_FORMAT}: {e}"),
            }
        }
    }

    pub fn validate(&self) -> MpxResult<()> {
        ensure!(
            !self.level.trim().is_empty(),
            StatusCode::InvalidConfig,
            "log level must not be empty"
        );
        if let Some(file) = &self.file {
            ensure!(
                !file.prefix.trim().is_empty(),
                StatusCode::InvalidConfig,
                "log file prefix must not be empty"
            );
        }
        Ok(())
    }

    /// Создаёт каталог файлового sink, если он включён.
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        match &self.file {
            Some(file) => std::fs::create_dir_all(&file.dir),
            None => Ok(()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            ansi: true,
            file: None,
        }
    }
}
