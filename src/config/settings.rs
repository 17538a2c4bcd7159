use std::time::Duration;

use config::{Config, ConfigError, Environment};
use mpx_error::{ensure, MpxResult, StatusCode};
use serde::{Deserialize, Serialize};

use crate::connection::{Backoff, ConnectionConfig};

/// Префикс переменных окружения: `MPX_REDIS_ADDR`, `MPX_LOG_LEVEL` и т.д.
pub const ENV_PREFIX: &str = "MPX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Адрес брокера `host:port`.
    pub redis_addr: String,
    pub connect_timeout_ms: u64,
    /// Базовая задержка переподключения.
    pub backoff_base_ms: u64,
    /// Потолок задержки переподключения.
    pub backoff_max_ms: u64,
    /// Директива фильтра логов (`info`, `zumic_mpx=debug`, ...).
    pub log_level: String,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, поверх них переменные
    /// окружения с префиксом `MPX_`.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Config::builder()
            .set_default("redis_addr", defaults.redis_addr)?
            .set_default("connect_timeout_ms", defaults.connect_timeout_ms)?
            .set_default("backoff_base_ms", defaults.backoff_base_ms)?
            .set_default("backoff_max_ms", defaults.backoff_max_ms)?
            .set_default("log_level", defaults.log_level)?
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn validate(&self) -> MpxResult<()> {
        ensure!(
            !self.redis_addr.trim().is_empty(),
            StatusCode::InvalidConfig,
            "redis_addr must not be empty"
        );
        ensure!(
            self.connect_timeout_ms > 0,
            StatusCode::InvalidConfig,
            "connect_timeout_ms must be positive"
        );
        ensure!(
            self.backoff_max_ms > 0,
            StatusCode::InvalidConfig,
            "backoff_max_ms must be positive"
        );
        ensure!(
            self.backoff_base_ms <= self.backoff_max_ms,
            StatusCode::InvalidConfig,
            "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
            self.backoff_base_ms,
            self.backoff_max_ms
        );
        Ok(())
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            address: self.redis_addr.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            backoff: Backoff::new(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
            ),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_addr: "127.0.0.1:6379".to_string(),
            connect_timeout_ms: 5_000,
            backoff_base_ms: 8,
            backoff_max_ms: 512,
            log_level: "info".to_string(),
        }
    }
}
