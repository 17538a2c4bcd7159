//! Соединение с брокером Redis.
//!
//! - `resp`: кодек RESP2.
//! - `push`: перевод push-фреймов в события мультиплексора.
//! - `redis`: фоновая задача соединения с переподключением.
//! - `backoff`: задержка между попытками подключения.

pub mod backoff;
pub mod push;
pub mod redis;
pub mod resp;

use std::time::Duration;

pub use backoff::Backoff;
pub use redis::RedisConnection;

/// Параметры соединения с брокером.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Адрес в виде `host:port`.
    pub address: String,
    pub connect_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
        }
    }
}
