use tracing_subscriber::EnvFilter;

use super::config::LoggingConfig;

/// Строит фильтр: `RUST_LOG`, если задан, иначе директива из конфигурации.
///
/// Некорректная директива заменяется на `info`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match EnvFilter::try_new(&config.level) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "Invalid log filter directive '{}': {e}; falling back to 'info'",
                    config.level
                );
                EnvFilter::new("info")
            }
        },
    }
}
