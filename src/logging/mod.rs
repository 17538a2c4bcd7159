pub mod config;
mod filters;
pub mod handle;

pub use config::{FileSinkConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, Layer,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов вернёт ошибку.
pub fn init_logging(
    mut config: LoggingConfig
) -> Result<LoggingHandle, Box<dyn std::error::Error + Send + Sync>> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter(&config);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // Console layer
    layers.push(console_layer(config.format, config.ansi));

    // File layer
    let file_guard = match &config.file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(&file.dir, &file.prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = ?config.format,
        file_enabled = config.file.is_some(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}

fn console_layer(
    format: LogFormat,
    ansi: bool,
) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer().pretty().with_ansi(ansi).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    }
}
