//! CLI мультиплексора Zumic
//!
//! Подписывается на каналы и шаблоны через общее соединение с Redis и
//! печатает доставленные сообщения, либо ждёт одно сообщение rendezvous.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use zumic_mpx::{
    logging::{init_logging, LogFormat, LoggingConfig},
    Handlers, Multiplexer, Settings,
};

/// Основная структура CLI аргументов
#[derive(Parser)]
#[command(name = "zumic-mpx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Zumic MPX - subscription multiplexer over a shared Redis connection", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Адрес Redis (`host:port`), по умолчанию из MPX_REDIS_ADDR
    #[arg(short, long, help = "Адрес брокера host:port")]
    addr: Option<String>,
    /// Формат логов
    #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
    log_format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Слушать каналы и шаблоны до Ctrl-C
    Listen {
        /// Литеральный канал (можно несколько раз)
        #[arg(short, long = "channel")]
        channels: Vec<String>,
        /// Шаблон (можно несколько раз)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,
    },
    /// Дождаться одного сообщения в канале `prefix + suffix`
    Await {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        suffix: String,
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().context("failed to load settings")?;
    if let Some(addr) = cli.addr {
        settings.redis_addr = addr;
    }

    let logging = LoggingConfig {
        format: cli.log_format.into(),
        ..LoggingConfig::default()
    }
    .with_level(settings.log_level.clone());
    let _logging = init_logging(logging).map_err(|e| anyhow::anyhow!(e))?;

    let mux = Multiplexer::connect(&settings).context("failed to start multiplexer")?;
    info!(address = %settings.redis_addr, "Multiplexer started");

    let result = match cli.command {
        Commands::Listen { channels, patterns } => listen(&mux, channels, patterns).await,
        Commands::Await {
            prefix,
            suffix,
            timeout_ms,
        } => await_one(&mux, &prefix, &suffix, Duration::from_millis(timeout_ms)).await,
    };

    mux.close()?;
    result
}

async fn listen(
    mux: &Multiplexer,
    channels: Vec<String>,
    patterns: Vec<String>,
) -> Result<()> {
    anyhow::ensure!(
        !channels.is_empty() || !patterns.is_empty(),
        "nothing to listen to: pass --channel or --pattern"
    );

    let subscription = mux.create_channel_subscription(handlers("channel"))?;
    for channel in &channels {
        subscription.add(channel)?;
    }

    let pattern_subs = patterns
        .iter()
        .map(|p| mux.create_pattern_subscription(p, handlers("pattern")))
        .collect::<Result<Vec<_>, _>>()?;

    tokio::signal::ctrl_c().await?;
    debug!("Interrupted, closing subscriptions");

    subscription.close()?;
    for sub in pattern_subs {
        sub.close()?;
    }
    Ok(())
}

async fn await_one(
    mux: &Multiplexer,
    prefix: &str,
    suffix: &str,
    timeout: Duration,
) -> Result<()> {
    let rendezvous = mux.create_rendezvous_subscription(prefix)?;

    match rendezvous.wait_and_rendezvous(suffix, timeout).await {
        Ok(payload) => println!("{prefix}{suffix}: {}", render(&payload)),
        Err(e) if e.is_timeout() => println!("(timeout after {} ms)", timeout.as_millis()),
        Err(e) => return Err(e.into()),
    }

    rendezvous.close()?;
    Ok(())
}

fn handlers(kind: &'static str) -> Handlers {
    Handlers::new(|channel, payload| println!("{channel}: {}", render(payload)))
        .on_activation(move |key| println!("({kind} {key} active)"))
        .on_disconnect(move || println!("({kind} subscription disconnected)"))
}

fn render(payload: &Bytes) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

impl From<OutputFormat> for LogFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Pretty => LogFormat::Pretty,
            OutputFormat::Compact => LogFormat::Compact,
            OutputFormat::Json => LogFormat::Json,
        }
    }
}
