use std::time::Duration;

use bytes::BytesMut;
use mpx_error::{ConnectionError, ErrorExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, info, trace, warn};

use super::{push, resp, ConnectionConfig};
use crate::mpx::{BrokerLink, ConnectionEvent, PubSubCommand};

/// Начальный размер буфера чтения.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Pub/sub соединение с Redis, работающее в фоновой задаче.
///
/// Задача сама переподключается с экспоненциальной задержкой. Перед каждой
/// повторной попыткой в поток событий уходит `Reconnecting`, после
/// успешного подключения `Connected`. Команды, пришедшие без соединения,
/// отбрасываются: мультиплексор заново подписывается на всё по `Connected`.
pub struct RedisConnection {
    commands: mpsc::UnboundedSender<PubSubCommand>,
    task: JoinHandle<()>,
}

enum Exit {
    /// Получен `QUIT` или закрыт канал команд.
    Quit,
    /// Потребитель событий ушёл.
    Detached,
}

impl RedisConnection {
    /// Запускает задачу соединения. Должен вызываться внутри tokio runtime.
    pub fn spawn(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, commands_rx, events_tx));

        (
            Self {
                commands: commands_tx,
                task,
            },
            events_rx,
        )
    }

    /// Завершилась ли фоновая задача.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl BrokerLink for RedisConnection {
    fn send(
        &self,
        command: PubSubCommand,
    ) {
        if self.commands.send(command).is_err() {
            trace!("Connection task is gone, command dropped");
        }
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    config: ConnectionConfig,
    mut commands: mpsc::UnboundedReceiver<PubSubCommand>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        match connect(&config).await {
            Ok(mut stream) => {
                attempt = 0;
                if discard_stale(&mut commands) {
                    let mut quit = BytesMut::new();
                    resp::encode_pubsub(&PubSubCommand::Quit, &mut quit);
                    let _ = stream.write_all(&quit).await;
                    let _ = stream.shutdown().await;
                    debug!("Connection closed on request before activation");
                    return;
                }

                info!(address = %config.address, "Connected to broker");
                if events.send(ConnectionEvent::Connected).is_err() {
                    return;
                }

                match serve(stream, &mut commands, &events).await {
                    Ok(Exit::Quit) => {
                        debug!("Connection closed on request");
                        return;
                    }
                    Ok(Exit::Detached) => return,
                    Err(err) => warn!(
                        error = %err,
                        status = %err.status_code(),
                        "Connection to broker lost"
                    ),
                }
            }
            Err(err) => warn!(
                error = %err,
                status = %err.status_code(),
                retryable = err.is_retryable(),
                attempt,
                "Failed to connect to broker"
            ),
        }

        if events.send(ConnectionEvent::Reconnecting).is_err() {
            return;
        }
        attempt = attempt.saturating_add(1);
        let delay = config.backoff.delay(attempt);
        debug!(?delay, attempt, "Reconnecting");

        if wait_offline(delay, &mut commands).await {
            return;
        }
    }
}

async fn connect(config: &ConnectionConfig) -> Result<TcpStream, ConnectionError> {
    debug!(address = %config.address, "Connecting to broker");
    let stream = timeout(config.connect_timeout, TcpStream::connect(&config.address))
        .await
        .map_err(|_| ConnectionError::ConnectTimeout {
            address: config.address.clone(),
            timeout_ms: u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|e| ConnectionError::ConnectFailed {
            address: config.address.clone(),
            reason: e.to_string(),
        })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Обслуживает установленное соединение до ошибки или `QUIT`.
async fn serve(
    stream: TcpStream,
    commands: &mut mpsc::UnboundedReceiver<PubSubCommand>,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
) -> Result<Exit, ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut write_buf = BytesMut::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    return Ok(Exit::Quit);
                };
                let quit = command == PubSubCommand::Quit;

                resp::encode_pubsub(&command, &mut write_buf);
                if !write_buf.is_empty() {
                    trace!(command = command.name(), "Writing command");
                    writer.write_all(&write_buf).await?;
                    write_buf.clear();
                }
                if quit {
                    let _ = writer.shutdown().await;
                    return Ok(Exit::Quit);
                }
            }
            read = reader.read_buf(&mut read_buf) => {
                if read? == 0 {
                    return Err(ConnectionError::Closed);
                }
                while let Some(frame) = resp::decode(&mut read_buf)? {
                    if let Some(event) = push::into_event(frame)? {
                        if events.send(event).is_err() {
                            return Ok(Exit::Detached);
                        }
                    }
                }
            }
        }
    }
}

/// Отбрасывает команды, пришедшие без соединения: подписки мультиплексор
/// повторит сам по `Connected`.
///
/// Возвращает `true`, если среди них был `QUIT` или канал команд закрыт.
fn discard_stale(commands: &mut mpsc::UnboundedReceiver<PubSubCommand>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(PubSubCommand::Quit) | Err(TryRecvError::Disconnected) => return true,
            Ok(command) => trace!(command = command.name(), "Stale command dropped"),
            Err(TryRecvError::Empty) => return false,
        }
    }
}

/// Пережидает задержку переподключения, отбрасывая команды.
///
/// Возвращает `true`, если за это время пришёл `QUIT` или закрылся канал
/// команд.
async fn wait_offline(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<PubSubCommand>,
) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return false,
            command = commands.recv() => match command {
                None | Some(PubSubCommand::Quit) => return true,
                Some(command) => trace!(command = command.name(), "Offline, command dropped"),
            },
        }
    }
}
