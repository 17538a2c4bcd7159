use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use globset::{Glob, GlobMatcher};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::mpx::{BrokerLink, ConnectionEvent, PubSubCommand};

/// Внутрипроцессный брокер Pub/Sub.
///
/// Реализует [`BrokerLink`] без сети: подтверждения подписок, сообщения и
/// смена состояния соединения приходят через тот же поток событий, что и от
/// настоящего брокера. Поддерживает:
/// - Точные подписки по имени канала
/// - Подписки по шаблонам (glob)
/// - Имитацию обрыва соединения
/// - Статистику публикаций
///
/// Дескриптор клонируется; клоны разделяют состояние.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: Mutex<MemoryState>,
    /// Общее количество вызовов `publish`
    publish_count: AtomicUsize,
    /// Количество команд, отброшенных без соединения
    dropped_commands: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    connected: bool,
    quit: bool,
    channels: FxHashSet<String>,
    patterns: FxHashMap<String, GlobMatcher>,
}

impl MemoryBroker {
    /// Создаёт брокер и поток его событий. Брокер стартует отключённым.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let broker = Self {
            inner: Arc::new(MemoryInner {
                events,
                state: Mutex::new(MemoryState::default()),
                publish_count: AtomicUsize::new(0),
                dropped_commands: AtomicUsize::new(0),
            }),
        };
        (broker, rx)
    }

    /// Имитирует успешное подключение.
    pub fn connect(&self) {
        {
            let mut state = self.inner.state.lock();
            state.connected = true;
            state.quit = false;
        }
        debug!("Memory broker connected");
        self.emit(ConnectionEvent::Connected);
    }

    /// Имитирует обрыв: брокер забывает подписки соединения.
    pub fn drop_connection(&self) {
        {
            let mut state = self.inner.state.lock();
            state.connected = false;
            state.channels.clear();
            state.patterns.clear();
        }
        debug!("Memory broker connection dropped");
        self.emit(ConnectionEvent::Reconnecting);
    }

    /// Публикует сообщение. Возвращает число доставок (точный канал плюс
    /// каждый совпавший шаблон).
    pub fn publish(
        &self,
        channel: &str,
        payload: impl Into<Bytes>,
    ) -> usize {
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);
        let payload = payload.into();

        let mut deliveries = Vec::new();
        {
            let state = self.inner.state.lock();
            if !state.connected {
                trace!(channel, "Publish while disconnected");
                return 0;
            }

            // 1) точное совпадение
            if state.channels.contains(channel) {
                deliveries.push(ConnectionEvent::Message {
                    channel: channel.to_string(),
                    payload: payload.clone(),
                });
            }

            // 2) по шаблону
            for (pattern, matcher) in &state.patterns {
                if matcher.is_match(channel) {
                    deliveries.push(ConnectionEvent::PMessage {
                        pattern: pattern.clone(),
                        channel: channel.to_string(),
                        payload: payload.clone(),
                    });
                }
            }
        }

        let count = deliveries.len();
        for event in deliveries {
            self.emit(event);
        }
        count
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    /// Получена ли команда `QUIT`.
    pub fn is_quit(&self) -> bool {
        self.inner.state.lock().quit
    }

    /// Каналы, на которые подписано соединение.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = self.inner.state.lock().channels.iter().cloned().collect();
        channels.sort();
        channels
    }

    /// Шаблоны, на которые подписано соединение.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<_> = self.inner.state.lock().patterns.keys().cloned().collect();
        patterns.sort();
        patterns
    }

    pub fn publish_count(&self) -> usize {
        self.inner.publish_count.load(Ordering::Relaxed)
    }

    pub fn dropped_commands(&self) -> usize {
        self.inner.dropped_commands.load(Ordering::Relaxed)
    }

    fn emit(
        &self,
        event: ConnectionEvent,
    ) {
        if self.inner.events.send(event).is_err() {
            trace!("Memory broker has no event consumer");
        }
    }
}

impl BrokerLink for MemoryBroker {
    fn send(
        &self,
        command: PubSubCommand,
    ) {
        let mut confirmations = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if !state.connected {
                trace!(command = command.name(), "Offline, command dropped");
                self.inner.dropped_commands.fetch_add(1, Ordering::Relaxed);
                return;
            }

            match command {
                PubSubCommand::Subscribe(channels) => {
                    for channel in channels {
                        state.channels.insert(channel.clone());
                        confirmations.push(ConnectionEvent::Subscribed(channel));
                    }
                }
                PubSubCommand::Unsubscribe(channels) => {
                    for channel in channels {
                        state.channels.remove(&channel);
                        confirmations.push(ConnectionEvent::Unsubscribed(channel));
                    }
                }
                PubSubCommand::PSubscribe(patterns) => {
                    for pattern in patterns {
                        match Glob::new(&pattern) {
                            Ok(glob) => {
                                state.patterns.insert(pattern.clone(), glob.compile_matcher());
                                confirmations.push(ConnectionEvent::PSubscribed(pattern));
                            }
                            Err(err) => warn!(%pattern, error = %err, "Invalid glob pattern"),
                        }
                    }
                }
                PubSubCommand::PUnsubscribe(patterns) => {
                    for pattern in patterns {
                        state.patterns.remove(&pattern);
                        confirmations.push(ConnectionEvent::PUnsubscribed(pattern));
                    }
                }
                PubSubCommand::Quit => {
                    state.quit = true;
                    state.connected = false;
                    state.channels.clear();
                    state.patterns.clear();
                }
            }
        }

        for event in confirmations {
            self.emit(event);
        }
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("connected", &self.is_connected())
            .field("channels", &self.channels())
            .field("patterns", &self.patterns())
            .finish()
    }
}
