use std::sync::Arc;

use bytes::Bytes;
use mpx_error::{MpxResult, ResultExt, SubscriptionError};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

use super::{
    handlers::{ActivationFn, DisconnectFn},
    topics::{TopicKind, Topics},
    BrokerLink, ChannelSubscription, ConnectionEvent, Handlers, Listener, PatternSubscription,
    PubSubCommand, RendezvousSubscription,
};
use crate::{config::Settings, connection::RedisConnection, registry::NodeId, registry::Registry};

/// Состояние соединения с точки зрения мультиплексора.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ещё ни разу не подключались.
    Disconnected,
    Connected,
    /// Соединение потеряно после успешного подключения.
    Reconnecting,
}

pub(crate) struct MuxState {
    closed: bool,
    connection: ConnectionState,
    channels: Topics,
    patterns: Topics,
    disconnect: Registry<Option<DisconnectFn>>,
}

impl MuxState {
    fn topics(
        &self,
        kind: TopicKind,
    ) -> &Topics {
        match kind {
            TopicKind::Channel => &self.channels,
            TopicKind::Pattern => &self.patterns,
        }
    }

    fn topics_mut(
        &mut self,
        kind: TopicKind,
    ) -> &mut Topics {
        match kind {
            TopicKind::Channel => &mut self.channels,
            TopicKind::Pattern => &mut self.patterns,
        }
    }
}

/// Общая часть мультиплексора, на которую ссылаются подписки.
///
/// Порядок захвата блокировок: `gate` → внутренний замок подписки →
/// состояние rendezvous → `state`. Пользовательские обработчики
/// вызываются только под `gate`, который реентерабелен.
pub(crate) struct MuxShared {
    gate: ReentrantMutex<()>,
    state: Mutex<MuxState>,
    link: Arc<dyn BrokerLink>,
}

impl MuxShared {
    pub(crate) fn gate(&self) -> ReentrantMutexGuard<'_, ()> {
        self.gate.lock()
    }

    fn state(&self) -> MutexGuard<'_, MuxState> {
        self.state.lock()
    }

    fn send(
        &self,
        command: PubSubCommand,
    ) {
        debug!(command = command.name(), args = ?command.args(), "Sending broker command");
        self.link.send(command);
    }

    /// Регистрирует слушателя под ключом.
    ///
    /// Первый слушатель ключа порождает физическую подписку. Если ключ уже
    /// активен, возвращается обработчик активации, который вызывающий должен
    /// выполнить до возврата из своей операции, отпустив свои замки.
    pub(crate) fn add_listener(
        &self,
        kind: TopicKind,
        key: &str,
        listener: Listener,
    ) -> (NodeId, Option<ActivationFn>) {
        let registration = self.state().topics_mut(kind).register(key, listener);
        if registration.created {
            trace!(%kind, key, "First listener registered");
            self.send(kind.subscribe(vec![key.to_string()]));
        }
        (registration.id, registration.activation)
    }

    /// Снимает слушателя. Последний слушатель порождает физическую отписку.
    pub(crate) fn remove_listener(
        &self,
        kind: TopicKind,
        key: &str,
        id: NodeId,
    ) {
        let emptied = self.state().topics_mut(kind).unregister(key, id);
        if emptied {
            trace!(%kind, key, "Last listener removed");
            self.send(kind.unsubscribe(vec![key.to_string()]));
        }
    }

    pub(crate) fn add_disconnect(
        &self,
        handler: Option<DisconnectFn>,
    ) -> NodeId {
        self.state().disconnect.prepend(handler)
    }

    pub(crate) fn remove_disconnect(
        &self,
        id: NodeId,
    ) {
        self.state().disconnect.remove(id);
    }

    fn ensure_open(&self) -> Result<(), SubscriptionError> {
        if self.state().closed {
            return Err(SubscriptionError::Closed {
                entity: "multiplexer",
            });
        }
        Ok(())
    }
}

/// Мультиплексор подписок поверх одного pub/sub соединения.
///
/// Любое число логических подписчиков делят одно соединение: на каждый
/// уникальный канал или шаблон брокеру уходит ровно одна команда подписки и
/// ровно одна отписки. Мультиплексор переживает обрывы соединения, повторно
/// подписываясь на все ключи после переподключения.
///
/// Дескриптор дёшево клонируется; все клоны разделяют одно состояние.
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<MuxShared>,
}

impl Multiplexer {
    /// Создаёт мультиплексор поверх канала команд к брокеру.
    ///
    /// События соединения нужно подать через [`Multiplexer::attach`] или
    /// напрямую через [`Multiplexer::handle_event`].
    pub fn new(link: Arc<dyn BrokerLink>) -> Self {
        Self {
            shared: Arc::new(MuxShared {
                gate: ReentrantMutex::new(()),
                state: Mutex::new(MuxState {
                    closed: false,
                    connection: ConnectionState::Disconnected,
                    channels: Topics::default(),
                    patterns: Topics::default(),
                    disconnect: Registry::new(),
                }),
                link,
            }),
        }
    }

    /// Подключается к Redis по настройкам и запускает цикл событий.
    ///
    /// Должен вызываться внутри tokio runtime. Само подключение идёт в фоне:
    /// функция возвращается сразу, подписки активируются после `Connected`.
    pub fn connect(settings: &Settings) -> MpxResult<Self> {
        settings
            .validate()
            .context("Invalid multiplexer settings")?;
        let (connection, events) = RedisConnection::spawn(settings.connection());
        let mux = Self::new(Arc::new(connection));
        mux.attach(events);
        Ok(mux)
    }

    /// Запускает задачу, передающую события соединения в мультиплексор.
    ///
    /// Задача не удерживает мультиплексор: она завершается, когда закрыт
    /// отправитель событий или удалён последний дескриптор мультиплексора и
    /// его подписок. Вместе с ним удаляется связь с брокером, и соединение
    /// закрывается.
    pub fn attach(
        &self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = shared.upgrade() else {
                    debug!("Multiplexer dropped, detaching from connection");
                    return;
                };
                Multiplexer { shared }.handle_event(event);
            }
            debug!("Connection event stream ended");
        })
    }

    /// Обрабатывает одно событие соединения синхронно.
    pub fn handle_event(
        &self,
        event: ConnectionEvent,
    ) {
        let _gate = self.shared.gate();
        match event {
            ConnectionEvent::Connected => self.on_connected(),
            ConnectionEvent::Reconnecting => self.on_reconnecting(),
            ConnectionEvent::Subscribed(channel) => self.on_activated(TopicKind::Channel, &channel),
            ConnectionEvent::PSubscribed(pattern) => {
                self.on_activated(TopicKind::Pattern, &pattern)
            }
            ConnectionEvent::Unsubscribed(channel) => trace!(channel, "Unsubscribe confirmed"),
            ConnectionEvent::PUnsubscribed(pattern) => trace!(pattern, "Punsubscribe confirmed"),
            ConnectionEvent::Message { channel, payload } => {
                self.deliver(TopicKind::Channel, &channel, &channel, &payload)
            }
            ConnectionEvent::PMessage {
                pattern,
                channel,
                payload,
            } => self.deliver(TopicKind::Pattern, &pattern, &channel, &payload),
        }
    }

    pub fn create_channel_subscription(
        &self,
        handlers: Handlers,
    ) -> Result<ChannelSubscription, SubscriptionError> {
        let _gate = self.shared.gate();
        self.shared.ensure_open()?;
        Ok(ChannelSubscription::new(self.shared.clone(), handlers))
    }

    /// Создаёт подписку на шаблон. Интерес регистрируется сразу.
    pub fn create_pattern_subscription(
        &self,
        pattern: &str,
        handlers: Handlers,
    ) -> Result<PatternSubscription, SubscriptionError> {
        let _gate = self.shared.gate();
        self.shared.ensure_open()?;
        Ok(PatternSubscription::new(
            self.shared.clone(),
            pattern,
            handlers,
        ))
    }

    /// Создаёт rendezvous-подписку на шаблон `prefix*`.
    pub fn create_rendezvous_subscription(
        &self,
        prefix: &str,
    ) -> Result<RendezvousSubscription, SubscriptionError> {
        let _gate = self.shared.gate();
        self.shared.ensure_open()?;
        Ok(RendezvousSubscription::new(self.shared.clone(), prefix))
    }

    /// Закрывает соединение с брокером. Повторный вызов вернёт ошибку.
    pub fn close(&self) -> Result<(), SubscriptionError> {
        let _gate = self.shared.gate();
        {
            let mut state = self.shared.state();
            if state.closed {
                return Err(SubscriptionError::Closed {
                    entity: "multiplexer",
                });
            }
            state.closed = true;
        }
        debug!("Closing multiplexer");
        self.shared.send(PubSubCommand::Quit);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state().connection
    }

    /// Каналы, на которые сейчас есть хотя бы один слушатель.
    pub fn channels(&self) -> Vec<String> {
        self.shared.state().channels.keys()
    }

    /// Шаблоны, на которые сейчас есть хотя бы один слушатель.
    pub fn patterns(&self) -> Vec<String> {
        self.shared.state().patterns.keys()
    }

    /// Подтверждена ли подписка на канал в текущем соединении.
    pub fn is_channel_active(
        &self,
        channel: &str,
    ) -> bool {
        self.shared.state().channels.is_active(channel)
    }

    pub fn is_pattern_active(
        &self,
        pattern: &str,
    ) -> bool {
        self.shared.state().patterns.is_active(pattern)
    }

    pub fn channel_listeners(
        &self,
        channel: &str,
    ) -> usize {
        self.shared.state().channels.listener_count(channel)
    }

    pub fn pattern_listeners(
        &self,
        pattern: &str,
    ) -> usize {
        self.shared.state().patterns.listener_count(pattern)
    }

    fn on_connected(&self) {
        let (channels, patterns) = {
            let mut state = self.shared.state();
            state.connection = ConnectionState::Connected;
            (state.channels.keys(), state.patterns.keys())
        };
        debug!(
            channels = channels.len(),
            patterns = patterns.len(),
            "Connected, resubscribing"
        );

        if !channels.is_empty() {
            self.shared.send(PubSubCommand::Subscribe(channels));
        }
        if !patterns.is_empty() {
            self.shared.send(PubSubCommand::PSubscribe(patterns));
        }
    }

    fn on_reconnecting(&self) {
        let handlers: Vec<(NodeId, DisconnectFn)> = {
            let mut state = self.shared.state();
            if state.connection != ConnectionState::Connected {
                trace!(state = ?state.connection, "Ignoring repeated reconnecting signal");
                return;
            }
            state.connection = ConnectionState::Reconnecting;
            state.channels.deactivate_all();
            state.patterns.deactivate_all();
            state
                .disconnect
                .iter()
                .filter_map(|(id, handler)| handler.clone().map(|h| (id, h)))
                .collect()
        };
        debug!(handlers = handlers.len(), "Connection lost");

        for (id, handler) in handlers {
            if self.shared.state().disconnect.contains(id) {
                handler();
            }
        }
    }

    fn on_activated(
        &self,
        kind: TopicKind,
        key: &str,
    ) {
        let listeners = {
            let mut state = self.shared.state();
            let topics = state.topics_mut(kind);
            if !topics.activate(key) {
                trace!(%kind, key, "Confirmation for a key without listeners");
                return;
            }
            topics.snapshot(key)
        };
        debug!(%kind, key, listeners = listeners.len(), "Subscription active");

        for (id, listener) in listeners {
            let Some(on_activation) = listener.on_activation else {
                continue;
            };
            if self.shared.state().topics(kind).is_linked(key, id) {
                on_activation(key);
            }
        }
    }

    fn deliver(
        &self,
        kind: TopicKind,
        key: &str,
        channel: &str,
        payload: &Bytes,
    ) {
        let listeners = self.shared.state().topics(kind).snapshot(key);
        trace!(%kind, key, channel, listeners = listeners.len(), "Dispatching message");

        for (id, listener) in listeners {
            if self.shared.state().topics(kind).is_linked(key, id) {
                (listener.on_message)(channel, payload);
            }
        }
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("Multiplexer")
            .field("closed", &state.closed)
            .field("connection", &state.connection)
            .field("channels", &state.channels.keys())
            .field("patterns", &state.patterns.keys())
            .finish()
    }
}
