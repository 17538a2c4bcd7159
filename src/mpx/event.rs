use bytes::Bytes;

/// Событие, поступающее от соединения с брокером.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Соединение установлено (впервые или после обрыва).
    Connected,
    /// Соединение потеряно, идёт переподключение. Может приходить повторно.
    Reconnecting,
    /// Брокер подтвердил подписку на канал.
    Subscribed(String),
    /// Брокер подтвердил отписку от канала.
    Unsubscribed(String),
    /// Брокер подтвердил подписку на шаблон.
    PSubscribed(String),
    /// Брокер подтвердил отписку от шаблона.
    PUnsubscribed(String),
    /// Сообщение в канал, на который есть точная подписка.
    Message { channel: String, payload: Bytes },
    /// Сообщение, совпавшее с шаблоном `pattern`.
    PMessage {
        pattern: String,
        channel: String,
        payload: Bytes,
    },
}

/// Команда, отправляемая брокеру.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubCommand {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    PSubscribe(Vec<String>),
    PUnsubscribe(Vec<String>),
    Quit,
}

impl PubSubCommand {
    /// Имя команды в протоколе брокера.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::PSubscribe(_) => "PSUBSCRIBE",
            Self::PUnsubscribe(_) => "PUNSUBSCRIBE",
            Self::Quit => "QUIT",
        }
    }

    /// Аргументы команды (каналы или шаблоны).
    pub fn args(&self) -> &[String] {
        match self {
            Self::Subscribe(keys)
            | Self::Unsubscribe(keys)
            | Self::PSubscribe(keys)
            | Self::PUnsubscribe(keys) => keys,
            Self::Quit => &[],
        }
    }
}

/// Сторона соединения, принимающая команды мультиплексора.
///
/// `send` не должен блокироваться: команды отправляются по принципу
/// fire-and-forget, ответы приходят отдельными событиями
/// [`ConnectionEvent`].
pub trait BrokerLink: Send + Sync + 'static {
    fn send(
        &self,
        command: PubSubCommand,
    );
}
