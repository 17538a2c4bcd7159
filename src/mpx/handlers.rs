use std::{future::Future, sync::Arc};

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::warn;

/// Обработчик входящего сообщения: `(channel, payload)`.
pub type MessageFn = Arc<dyn Fn(&str, &Bytes) + Send + Sync>;
/// Обработчик подтверждения подписки: получает канал или шаблон.
pub type ActivationFn = Arc<dyn Fn(&str) + Send + Sync>;
/// Обработчик потери соединения.
pub type DisconnectFn = Arc<dyn Fn() + Send + Sync>;

/// Набор обработчиков подписки.
///
/// Обработчики вызываются синхронно, пока мультиплексор держит свой
/// диспетчерский замок, и не должны блокироваться. Асинхронную обработку
/// сообщений даёт [`Handlers::new_async`], остальную асинхронную работу
/// обработчик запускает сам через `tokio::spawn`.
///
/// Обработчик сообщений обязателен, остальные опциональны:
///
/// ```
/// use zumic_mpx::Handlers;
///
/// let handlers = Handlers::new(|channel, payload| {
///     println!("{channel}: {} bytes", payload.len());
/// })
/// .on_activation(|key| println!("{key} is live"))
/// .on_disconnect(|| println!("connection lost"));
/// # drop(handlers);
/// ```
#[derive(Clone)]
pub struct Handlers {
    pub(crate) on_message: MessageFn,
    pub(crate) on_activation: Option<ActivationFn>,
    pub(crate) on_disconnect: Option<DisconnectFn>,
}

impl Handlers {
    pub fn new<F>(on_message: F) -> Self
    where
        F: Fn(&str, &Bytes) + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_activation: None,
            on_disconnect: None,
        }
    }

    /// Асинхронный обработчик сообщений.
    ///
    /// На каждое сообщение запускается отдельная tokio-задача, поэтому
    /// порядок завершения обработок не гарантирован. Сообщение, пришедшее
    /// вне tokio runtime, отбрасывается с предупреждением.
    pub fn new_async<F, Fut>(on_message: F) -> Self
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(move |channel, payload| match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(on_message(channel.to_string(), payload.clone()));
            }
            Err(_) => warn!(channel, "No tokio runtime, async message handler skipped"),
        })
    }

    pub fn on_activation<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_activation = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub(crate) fn listener(&self) -> Listener {
        Listener {
            on_message: self.on_message.clone(),
            on_activation: self.on_activation.clone(),
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("on_activation", &self.on_activation.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// Полезная нагрузка узла в реестре канала или шаблона.
#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) on_message: MessageFn,
    pub(crate) on_activation: Option<ActivationFn>,
}
