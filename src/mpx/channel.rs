use std::sync::Arc;

use mpx_error::SubscriptionError;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{multiplexer::MuxShared, topics::TopicKind, Handlers, Listener};
use crate::registry::NodeId;

const ENTITY: &str = "channel subscription";

struct ChannelInner {
    channels: FxHashMap<Arc<str>, NodeId>,
    disconnect: NodeId,
    closed: bool,
}

/// Подписка на динамический набор литеральных каналов.
///
/// Все каналы подписки обслуживаются одним набором обработчиков. Каналы
/// можно добавлять и удалять в любой момент, в том числе изнутри
/// обработчиков. Незакрытая подписка при удалении (`Drop`) снимает все свои
/// регистрации так же, как [`ChannelSubscription::close`].
pub struct ChannelSubscription {
    mux: Arc<MuxShared>,
    listener: Listener,
    inner: Mutex<ChannelInner>,
}

impl ChannelSubscription {
    pub(crate) fn new(
        mux: Arc<MuxShared>,
        handlers: Handlers,
    ) -> Self {
        let disconnect = mux.add_disconnect(handlers.on_disconnect.clone());
        Self {
            listener: handlers.listener(),
            inner: Mutex::new(ChannelInner {
                channels: FxHashMap::default(),
                disconnect,
                closed: false,
            }),
            mux,
        }
    }

    /// Добавляет канал. Повторное добавление того же канала ничего не делает.
    ///
    /// Если канал уже подтверждён брокером, обработчик активации вызывается
    /// до возврата из метода.
    pub fn add(
        &self,
        channel: &str,
    ) -> Result<(), SubscriptionError> {
        let _gate = self.mux.gate();
        let activation = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(closed());
            }
            if inner.channels.contains_key(channel) {
                return Ok(());
            }
            let (id, activation) =
                self.mux
                    .add_listener(TopicKind::Channel, channel, self.listener.clone());
            inner.channels.insert(Arc::from(channel), id);
            activation
        };

        if let Some(on_activation) = activation {
            trace!(channel, "Channel already active, activating late joiner");
            on_activation(channel);
        }
        Ok(())
    }

    /// Удаляет канал. Отсутствующий канал игнорируется.
    pub fn remove(
        &self,
        channel: &str,
    ) -> Result<(), SubscriptionError> {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(closed());
        }
        if let Some(id) = inner.channels.remove(channel) {
            self.mux.remove_listener(TopicKind::Channel, channel, id);
        }
        Ok(())
    }

    /// Удаляет все каналы, оставляя подписку открытой.
    pub fn clear(&self) -> Result<(), SubscriptionError> {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(closed());
        }
        self.unlink_channels(&mut inner);
        Ok(())
    }

    /// Закрывает подписку. Повторный вызов вернёт ошибку.
    pub fn close(&self) -> Result<(), SubscriptionError> {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(closed());
        }
        self.unwind(&mut inner);
        Ok(())
    }

    /// Снимок текущего набора каналов.
    pub fn channels(&self) -> Vec<String> {
        self.inner
            .lock()
            .channels
            .keys()
            .map(|k| k.to_string())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn unlink_channels(
        &self,
        inner: &mut ChannelInner,
    ) {
        for (channel, id) in inner.channels.drain() {
            self.mux.remove_listener(TopicKind::Channel, &channel, id);
        }
    }

    fn unwind(
        &self,
        inner: &mut ChannelInner,
    ) {
        self.unlink_channels(inner);
        self.mux.remove_disconnect(inner.disconnect);
        inner.closed = true;
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if !inner.closed {
            self.unwind(&mut inner);
        }
    }
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ChannelSubscription")
            .field("channels", &inner.channels.keys().collect::<Vec<_>>())
            .field("closed", &inner.closed)
            .finish()
    }
}

fn closed() -> SubscriptionError {
    SubscriptionError::Closed { entity: ENTITY }
}
