//! Rendezvous: ожидание одного конкретного сообщения с таймаутом.
//!
//! `RendezvousSubscription` держит одну подписку на шаблон `prefix*` и
//! раздаёт ожидания на отдельные каналы `prefix + suffix`. Первое сообщение в
//! канале разрешает все ожидания этого канала одним и тем же payload.
//! Каждое ожидание имеет собственный таймер; истечение таймера отклоняет
//! только своё ожидание.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use mpx_error::SubscriptionError;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, trace};

use super::{multiplexer::MuxShared, Handlers, PatternSubscription};
use crate::registry::{NodeId, Registry};

const ENTITY: &str = "rendezvous subscription";

type MessageResult = Result<Bytes, SubscriptionError>;
type ActivationResult = Result<(), SubscriptionError>;

struct Waiter {
    tx: oneshot::Sender<MessageResult>,
    timer: Option<AbortHandle>,
}

impl Waiter {
    fn settle(
        self,
        result: MessageResult,
    ) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        let _ = self.tx.send(result);
    }
}

#[derive(Default)]
struct RendezvousState {
    active: bool,
    closed: bool,
    channels: FxHashMap<String, Registry<Waiter>>,
    activation_waiters: Registry<oneshot::Sender<ActivationResult>>,
}

struct RendezvousShared {
    prefix: String,
    state: Mutex<RendezvousState>,
}

impl RendezvousShared {
    fn state(&self) -> MutexGuard<'_, RendezvousState> {
        self.state.lock()
    }

    fn inactive(&self) -> SubscriptionError {
        SubscriptionError::Inactive {
            prefix: self.prefix.clone(),
        }
    }

    fn on_message(
        &self,
        channel: &str,
        payload: &Bytes,
    ) {
        let waiters = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.channels.remove(channel)
        };

        if let Some(mut waiters) = waiters {
            trace!(channel, waiters = waiters.len(), "Rendezvous resolved");
            for waiter in waiters.drain() {
                waiter.settle(Ok(payload.clone()));
            }
        }
    }

    fn on_activation(&self) {
        let waiters = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.active = true;
            state.activation_waiters.drain()
        };
        debug!(prefix = %self.prefix, "Rendezvous subscription active");

        for tx in waiters {
            let _ = tx.send(Ok(()));
        }
    }

    fn on_disconnect(&self) {
        let channels = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.active = false;
            std::mem::take(&mut state.channels)
        };
        debug!(
            prefix = %self.prefix,
            channels = channels.len(),
            "Rendezvous subscription inactive"
        );

        for (_, mut waiters) in channels {
            for waiter in waiters.drain() {
                waiter.settle(Err(self.inactive()));
            }
        }
    }

    /// Срабатывание таймера: отклоняет только своё ожидание.
    fn expire(
        &self,
        channel: &str,
        id: NodeId,
        timeout: Duration,
    ) {
        let Some(waiter) = self.unlink(channel, id) else {
            return;
        };
        trace!(channel, "Rendezvous timed out");
        let _ = waiter.tx.send(Err(SubscriptionError::Timeout {
            channel: channel.to_string(),
            timeout_ms: millis(timeout),
        }));
    }

    /// Отмена ожидания, чей future был удалён.
    fn cancel(
        &self,
        channel: &str,
        id: NodeId,
    ) {
        if let Some(waiter) = self.unlink(channel, id) {
            if let Some(timer) = waiter.timer {
                timer.abort();
            }
        }
    }

    fn unlink(
        &self,
        channel: &str,
        id: NodeId,
    ) -> Option<Waiter> {
        let mut state = self.state();
        let waiters = state.channels.get_mut(channel)?;
        let waiter = waiters.remove(id)?;
        if waiters.is_empty() {
            state.channels.remove(channel);
        }
        Some(waiter)
    }
}

/// Подписка для ожидания отдельных сообщений в каналах `prefix*`.
pub struct RendezvousSubscription {
    shared: Arc<RendezvousShared>,
    pattern: PatternSubscription,
}

impl RendezvousSubscription {
    pub(crate) fn new(
        mux: Arc<MuxShared>,
        prefix: &str,
    ) -> Self {
        let shared = Arc::new(RendezvousShared {
            prefix: prefix.to_string(),
            state: Mutex::new(RendezvousState::default()),
        });

        let on_message = Arc::downgrade(&shared);
        let on_activation = Arc::downgrade(&shared);
        let on_disconnect = Arc::downgrade(&shared);
        let handlers = Handlers::new(move |channel, payload| {
            if let Some(shared) = on_message.upgrade() {
                shared.on_message(channel, payload);
            }
        })
        .on_activation(move |_| {
            if let Some(shared) = on_activation.upgrade() {
                shared.on_activation();
            }
        })
        .on_disconnect(move || {
            if let Some(shared) = on_disconnect.upgrade() {
                shared.on_disconnect();
            }
        });

        let pattern = PatternSubscription::new(mux, &format!("{prefix}*"), handlers);
        Self { shared, pattern }
    }

    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    /// Подтвердил ли брокер шаблон в текущем соединении.
    pub fn is_active(&self) -> bool {
        self.shared.state().active
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    /// Число ожиданий, ещё не получивших результата.
    pub fn pending(&self) -> usize {
        self.shared
            .state()
            .channels
            .values()
            .map(Registry::len)
            .sum()
    }

    /// Ожидание активации шаблона.
    ///
    /// Если подписка уже активна, future готов сразу. Иначе ожидание
    /// регистрируется в момент вызова и разрешается ближайшей активацией.
    pub fn wait_for_activation(&self) -> Result<ActivationWait, SubscriptionError> {
        let mut state = self.shared.state();
        if state.closed {
            return Err(closed());
        }
        if state.active {
            return Ok(ActivationWait { rx: None });
        }

        let (tx, rx) = oneshot::channel();
        state.activation_waiters.prepend(tx);
        Ok(ActivationWait { rx: Some(rx) })
    }

    /// Начинает ожидание сообщения в канале `prefix + suffix`.
    ///
    /// Требует активной подписки: до активации (и после потери соединения)
    /// возвращает [`SubscriptionError::Inactive`], ничего не ставя в очередь.
    /// Должен вызываться внутри tokio runtime.
    pub fn new_rendezvous(
        &self,
        suffix: &str,
        timeout: Duration,
    ) -> Result<Rendezvous, SubscriptionError> {
        let channel = format!("{}{}", self.shared.prefix, suffix);
        let (tx, rx) = oneshot::channel();

        let mut state = self.shared.state();
        if state.closed {
            return Err(closed());
        }
        if !state.active {
            return Err(self.shared.inactive());
        }

        let waiters = state.channels.entry(channel.clone()).or_default();
        let id = waiters.prepend(Waiter { tx, timer: None });

        let weak = Arc::downgrade(&self.shared);
        let timer_channel = channel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(&timer_channel, id, timeout);
            }
        });
        if let Some(waiter) = waiters.get_mut(id) {
            waiter.timer = Some(timer.abort_handle());
        }
        drop(state);

        trace!(%channel, ?timeout, "Rendezvous armed");
        Ok(Rendezvous {
            channel,
            id,
            rx,
            shared: Arc::downgrade(&self.shared),
            done: false,
        })
    }

    /// Дожидается активации и затем одного сообщения в канале
    /// `prefix + suffix`.
    ///
    /// Таймаут отсчитывается от момента активации. Если соединение пропадёт
    /// между активацией и регистрацией ожидания, вернётся
    /// [`SubscriptionError::Inactive`].
    pub async fn wait_and_rendezvous(
        &self,
        suffix: &str,
        timeout: Duration,
    ) -> Result<Bytes, SubscriptionError> {
        self.wait_for_activation()?.await?;
        self.new_rendezvous(suffix, timeout)?.await
    }

    /// Закрывает подписку: отклоняет все ожидания и снимает шаблон.
    /// Повторный вызов вернёт ошибку.
    pub fn close(&self) -> Result<(), SubscriptionError> {
        let (channels, mut activation_waiters) = {
            let mut state = self.shared.state();
            if state.closed {
                return Err(closed());
            }
            state.closed = true;
            state.active = false;
            (
                std::mem::take(&mut state.channels),
                std::mem::take(&mut state.activation_waiters),
            )
        };
        debug!(prefix = %self.shared.prefix, "Closing rendezvous subscription");

        for (_, mut waiters) in channels {
            for waiter in waiters.drain() {
                waiter.settle(Err(closed()));
            }
        }
        self.pattern.close()?;
        for tx in activation_waiters.drain() {
            let _ = tx.send(Err(closed()));
        }
        Ok(())
    }
}

impl Drop for RendezvousSubscription {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for RendezvousSubscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("RendezvousSubscription")
            .field("prefix", &self.shared.prefix)
            .field("active", &state.active)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Future одного ожидания rendezvous.
///
/// Разрешается payload'ом первого сообщения в канале, либо ошибкой таймаута,
/// потери активности или закрытия подписки. Удаление незавершённого future
/// отменяет ожидание и его таймер.
#[must_use = "a rendezvous does nothing unless awaited"]
pub struct Rendezvous {
    channel: String,
    id: NodeId,
    rx: oneshot::Receiver<MessageResult>,
    shared: Weak<RendezvousShared>,
    done: bool,
}

impl Rendezvous {
    /// Полное имя ожидаемого канала.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Future for Rendezvous {
    type Output = MessageResult;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => {
                self.done = true;
                Poll::Ready(result.unwrap_or_else(|_| Err(closed())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Rendezvous {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel(&self.channel, self.id);
        }
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("channel", &self.channel)
            .field("done", &self.done)
            .finish()
    }
}

/// Future ожидания активации rendezvous-подписки.
#[must_use = "an activation wait does nothing unless awaited"]
#[derive(Debug)]
pub struct ActivationWait {
    rx: Option<oneshot::Receiver<ActivationResult>>,
}

impl Future for ActivationWait {
    type Output = ActivationResult;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(Ok(())),
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or_else(|_| Err(closed()))),
        }
    }
}

fn closed() -> SubscriptionError {
    SubscriptionError::Closed { entity: ENTITY }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
