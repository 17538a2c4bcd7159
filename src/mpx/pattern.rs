use std::sync::Arc;

use mpx_error::SubscriptionError;
use parking_lot::Mutex;
use tracing::trace;

use super::{multiplexer::MuxShared, topics::TopicKind, Handlers};
use crate::registry::NodeId;

struct PatternInner {
    listener: NodeId,
    disconnect: NodeId,
    closed: bool,
}

/// Подписка на один шаблон на всё время жизни.
///
/// Обработчику сообщений передаётся литеральное имя канала, совпавшего с
/// шаблоном, а не сам шаблон.
pub struct PatternSubscription {
    mux: Arc<MuxShared>,
    pattern: String,
    inner: Mutex<PatternInner>,
}

impl PatternSubscription {
    pub(crate) fn new(
        mux: Arc<MuxShared>,
        pattern: &str,
        handlers: Handlers,
    ) -> Self {
        let (listener, disconnect) = {
            let _gate = mux.gate();
            let disconnect = mux.add_disconnect(handlers.on_disconnect.clone());
            let (listener, activation) =
                mux.add_listener(TopicKind::Pattern, pattern, handlers.listener());

            if let Some(on_activation) = activation {
                trace!(pattern, "Pattern already active, activating late joiner");
                on_activation(pattern);
            }
            (listener, disconnect)
        };

        Self {
            pattern: pattern.to_string(),
            inner: Mutex::new(PatternInner {
                listener,
                disconnect,
                closed: false,
            }),
            mux,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Снимает подписку. Повторный вызов вернёт ошибку.
    pub fn close(&self) -> Result<(), SubscriptionError> {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SubscriptionError::Closed {
                entity: "pattern subscription",
            });
        }
        self.unwind(&mut inner);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn unwind(
        &self,
        inner: &mut PatternInner,
    ) {
        self.mux
            .remove_listener(TopicKind::Pattern, &self.pattern, inner.listener);
        self.mux.remove_disconnect(inner.disconnect);
        inner.closed = true;
    }
}

impl Drop for PatternSubscription {
    fn drop(&mut self) {
        let _gate = self.mux.gate();
        let mut inner = self.inner.lock();
        if !inner.closed {
            self.unwind(&mut inner);
        }
    }
}

impl std::fmt::Debug for PatternSubscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PatternSubscription")
            .field("pattern", &self.pattern)
            .field("closed", &self.inner.lock().closed)
            .finish()
    }
}
