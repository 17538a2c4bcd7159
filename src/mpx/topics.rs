use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{handlers::ActivationFn, Listener, PubSubCommand};
use crate::registry::{NodeId, Registry};

/// Вид ключа: литеральный канал или шаблон.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopicKind {
    Channel,
    Pattern,
}

impl TopicKind {
    pub(crate) fn subscribe(
        self,
        keys: Vec<String>,
    ) -> PubSubCommand {
        match self {
            Self::Channel => PubSubCommand::Subscribe(keys),
            Self::Pattern => PubSubCommand::PSubscribe(keys),
        }
    }

    pub(crate) fn unsubscribe(
        self,
        keys: Vec<String>,
    ) -> PubSubCommand {
        match self {
            Self::Channel => PubSubCommand::Unsubscribe(keys),
            Self::Pattern => PubSubCommand::PUnsubscribe(keys),
        }
    }
}

impl std::fmt::Display for TopicKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// Результат регистрации слушателя.
pub(crate) struct Registration {
    pub(crate) id: NodeId,
    /// Первый слушатель ключа: нужна физическая подписка.
    pub(crate) created: bool,
    /// Ключ уже активен: обработчик надо вызвать сразу.
    pub(crate) activation: Option<ActivationFn>,
}

/// Реестры слушателей по ключу и множество подтверждённых брокером ключей.
///
/// Инварианты:
/// - ключ присутствует в `registries` тогда и только тогда, когда его реестр
///   не пуст;
/// - `active` ⊆ ключей `registries`.
#[derive(Default)]
pub(crate) struct Topics {
    registries: FxHashMap<Arc<str>, Registry<Listener>>,
    active: FxHashSet<Arc<str>>,
}

impl Topics {
    pub(crate) fn register(
        &mut self,
        key: &str,
        listener: Listener,
    ) -> Registration {
        let activation = if self.active.contains(key) {
            listener.on_activation.clone()
        } else {
            None
        };

        let (id, created) = match self.registries.get_mut(key) {
            Some(registry) => (registry.prepend(listener), false),
            None => {
                let mut registry = Registry::new();
                let id = registry.prepend(listener);
                self.registries.insert(Arc::from(key), registry);
                (id, true)
            }
        };

        Registration {
            id,
            created,
            activation,
        }
    }

    /// Отсоединяет слушателя. Возвращает `true`, если реестр ключа опустел
    /// и был уничтожен.
    pub(crate) fn unregister(
        &mut self,
        key: &str,
        id: NodeId,
    ) -> bool {
        let Some(registry) = self.registries.get_mut(key) else {
            return false;
        };
        if registry.remove(id).is_none() || !registry.is_empty() {
            return false;
        }

        self.registries.remove(key);
        self.active.remove(key);
        true
    }

    pub(crate) fn is_linked(
        &self,
        key: &str,
        id: NodeId,
    ) -> bool {
        self.registries
            .get(key)
            .is_some_and(|registry| registry.contains(id))
    }

    /// Снимок слушателей ключа в порядке реестра.
    pub(crate) fn snapshot(
        &self,
        key: &str,
    ) -> Vec<(NodeId, Listener)> {
        self.registries
            .get(key)
            .map(|registry| {
                registry
                    .iter()
                    .map(|(id, listener)| (id, listener.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Помечает ключ активным, если у него есть слушатели.
    pub(crate) fn activate(
        &mut self,
        key: &str,
    ) -> bool {
        match self.registries.get_key_value(key) {
            Some((k, _)) => {
                self.active.insert(k.clone());
                true
            }
            None => false,
        }
    }

    pub(crate) fn deactivate_all(&mut self) {
        self.active.clear();
    }

    pub(crate) fn is_active(
        &self,
        key: &str,
    ) -> bool {
        self.active.contains(key)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.registries.keys().map(|k| k.to_string()).collect()
    }

    pub(crate) fn listener_count(
        &self,
        key: &str,
    ) -> usize {
        self.registries.get(key).map_or(0, Registry::len)
    }
}
