//! Мультиплексор подписок.
//!
//! - `multiplexer`: общее соединение, реестры каналов и шаблонов, машина
//!   состояний соединения.
//! - `channel`: подписка на динамический набор каналов.
//! - `pattern`: подписка на один шаблон.
//! - `rendezvous`: ожидание одного сообщения с таймаутом.
//! - `event`: события соединения, команды брокеру и трейт `BrokerLink`.
//! - `handlers`: набор пользовательских обработчиков.

pub mod channel;
pub mod event;
pub mod handlers;
pub mod multiplexer;
pub mod pattern;
pub mod rendezvous;
mod topics;

pub use channel::ChannelSubscription;
pub use event::{BrokerLink, ConnectionEvent, PubSubCommand};
pub use handlers::{ActivationFn, DisconnectFn, Handlers, MessageFn};
pub(crate) use handlers::Listener;
pub use multiplexer::{ConnectionState, Multiplexer};
pub use pattern::PatternSubscription;
pub use rendezvous::{ActivationWait, Rendezvous, RendezvousSubscription};
