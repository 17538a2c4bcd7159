//! Мультиплексор подписок поверх одного pub/sub соединения.
//!
//! Множество независимых подписчиков делят одно соединение с брокером:
//! на каждый уникальный канал или шаблон брокеру уходит одна команда
//! подписки и одна отписки, а обрыв соединения переживается прозрачно.

/// In-process loopback broker.
pub mod broker;
/// Settings loading and validation.
pub mod config;
/// Redis connection: RESP codec, push frames, reconnecting task.
pub mod connection;
/// Error types and re-exports from `mpx-error`.
pub mod error;
/// Logging setup (filters, formats, file sink).
pub mod logging;
/// Multiplexer, subscriptions and rendezvous.
pub mod mpx;
/// Arena-backed intrusive list.
pub mod registry;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// In-memory broker.
pub use broker::MemoryBroker;
/// Settings.
pub use config::Settings;
/// Broker connection.
pub use connection::{ConnectionConfig, RedisConnection};
/// Errors and result types.
pub use error::{ConnectionError, MpxResult, ProtocolError, StackError, SubscriptionError};
/// Multiplexer API.
pub use mpx::{
    ActivationWait, BrokerLink, ChannelSubscription, ConnectionEvent, ConnectionState, Handlers,
    Multiplexer, PatternSubscription, PubSubCommand, Rendezvous, RendezvousSubscription,
};
