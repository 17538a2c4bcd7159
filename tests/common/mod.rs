//! Общие помощники интеграционных тестов мультиплексора.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use zumic_mpx::{BrokerLink, ConnectionEvent, Handlers, Multiplexer, PubSubCommand};

/// Связь с брокером, которая только запоминает команды.
#[derive(Clone, Default)]
pub struct RecordingLink {
    commands: Arc<Mutex<Vec<PubSubCommand>>>,
}

impl RecordingLink {
    /// Забирает накопленные команды.
    pub fn take(&self) -> Vec<PubSubCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl BrokerLink for RecordingLink {
    fn send(
        &self,
        command: PubSubCommand,
    ) {
        self.commands.lock().push(command);
    }
}

/// Мультиплексор поверх записывающей связи, уже в состоянии `Connected`.
pub fn connected_mux() -> (Multiplexer, RecordingLink) {
    let link = RecordingLink::default();
    let mux = Multiplexer::new(Arc::new(link.clone()));
    mux.handle_event(ConnectionEvent::Connected);
    (mux, link)
}

/// Журнал вызовов обработчиков.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn push(
        &self,
        entry: impl Into<String>,
    ) {
        self.entries.lock().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Обработчики, пишущие в журнал с меткой `tag`.
    pub fn handlers(
        &self,
        tag: &'static str,
    ) -> Handlers {
        let on_message = self.clone();
        let on_activation = self.clone();
        let on_disconnect = self.clone();
        Handlers::new(move |channel, payload| {
            on_message.push(format!(
                "{tag}:message:{channel}:{}",
                String::from_utf8_lossy(payload)
            ))
        })
        .on_activation(move |key| on_activation.push(format!("{tag}:activation:{key}")))
        .on_disconnect(move || on_disconnect.push(format!("{tag}:disconnect")))
    }
}

pub fn message(
    channel: &str,
    payload: &'static str,
) -> ConnectionEvent {
    ConnectionEvent::Message {
        channel: channel.to_string(),
        payload: Bytes::from_static(payload.as_bytes()),
    }
}

pub fn pmessage(
    pattern: &str,
    channel: &str,
    payload: &'static str,
) -> ConnectionEvent {
    ConnectionEvent::PMessage {
        pattern: pattern.to_string(),
        channel: channel.to_string(),
        payload: Bytes::from_static(payload.as_bytes()),
    }
}

pub fn subscribe(keys: &[&str]) -> PubSubCommand {
    PubSubCommand::Subscribe(keys.iter().map(|k| k.to_string()).collect())
}

pub fn unsubscribe(keys: &[&str]) -> PubSubCommand {
    PubSubCommand::Unsubscribe(keys.iter().map(|k| k.to_string()).collect())
}

pub fn psubscribe(keys: &[&str]) -> PubSubCommand {
    PubSubCommand::PSubscribe(keys.iter().map(|k| k.to_string()).collect())
}

pub fn punsubscribe(keys: &[&str]) -> PubSubCommand {
    PubSubCommand::PUnsubscribe(keys.iter().map(|k| k.to_string()).collect())
}
