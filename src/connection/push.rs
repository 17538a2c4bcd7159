use bytes::Bytes;
use tracing::{trace, warn};

use super::resp::RespFrame;
use crate::{error::ProtocolError, mpx::ConnectionEvent};

/// Переводит фрейм pub/sub соединения в событие мультиплексора.
///
/// Ответы, не несущие событий (`+OK` на `QUIT`, `pong`), дают `Ok(None)`.
/// Ошибки брокера логируются и тоже не порождают событий.
pub fn into_event(frame: RespFrame) -> Result<Option<ConnectionEvent>, ProtocolError> {
    let items = match frame {
        RespFrame::Array(Some(items)) => items,
        RespFrame::Simple(reply) => {
            trace!(%reply, "Status reply");
            return Ok(None);
        }
        RespFrame::Error(message) => {
            warn!(%message, "Broker returned an error");
            return Ok(None);
        }
        other => return Err(ProtocolError::UnexpectedFrame(format!("{other:?}"))),
    };

    let mut items = items.into_iter();
    let kind = items
        .next()
        .as_ref()
        .and_then(RespFrame::as_bytes)
        .map(std::str::from_utf8)
        .transpose()
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ProtocolError::UnexpectedFrame("empty push frame".to_string()))?;

    let event = match kind.as_str() {
        "pong" => return Ok(None),
        "subscribe" | "unsubscribe" | "psubscribe" | "punsubscribe" | "message" | "pmessage" => {
            match decode(&kind, items) {
                Ok(event) => event,
                Err(raw) => {
                    warn!(kind = %kind, name = ?raw, "Channel name is not valid UTF-8, frame skipped");
                    return Ok(None);
                }
            }
        }
        other => return Err(ProtocolError::UnexpectedFrame(other.to_string())),
    };

    match event {
        Some(event) => Ok(Some(event)),
        // UNSUBSCRIBE без активных подписок приходит с null вместо канала.
        None if kind.ends_with("unsubscribe") => Ok(None),
        None => Err(ProtocolError::UnexpectedFrame(format!(
            "malformed {kind} frame"
        ))),
    }
}

/// Собирает событие из элементов push-фрейма известного вида.
///
/// `Err` несёт сырое имя канала или шаблона, не являющееся UTF-8.
fn decode(
    kind: &str,
    mut items: impl Iterator<Item = RespFrame>,
) -> Result<Option<ConnectionEvent>, Bytes> {
    let event = match kind {
        "subscribe" => text(items.next())?.map(ConnectionEvent::Subscribed),
        "unsubscribe" => text(items.next())?.map(ConnectionEvent::Unsubscribed),
        "psubscribe" => text(items.next())?.map(ConnectionEvent::PSubscribed),
        "punsubscribe" => text(items.next())?.map(ConnectionEvent::PUnsubscribed),
        "message" => {
            let channel = text(items.next())?;
            let payload = bytes(items.next());
            channel
                .zip(payload)
                .map(|(channel, payload)| ConnectionEvent::Message { channel, payload })
        }
        _ => {
            let pattern = text(items.next())?;
            let channel = text(items.next())?;
            let payload = bytes(items.next());
            match (pattern, channel, payload) {
                (Some(pattern), Some(channel), Some(payload)) => Some(ConnectionEvent::PMessage {
                    pattern,
                    channel,
                    payload,
                }),
                _ => None,
            }
        }
    };
    Ok(event)
}

fn text(frame: Option<RespFrame>) -> Result<Option<String>, Bytes> {
    match frame.as_ref().and_then(RespFrame::as_bytes) {
        Some(raw) => std::str::from_utf8(raw)
            .map(|name| Some(name.to_owned()))
            .map_err(|_| Bytes::copy_from_slice(raw)),
        None => Ok(None),
    }
}

fn bytes(frame: Option<RespFrame>) -> Option<Bytes> {
    match frame? {
        RespFrame::Bulk(Some(b)) => Some(b),
        RespFrame::Simple(s) => Some(Bytes::from(s)),
        _ => None,
    }
}
