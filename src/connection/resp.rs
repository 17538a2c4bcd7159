//! Минимальный кодек RESP2 для pub/sub соединения.
//!
//! Команды кодируются массивом bulk-строк. Декодер работает поверх
//! `BytesMut`: пока фрейм не пришёл целиком, буфер не трогается и
//! возвращается `Ok(None)`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{error::ProtocolError, mpx::PubSubCommand};

/// Максимальная длина строки заголовка (64kb).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;
/// Максимальный размер BulkString (512mb).
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;
/// Максимальная вложенность массивов (32 уровня).
pub const MAX_ARRAY_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespFrame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<RespFrame>>),
}

impl RespFrame {
    /// Содержимое строкового фрейма (simple или bulk).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Simple(s) => Some(s.as_bytes()),
            Self::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }
}

/// Кодирует команду как массив bulk-строк.
pub fn encode_command<A: AsRef<[u8]>>(
    args: &[A],
    dst: &mut BytesMut,
) {
    dst.put_u8(b'*');
    dst.put_slice(args.len().to_string().as_bytes());
    dst.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        dst.put_u8(b'$');
        dst.put_slice(arg.len().to_string().as_bytes());
        dst.put_slice(b"\r\n");
        dst.put_slice(arg);
        dst.put_slice(b"\r\n");
    }
}

/// Кодирует pub/sub команду.
///
/// Команды (от)подписки без аргументов не пишутся: `UNSUBSCRIBE` без
/// аргументов снял бы все подписки соединения.
pub fn encode_pubsub(
    command: &PubSubCommand,
    dst: &mut BytesMut,
) {
    if let PubSubCommand::Quit = command {
        encode_command(&[command.name()], dst);
        return;
    }
    if command.args().is_empty() {
        return;
    }

    let mut args: Vec<&[u8]> = Vec::with_capacity(command.args().len() + 1);
    args.push(command.name().as_bytes());
    args.extend(command.args().iter().map(|a| a.as_bytes()));
    encode_command(&args, dst);
}

/// Пытается извлечь из буфера один полный фрейм.
pub fn decode(buf: &mut BytesMut) -> Result<Option<RespFrame>, ProtocolError> {
    let mut pos = 0;
    match parse(&buf[..], &mut pos, 0)? {
        Some(frame) => {
            buf.advance(pos);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

fn parse(
    src: &[u8],
    pos: &mut usize,
    depth: usize,
) -> Result<Option<RespFrame>, ProtocolError> {
    let Some(&tag) = src.get(*pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(src, *pos + 1)? else {
        return Ok(None);
    };

    let frame = match tag {
        b'+' => RespFrame::Simple(String::from_utf8_lossy(line).into_owned()),
        b'-' => RespFrame::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => RespFrame::Integer(parse_int(line)?),
        b'$' => {
            let len = parse_int(line)?;
            if len == -1 {
                *pos = next;
                return Ok(Some(RespFrame::Bulk(None)));
            }
            let len = checked_len(len)?;
            if len > MAX_BULK_LENGTH {
                return Err(ProtocolError::BulkTooLong {
                    len,
                    max: MAX_BULK_LENGTH,
                });
            }
            let end = next + len;
            if src.len() < end + 2 {
                return Ok(None);
            }
            if &src[end..end + 2] != b"\r\n" {
                return Err(ProtocolError::MissingCrlf);
            }
            *pos = end + 2;
            return Ok(Some(RespFrame::Bulk(Some(Bytes::copy_from_slice(
                &src[next..end],
            )))));
        }
        b'*' => {
            let count = parse_int(line)?;
            if count == -1 {
                *pos = next;
                return Ok(Some(RespFrame::Array(None)));
            }
            let count = checked_len(count)?;
            if depth + 1 > MAX_ARRAY_DEPTH {
                return Err(ProtocolError::DepthExceeded(MAX_ARRAY_DEPTH));
            }

            let mut cursor = next;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                match parse(src, &mut cursor, depth + 1)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            *pos = cursor;
            return Ok(Some(RespFrame::Array(Some(items))));
        }
        other => return Err(ProtocolError::UnknownType(other)),
    };

    *pos = next;
    Ok(Some(frame))
}

/// Возвращает содержимое строки до CRLF и позицию за ним.
fn read_line(
    src: &[u8],
    start: usize,
) -> Result<Option<(&[u8], usize)>, ProtocolError> {
    let rest = src.get(start..).unwrap_or_default();
    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(idx) => Ok(Some((&rest[..idx], start + idx + 2))),
        None if rest.len() > MAX_LINE_LENGTH => {
            Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH))
        }
        None => Ok(None),
    }
}

fn parse_int(line: &[u8]) -> Result<i64, ProtocolError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ProtocolError::InvalidInteger)
}

fn checked_len(len: i64) -> Result<usize, ProtocolError> {
    usize::try_from(len).map_err(|_| ProtocolError::InvalidLength(len))
}
