//! Wire protocol.
//!
//! Every message travels as a versioned envelope, JSON encoded and prefixed by
//! its length as a big-endian `u32`:
//!
//! ```text
//! [len: u32 BE][{"version":1,"message":{"type":"move","payload":{"column":3}}}]
//! ```
//!
//! `type` is the kebab-case tag of a [`ClientMessage`] or [`ServerMessage`]
//! variant and `payload` its fields (absent for variants without any). A frame
//! whose payload does not match its tag, or whose version is not
//! [`PROTOCOL_VERSION`], is rejected as a [`ProtocolError`] instead of being
//! guessed at.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ai::AiKind;
use crate::error::{ProtocolError, ReceiveError, TransportError};
use crate::game::Color;

pub const PROTOCOL_VERSION: u16 = 1;

/// Client -> server vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    MultiplayerRequest,
    SingleplayerRequest { ai: AiKind },
    Move { column: i64 },
    Text { text: String },
    Leave,
    Disconnect,
    RematchResponse { accept: bool },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::Move { .. } => MessageKind::Move,
            ClientMessage::Text { .. } => MessageKind::Text,
            _ => MessageKind::Control,
        }
    }
}

/// Server -> client vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    Waiting,
    GameStarted,
    Color { color: Color },
    Scores { red: u32, yellow: u32 },
    Move { column: usize },
    Text { text: String },
    YourTurn { color: Color },
    GameOver { winner: Option<Color> },
    SessionEnded,
    OpponentDisconnected,
    ServerStopped,
}

/// Routing class of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Goes to the session's move queue.
    Move,
    /// Goes to the chat relay toward the opponent.
    Text,
    /// join / leave / disconnect / rematch, handled by the session manager.
    Control,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u16,
    message: T,
}

/// Encode `message` into a versioned envelope body (without length prefix).
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(&Envelope {
        version: PROTOCOL_VERSION,
        message,
    })?)
}

/// Decode an envelope body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    #[derive(Deserialize)]
    struct Version {
        version: u16,
    }

    let Version { version } = serde_json::from_slice(body)?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    Ok(envelope.message)
}

/// Write one length-prefixed frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8], max_len: usize) -> Result<(), TransportError> {
    if body.len() > max_len {
        return Err(TransportError::FrameTooLarge {
            len: body.len(),
            max: max_len,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| TransportError::FrameTooLarge {
        len: body.len(),
        max: max_len,
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// `Ok(None)` means the peer closed the stream cleanly between two frames.
/// End of stream inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, TransportError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Read and decode one message. See [`read_frame`] for `Ok(None)`.
pub fn read_message<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<T>, ReceiveError> {
    match read_frame(reader, max_len)? {
        Some(body) => Ok(Some(decode(&body)?)),
        None => Ok(None),
    }
}

/// Encode and write one message.
pub fn write_message<W: Write, T: Serialize>(
    writer: &mut W,
    message: &T,
    max_len: usize,
) -> Result<(), TransportError> {
    let body = encode(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_frame(writer, &body, max_len)
}
