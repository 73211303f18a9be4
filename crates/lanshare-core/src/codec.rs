//! Length-prefixed JSON message framing.
//!
//! Wire format: a 4-byte big-endian unsigned length, followed by exactly
//! that many bytes of UTF-8 JSON. The JSON body is a single-key object
//! naming the [`Message`] variant, whose value is the payload (an empty
//! object for `transfer_complete` and `ack`).
//!
//! File payloads are never framed this way — they're raw bytes streamed
//! directly over the connection after a `file_header` (see
//! `crate::transfer`). This codec only ever sees metadata, which is why
//! the frame size cap below is small relative to the files being moved.

use crate::types::{
    AnnouncePayload, FileComplete, FileHeader, Message, TransferOffer, TransferResponse,
};
use serde_json::{json, Value};
use std::io::{Read, Write};
use thiserror::Error;

/// Maximum JSON body size, in bytes. Message bodies only ever carry
/// metadata (announce, offer, headers, checksums); this cap prevents a
/// hostile peer from forcing unbounded allocation during framing.
pub const MAX_MESSAGE_SIZE: u32 = 1_048_576;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    MessageTooLarge { size: u32 },

    #[error("malformed message envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown message variant: {0}")]
    UnknownVariant(String),
}

fn to_value(msg: &Message) -> Result<Value, CodecError> {
    let payload = match msg {
        Message::Announce(p) => serde_json::to_value(p)?,
        Message::TransferOffer(p) => serde_json::to_value(p)?,
        Message::TransferResponse(p) => serde_json::to_value(p)?,
        Message::FileHeader(p) => serde_json::to_value(p)?,
        Message::FileComplete(p) => serde_json::to_value(p)?,
        Message::TransferComplete | Message::Ack => json!({}),
    };
    Ok(json!({ msg.variant_name(): payload }))
}

fn from_value(value: Value) -> Result<Message, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::MalformedEnvelope("expected a JSON object".to_string()))?;
    if obj.len() != 1 {
        return Err(CodecError::MalformedEnvelope(format!(
            "expected exactly one top-level key, got {}",
            obj.len()
        )));
    }
    // `obj.len() == 1` guarantees this iterator yields exactly once.
    let (key, payload) = obj.iter().next().unwrap();
    let payload = payload.clone();

    Ok(match key.as_str() {
        "announce" => Message::Announce(serde_json::from_value::<AnnouncePayload>(payload)?),
        "transfer_offer" => {
            Message::TransferOffer(serde_json::from_value::<TransferOffer>(payload)?)
        }
        "transfer_response" => {
            Message::TransferResponse(serde_json::from_value::<TransferResponse>(payload)?)
        }
        "file_header" => Message::FileHeader(serde_json::from_value::<FileHeader>(payload)?),
        "file_complete" => Message::FileComplete(serde_json::from_value::<FileComplete>(payload)?),
        // `transfer_complete` may carry `{}` or `null`; both mean "no payload".
        "transfer_complete" => Message::TransferComplete,
        "ack" => Message::Ack,
        other => return Err(CodecError::UnknownVariant(other.to_string())),
    })
}

/// Serializes `msg` to length-prefixed JSON bytes: 4 big-endian length
/// bytes, then the JSON body. Does not write to a stream; see
/// [`write_message`] for that.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(&to_value(msg)?)?;
    let len =
        u32::try_from(body.len()).map_err(|_| CodecError::MessageTooLarge { size: u32::MAX })?;
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge { size: len });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Parses a `Message` from a JSON body (no length prefix). Used after the
/// length prefix and body bytes have already been read separately.
pub fn decode(body: &[u8]) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_slice(body)?;
    from_value(value)
}

/// Writes a length-prefixed message to a blocking stream and flushes it.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<(), CodecError> {
    let frame = encode(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed message from a blocking stream.
///
/// A short read on the 4-byte length prefix (including a clean EOF before
/// any bytes arrive) surfaces as [`CodecError::Io`] — the caller treats any
/// read failure here as a fatal, connection-ending error.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, CodecError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);

    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge { size: len });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    decode(&body)
}
