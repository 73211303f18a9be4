//! TCP transfer state machines: [`server`] drives the receive side,
//! [`client`] drives the send side. Both speak the framed [`crate::codec`]
//! messages for metadata and raw, unframed bytes for file contents.

pub mod client;
pub mod server;

use crate::codec::CodecError;
use socket2::SockRef;
use std::net::TcpStream;
use thiserror::Error;

/// Chunk size used when streaming raw file bytes over the connection.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Socket buffer size applied to every accepted/dialed transfer connection.
const SOCKET_BUFFER_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: &'static str },

    #[error("path is invalid: {path}")]
    PathIsInvalid { path: String },

    #[error("checksum mismatch for file {id}: expected {expected}, got {actual}")]
    ChecksumMismatch { id: String, expected: String, actual: String },

    #[error("peer rejected the transfer")]
    TransferRejected,

    #[error("connection closed unexpectedly")]
    ConnectionClosed,
}

/// Applies the socket tuning spec.md asks for on every transfer connection:
/// `TCP_NODELAY` and 2 MiB send/receive buffers.
pub fn tune_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock_ref = SockRef::from(stream);
    sock_ref.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
    sock_ref.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
    Ok(())
}

/// Lowercase hex encoding of a digest, used for `file_complete.checksum`.
pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
