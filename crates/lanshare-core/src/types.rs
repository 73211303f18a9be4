//! Domain types for lanshare.
//!
//! These mirror the wire-level shapes directly: a `Peer` (discovery-table
//! entry), a `FileEntry` (send-side input), a `FileInfo` (the wire
//! representation of one file within a transfer offer), and the `Message`
//! tagged union spoken between peers over TCP.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A peer known to the local discovery table.
///
/// `device_id` is the table's unique key: re-announcing the same
/// `device_id` overwrites every other field and refreshes `last_active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub device_id: String,
    pub alias: String,
    pub address: String,
    pub port: u16,
    /// Seconds since the Unix epoch of the most recent announce reception.
    pub last_active: u64,
}

/// A file selected for sending, before it becomes a wire-level `FileInfo`.
///
/// `absolute_path` is only meaningful on the sender; it is never
/// transmitted. `relative_path` is what the receiver recreates the file
/// under, and must pass [`crate::path_validator::is_safe_relative_path`]
/// before it is ever placed in a [`FileInfo`].
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub relative_path: String,
    pub absolute_path: std::path::PathBuf,
    pub size: u64,
    pub modified: i64,
}

/// The wire-level description of one file within a transfer offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub id: String,
    pub path: String,
    pub size: u64,
    pub modified: i64,
}

/// The announce payload broadcast over UDP.
///
/// `port` carries the announcer's transfer listen port, but the receiver
/// does not trust it — see `discovery::handle_datagram` and DESIGN.md's
/// Open Question log for why a peer's table entry is keyed to the local
/// listen port instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnouncePayload {
    pub alias: String,
    pub device_id: String,
    pub version: u32,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferOffer {
    pub transfer_id: String,
    pub device_id: String,
    pub alias: String,
    pub files: Vec<FileInfo>,
    pub total_size: u64,
    pub total_files: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResponse {
    pub transfer_id: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileHeader {
    pub id: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileComplete {
    pub id: String,
    pub checksum: String,
}

/// The tagged-union message spoken between two peers over a framed TCP
/// connection, and (for `Announce` only) over a single raw UDP datagram.
///
/// Deliberately not `#[derive(Serialize, Deserialize)]`: the wire shape is
/// a single-key object whose key names the variant (`{"ack":{}}`, not a
/// `{"type":"ack", ...}` tagged record), and `transfer_complete`/`ack`
/// carry an empty-or-null payload rather than one of the named payload
/// structs. `codec` implements the explicit (de)serialization layer this
/// shape needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Announce(AnnouncePayload),
    TransferOffer(TransferOffer),
    TransferResponse(TransferResponse),
    FileHeader(FileHeader),
    FileComplete(FileComplete),
    TransferComplete,
    Ack,
}

impl Message {
    /// The wire key naming this variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Message::Announce(_) => "announce",
            Message::TransferOffer(_) => "transfer_offer",
            Message::TransferResponse(_) => "transfer_response",
            Message::FileHeader(_) => "file_header",
            Message::FileComplete(_) => "file_complete",
            Message::TransferComplete => "transfer_complete",
            Message::Ack => "ack",
        }
    }
}

/// Progress reported from either side of a transfer via the `on_progress`
/// callback.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub transfer_id: String,
    pub current_file_index: u32,
    pub total_files: u32,
    pub current_file_path: String,
    pub bytes_transferred_for_file: u64,
    pub current_file_size: u64,
    pub total_bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Returns the current time as seconds since the Unix epoch.
///
/// Used by the peer table and the discovery service; never called while
/// holding the table's mutex.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_secs_is_positive() {
        assert!(now_unix_secs() > 0);
    }

    #[test]
    fn variant_names_match_wire_keys() {
        assert_eq!(Message::Ack.variant_name(), "ack");
        assert_eq!(Message::TransferComplete.variant_name(), "transfer_complete");
    }
}
