//! Send-side state machine: connects to a peer, offers a set of files,
//! streams each one with a running SHA-256, and waits for the receiver's
//! final `ack`. Mirrors spec.md §4.6.

use super::{hex_lower, tune_stream, TransferError, CHUNK_SIZE};
use crate::codec;
use crate::identity::new_id;
use crate::types::{
    FileComplete, FileEntry, FileHeader, FileInfo, Message, TransferOffer, TransferProgress,
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

pub type OnProgress = dyn Fn(&TransferProgress) + Send + Sync;

/// Sends `files` to the peer at `addr`, driving the full offer →
/// stream-each-file → `transfer_complete` → `ack` exchange.
///
/// `device_id`/`alias` identify the local device in the offer. Returns
/// once the final `ack` has been read, or the first fatal error.
pub fn send_files(
    addr: SocketAddr,
    device_id: &str,
    alias: &str,
    files: &[FileEntry],
    on_progress: &OnProgress,
) -> Result<(), TransferError> {
    let mut stream = TcpStream::connect(addr)?;
    tune_stream(&stream)?;

    let transfer_id = new_id();
    let file_infos: Vec<FileInfo> = files
        .iter()
        .map(|f| FileInfo {
            id: new_id(),
            path: f.relative_path.clone(),
            size: f.size,
            modified: f.modified,
        })
        .collect();
    let total_size: u64 = files.iter().map(|f| f.size).sum();
    let total_files = files.len() as u32;

    codec::write_message(
        &mut stream,
        &Message::TransferOffer(TransferOffer {
            transfer_id: transfer_id.clone(),
            device_id: device_id.to_string(),
            alias: alias.to_string(),
            files: file_infos.clone(),
            total_size,
            total_files,
        }),
    )?;

    match codec::read_message(&mut stream)? {
        Message::TransferResponse(r) if r.accepted => {}
        Message::TransferResponse(_) => return Err(TransferError::TransferRejected),
        other => {
            return Err(TransferError::UnexpectedMessage {
                expected: "transfer_response",
                got: other.variant_name(),
            })
        }
    }

    let mut total_bytes_transferred = 0u64;
    for (index, (entry, info)) in files.iter().zip(file_infos.iter()).enumerate() {
        codec::write_message(
            &mut stream,
            &Message::FileHeader(FileHeader {
                id: info.id.clone(),
                path: info.path.clone(),
                size: info.size,
            }),
        )?;

        let checksum = stream_file(
            &mut stream,
            entry,
            &transfer_id,
            info,
            index as u32,
            total_files,
            total_bytes_transferred,
            total_size,
            on_progress,
        )?;
        total_bytes_transferred += entry.size;

        codec::write_message(
            &mut stream,
            &Message::FileComplete(FileComplete { id: info.id.clone(), checksum }),
        )?;
    }

    codec::write_message(&mut stream, &Message::TransferComplete)?;

    match codec::read_message(&mut stream)? {
        Message::Ack => Ok(()),
        other => Err(TransferError::UnexpectedMessage { expected: "ack", got: other.variant_name() }),
    }
}

#[allow(clippy::too_many_arguments)]
fn stream_file(
    stream: &mut TcpStream,
    entry: &FileEntry,
    transfer_id: &str,
    info: &FileInfo,
    file_index: u32,
    total_files: u32,
    bytes_before_this_file: u64,
    total_bytes: u64,
    on_progress: &OnProgress,
) -> Result<String, TransferError> {
    let file = File::open(&entry.absolute_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut remaining = entry.size;
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        let n = std::cmp::min(remaining, CHUNK_SIZE as u64) as usize;
        let buf = &mut chunk[..n];
        reader.read_exact(buf)?;
        stream.write_all(buf)?;
        hasher.update(&buf[..]);
        remaining -= n as u64;

        on_progress(&TransferProgress {
            transfer_id: transfer_id.to_string(),
            current_file_index: file_index,
            total_files,
            current_file_path: info.path.clone(),
            bytes_transferred_for_file: entry.size - remaining,
            current_file_size: entry.size,
            total_bytes_transferred: bytes_before_this_file + (entry.size - remaining),
            total_bytes,
        });
    }

    Ok(hex_lower(&hasher.finalize()))
}
