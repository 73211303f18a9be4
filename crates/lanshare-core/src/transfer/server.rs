//! Receive-side state machine: accepts one connection, negotiates an
//! offer, writes each incoming file with a running SHA-256, and verifies
//! it against the sender's `file_complete` checksum.
//!
//! States and transitions mirror spec.md §4.5 exactly: `AwaitOffer` →
//! `Deciding` → `RecvFile(i)` → `Streaming(i,h)` → `AwaitComplete(i,h)` →
//! (next file, or `AwaitFinal`) → `Done`.

use super::{hex_lower, tune_stream, TransferError, CHUNK_SIZE};
use crate::codec;
use crate::path_validator::is_safe_relative_path;
use crate::types::{Message, TransferOffer, TransferProgress, TransferResponse};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What became of one handled connection, for the caller's logging.
#[derive(Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Rejected,
}

pub type OnOffer = dyn Fn(&TransferOffer) -> bool + Send + Sync;
pub type OnProgress = dyn Fn(&TransferProgress) + Send + Sync;

/// Binds the transfer listener. `port = 0` asks the OS for an ephemeral
/// port; the actually-bound port is returned alongside the listener.
pub fn bind(port: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    let local_port = listener.local_addr()?.port();
    Ok((listener, local_port))
}

/// Runs the accept loop: serially accepts a connection, drives it to
/// completion, and accepts the next one. A per-connection error is logged
/// and the loop continues — per spec.md §4.5, only a fully escaped panic
/// would terminate the server, which implementers are told to avoid.
///
/// `stop` is polled between accepts (the listener has a short read
/// timeout) so the loop can be torn down in tests without killing the
/// process; production callers may simply never set it.
pub fn run(
    listener: TcpListener,
    download_dir: PathBuf,
    on_offer: Arc<OnOffer>,
    on_progress: Arc<OnProgress>,
    stop: Arc<AtomicBool>,
) {
    if let Err(e) = socket2::SockRef::from(&listener)
        .set_read_timeout(Some(std::time::Duration::from_millis(500)))
    {
        warn!(error = %e, "failed to set accept timeout, falling back to blocking accept");
    }

    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if let Err(e) = tune_stream(&stream) {
                    warn!(peer = %peer_addr, error = %e, "failed to tune accepted socket");
                }
                match handle_connection(stream, peer_addr, &download_dir, on_offer.as_ref(), on_progress.as_ref()) {
                    Ok(TransferOutcome::Completed) => info!(peer = %peer_addr, "transfer completed"),
                    Ok(TransferOutcome::Rejected) => info!(peer = %peer_addr, "transfer rejected locally"),
                    Err(e) => warn!(peer = %peer_addr, error = %e, "transfer connection aborted"),
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(e) => {
                warn!(error = %e, "failed to accept transfer connection");
            }
        }
    }
    debug!("transfer server exiting");
}

/// Drives one accepted connection through the full receive-side state
/// machine. Public so tests (and `run`) can drive a single connection
/// without standing up the whole accept loop.
pub fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    download_dir: &Path,
    on_offer: &OnOffer,
    on_progress: &OnProgress,
) -> Result<TransferOutcome, TransferError> {
    let offer = match codec::read_message(&mut stream)? {
        Message::TransferOffer(offer) => offer,
        other => {
            return Err(TransferError::UnexpectedMessage {
                expected: "transfer_offer",
                got: other.variant_name(),
            })
        }
    };

    debug!(peer = %peer_addr, transfer_id = %offer.transfer_id, files = offer.total_files, "received offer");

    if !on_offer(&offer) {
        codec::write_message(
            &mut stream,
            &Message::TransferResponse(TransferResponse {
                transfer_id: offer.transfer_id,
                accepted: false,
            }),
        )?;
        return Ok(TransferOutcome::Rejected);
    }

    codec::write_message(
        &mut stream,
        &Message::TransferResponse(TransferResponse {
            transfer_id: offer.transfer_id.clone(),
            accepted: true,
        }),
    )?;

    let total_bytes = offer.total_size;
    let mut total_bytes_transferred = 0u64;

    for index in 0..offer.files.len() {
        let outcome = receive_one_file(
            &mut stream,
            download_dir,
            &offer.transfer_id,
            index as u32,
            offer.total_files,
            total_bytes_transferred,
            total_bytes,
            on_progress,
        );

        match outcome {
            Ok(bytes_written) => total_bytes_transferred += bytes_written,
            Err(e) => {
                // Checksum mismatches already cleaned up their own file; any
                // other fatal error leaves a partial file on disk per
                // spec.md §7 ("left as-is only if deletion is not
                // applicable").
                return Err(e);
            }
        }
    }

    match codec::read_message(&mut stream)? {
        Message::TransferComplete => {}
        other => {
            return Err(TransferError::UnexpectedMessage {
                expected: "transfer_complete",
                got: other.variant_name(),
            })
        }
    }

    codec::write_message(&mut stream, &Message::Ack)?;
    Ok(TransferOutcome::Completed)
}

/// Drives one `RecvFile(i) -> Streaming(i,h) -> AwaitComplete(i,h)` cycle:
/// reads the `file_header` itself (spec.md §4.5 keys the state off the
/// header just received, not the offer's `FileInfo` announced earlier),
/// validates its `path`, streams exactly `h.size` bytes, and verifies the
/// running SHA-256 against the matching `file_complete`.
#[allow(clippy::too_many_arguments)]
fn receive_one_file(
    stream: &mut TcpStream,
    download_dir: &Path,
    transfer_id: &str,
    index: u32,
    total_files: u32,
    bytes_before_this_file: u64,
    total_bytes: u64,
    on_progress: &OnProgress,
) -> Result<u64, TransferError> {
    let header = match codec::read_message(stream)? {
        Message::FileHeader(h) => h,
        other => {
            return Err(TransferError::UnexpectedMessage {
                expected: "file_header",
                got: other.variant_name(),
            })
        }
    };

    if !is_safe_relative_path(&header.path) {
        return Err(TransferError::PathIsInvalid { path: header.path });
    }

    let output_path = download_dir.join(&header.path);
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let size = header.size;
    let file = File::create(&output_path)?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut remaining = size;
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        let n = std::cmp::min(remaining, CHUNK_SIZE as u64) as usize;
        let buf = &mut chunk[..n];
        if let Err(e) = stream.read_exact(buf) {
            return Err(TransferError::Io(e));
        }
        writer.write_all(buf)?;
        hasher.update(&buf[..]);
        remaining -= n as u64;

        on_progress(&TransferProgress {
            transfer_id: transfer_id.to_string(),
            current_file_index: index,
            total_files,
            current_file_path: header.path.clone(),
            bytes_transferred_for_file: size - remaining,
            current_file_size: size,
            total_bytes_transferred: bytes_before_this_file + (size - remaining),
            total_bytes,
        });
    }
    writer.flush()?;
    drop(writer);

    let actual = hex_lower(&hasher.finalize());

    let complete = match codec::read_message(stream)? {
        Message::FileComplete(c) => c,
        other => {
            return Err(TransferError::UnexpectedMessage {
                expected: "file_complete",
                got: other.variant_name(),
            })
        }
    };

    if complete.checksum != actual {
        let _ = std::fs::remove_file(&output_path);
        return Err(TransferError::ChecksumMismatch {
            id: complete.id,
            expected: complete.checksum,
            actual,
        });
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileInfo;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn single_file_loopback_success() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| true,
                &|_p| {},
            )
        });

        let contents = b"hello world";
        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: vec![FileInfo {
                    id: "f1".to_string(),
                    path: "hello.txt".to_string(),
                    size: contents.len() as u64,
                    modified: 0,
                }],
                total_size: contents.len() as u64,
                total_files: 1,
            }),
        )
        .unwrap();

        match codec::read_message(&mut client).unwrap() {
            Message::TransferResponse(r) => assert!(r.accepted),
            other => panic!("unexpected: {other:?}"),
        }

        codec::write_message(
            &mut client,
            &Message::FileHeader(crate::types::FileHeader {
                id: "f1".to_string(),
                path: "hello.txt".to_string(),
                size: contents.len() as u64,
            }),
        )
        .unwrap();
        client.write_all(contents).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(contents);
        let checksum = hex_lower(&hasher.finalize());
        codec::write_message(
            &mut client,
            &Message::FileComplete(FileComplete {
                id: "f1".to_string(),
                checksum,
            }),
        )
        .unwrap();

        codec::write_message(&mut client, &Message::TransferComplete).unwrap();
        match codec::read_message(&mut client).unwrap() {
            Message::Ack => {}
            other => panic!("unexpected: {other:?}"),
        }

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);

        let written = std::fs::read(dir.path().join("hello.txt")).unwrap();
        assert_eq!(written, contents);
    }

    #[test]
    fn rejection_leaves_download_dir_empty() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| false,
                &|_p| {},
            )
        });

        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: vec![FileInfo {
                    id: "f1".to_string(),
                    path: "hello.txt".to_string(),
                    size: 1,
                    modified: 0,
                }],
                total_size: 1,
                total_files: 1,
            }),
        )
        .unwrap();

        match codec::read_message(&mut client).unwrap() {
            Message::TransferResponse(r) => assert!(!r.accepted),
            other => panic!("unexpected: {other:?}"),
        }

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome, TransferOutcome::Rejected);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn checksum_mismatch_deletes_partial_file() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| true,
                &|_p| {},
            )
        });

        let contents = b"hello world";
        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: vec![FileInfo {
                    id: "f1".to_string(),
                    path: "hello.txt".to_string(),
                    size: contents.len() as u64,
                    modified: 0,
                }],
                total_size: contents.len() as u64,
                total_files: 1,
            }),
        )
        .unwrap();
        codec::read_message(&mut client).unwrap();

        codec::write_message(
            &mut client,
            &Message::FileHeader(crate::types::FileHeader {
                id: "f1".to_string(),
                path: "hello.txt".to_string(),
                size: contents.len() as u64,
            }),
        )
        .unwrap();
        client.write_all(contents).unwrap();
        codec::write_message(
            &mut client,
            &Message::FileComplete(FileComplete {
                id: "f1".to_string(),
                checksum: "0000000000000000000000000000000000000000000000000000000000000000".to_string(),
            }),
        )
        .unwrap();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(TransferError::ChecksumMismatch { .. })));
        assert!(!dir.path().join("hello.txt").exists());
    }

    #[test]
    fn path_traversal_is_rejected_before_any_file_is_created() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| true,
                &|_p| {},
            )
        });

        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: vec![FileInfo {
                    id: "f1".to_string(),
                    path: "evil.txt".to_string(),
                    size: 0,
                    modified: 0,
                }],
                total_size: 0,
                total_files: 1,
            }),
        )
        .unwrap();
        codec::read_message(&mut client).unwrap();

        // The path validator runs against the `file_header` actually
        // received (spec.md §4.5's `RecvFile(i)` state), not the offer's
        // announced `FileInfo.path` — a malicious or buggy sender could
        // send one path in the offer and another in the header.
        codec::write_message(
            &mut client,
            &Message::FileHeader(crate::types::FileHeader {
                id: "f1".to_string(),
                path: "../evil.txt".to_string(),
                size: 0,
            }),
        )
        .unwrap();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(TransferError::PathIsInvalid { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn multi_file_transfer_preserves_order_including_empty_file() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();
        let seen_order = Arc::new(Mutex::new(Vec::new()));
        let seen_order_cb = seen_order.clone();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| true,
                &move |p| seen_order_cb.lock().unwrap().push(p.current_file_path.clone()),
            )
        });

        let files = [("a.txt", b"0123456789".to_vec()), ("b.txt", vec![]), ("c.txt", b"9876543210".to_vec())];
        let total_size: u64 = files.iter().map(|(_, c)| c.len() as u64).sum();

        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: files
                    .iter()
                    .enumerate()
                    .map(|(i, (name, content))| FileInfo {
                        id: format!("f{i}"),
                        path: name.to_string(),
                        size: content.len() as u64,
                        modified: 0,
                    })
                    .collect(),
                total_size,
                total_files: files.len() as u32,
            }),
        )
        .unwrap();
        codec::read_message(&mut client).unwrap();

        for (i, (name, content)) in files.iter().enumerate() {
            codec::write_message(
                &mut client,
                &Message::FileHeader(crate::types::FileHeader {
                    id: format!("f{i}"),
                    path: name.to_string(),
                    size: content.len() as u64,
                }),
            )
            .unwrap();
            if !content.is_empty() {
                client.write_all(content).unwrap();
            }
            let mut hasher = Sha256::new();
            hasher.update(content);
            codec::write_message(
                &mut client,
                &Message::FileComplete(FileComplete {
                    id: format!("f{i}"),
                    checksum: hex_lower(&hasher.finalize()),
                }),
            )
            .unwrap();
        }

        codec::write_message(&mut client, &Message::TransferComplete).unwrap();
        codec::read_message(&mut client).unwrap();

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);
        assert!(dir.path().join("a.txt").exists());
        assert!(dir.path().join("b.txt").exists());
        assert!(dir.path().join("c.txt").exists());
        assert_eq!(std::fs::metadata(dir.path().join("b.txt")).unwrap().len(), 0);
    }

    #[test]
    fn zero_file_offer_completes_immediately() {
        let dir = tempdir().unwrap();
        let (mut client, server) = loopback_pair();
        let download_dir = dir.path().to_path_buf();

        let handle = std::thread::spawn(move || {
            handle_connection(
                server,
                "127.0.0.1:0".parse().unwrap(),
                &download_dir,
                &|_offer| true,
                &|_p| {},
            )
        });

        codec::write_message(
            &mut client,
            &Message::TransferOffer(TransferOffer {
                transfer_id: "t1".to_string(),
                device_id: "sender".to_string(),
                alias: "sender-alias".to_string(),
                files: vec![],
                total_size: 0,
                total_files: 0,
            }),
        )
        .unwrap();
        codec::read_message(&mut client).unwrap();
        codec::write_message(&mut client, &Message::TransferComplete).unwrap();
        match codec::read_message(&mut client).unwrap() {
            Message::Ack => {}
            other => panic!("unexpected: {other:?}"),
        }

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);
    }
}
