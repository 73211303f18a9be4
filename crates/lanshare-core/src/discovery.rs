//! UDP broadcast discovery: a periodic broadcaster and a broadcast
//! listener, bound to the well-known discovery port `53317/UDP`.
//!
//! Both run as long-lived `std::thread`s with blocking sockets — see
//! SPEC_FULL.md's REDESIGN FLAGS for why this crate uses OS threads
//! instead of an async runtime here.

use crate::types::{now_unix_secs, AnnouncePayload, Peer};
use crate::peer_table::PeerTable;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// The well-known discovery port every peer listens/broadcasts on.
pub const DISCOVERY_PORT: u16 = 53317;

/// Broadcast cadence.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// How often the listener thread checks its stop flag between reads.
const LISTENER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket: {0}")]
    Bind(std::io::Error),

    #[error("failed to configure discovery socket: {0}")]
    Configure(std::io::Error),
}

fn new_udp_socket(bind_port: u16) -> Result<UdpSocket, DiscoveryError> {
    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(DiscoveryError::Bind)?;
    socket.set_reuse_address(true).map_err(DiscoveryError::Configure)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(DiscoveryError::Configure)?;
    socket.set_broadcast(true).map_err(DiscoveryError::Configure)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, bind_port));
    socket.bind(&addr.into()).map_err(DiscoveryError::Bind)?;

    Ok(socket.into())
}

/// Spawns the broadcaster thread. Sends one JSON `AnnouncePayload` datagram
/// (not length-prefixed — the discovery datagram IS the raw JSON bytes) to
/// `255.255.255.255:53317` every [`BROADCAST_INTERVAL`], until `stop` is set.
///
/// Send and serialize failures are swallowed — discovery is best-effort.
pub fn spawn_broadcaster(
    device_id: String,
    alias: String,
    transfer_listen_port: u16,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, DiscoveryError> {
    let socket = new_udp_socket(0)?;
    let destination = SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT));

    let payload = AnnouncePayload {
        alias,
        device_id,
        version: 1,
        port: transfer_listen_port,
    };

    Ok(std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match serde_json::to_vec(&payload) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, destination) {
                        warn!(error = %e, "discovery broadcast send failed");
                    }
                }
                Err(e) => warn!(error = %e, "discovery broadcast serialize failed"),
            }
            std::thread::sleep(BROADCAST_INTERVAL);
        }
        debug!("discovery broadcaster exiting");
    }))
}

/// Spawns the listener thread. Reads announce datagrams, drops anything
/// that fails to parse, ignores self-announces, and otherwise upserts the
/// sender into `peer_table`.
///
/// Per SPEC_FULL.md's REDESIGN FLAGS, the peer's table entry is recorded
/// with the *local* `transfer_listen_port`, not the announce payload's
/// `port` field — this mirrors the original system's behavior literally.
/// The more correct form would trust `AnnouncePayload::port` from the
/// remote peer; see DESIGN.md's Open Question log.
pub fn spawn_listener(
    device_id: String,
    transfer_listen_port: u16,
    peer_table: Arc<PeerTable>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, DiscoveryError> {
    let socket = new_udp_socket(DISCOVERY_PORT)?;
    socket
        .set_read_timeout(Some(LISTENER_POLL_INTERVAL))
        .map_err(DiscoveryError::Configure)?;

    Ok(std::thread::spawn(move || {
        let mut buf = vec![0u8; 4096];
        while !stop.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((len, src)) => {
                    handle_datagram(&buf[..len], src, &device_id, transfer_listen_port, &peer_table);
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "discovery listener recv failed");
                }
            }
        }
        debug!("discovery listener exiting");
    }))
}

fn handle_datagram(
    bytes: &[u8],
    src: SocketAddr,
    local_device_id: &str,
    transfer_listen_port: u16,
    peer_table: &PeerTable,
) {
    let announce: AnnouncePayload = match serde_json::from_slice(bytes) {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "dropping unparseable announce datagram");
            return;
        }
    };

    if announce.device_id == local_device_id {
        return;
    }

    peer_table.add_or_update(Peer {
        device_id: announce.device_id,
        alias: announce.alias,
        address: src.ip().to_string(),
        port: transfer_listen_port,
        last_active: now_unix_secs(),
    });
}

/// Bundles the broadcaster and listener threads with the peer table they
/// share, so a caller (the CLI) can start discovery with one call and tear
/// it down with one call instead of juggling three `Arc`s and two
/// `JoinHandle`s directly.
pub struct Discovery {
    pub peer_table: Arc<PeerTable>,
    stop: Arc<AtomicBool>,
    broadcaster: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl Discovery {
    /// Starts both background threads. `transfer_listen_port` is the
    /// already-bound TCP port this device accepts transfers on; it's both
    /// broadcast in the announce payload and recorded as every discovered
    /// peer's port (see `handle_datagram`'s doc comment).
    pub fn start(
        device_id: String,
        alias: String,
        transfer_listen_port: u16,
    ) -> Result<Self, DiscoveryError> {
        let stop = Arc::new(AtomicBool::new(false));
        let peer_table = Arc::new(PeerTable::new());
        let broadcaster = spawn_broadcaster(
            device_id.clone(),
            alias,
            transfer_listen_port,
            stop.clone(),
        )?;
        let listener = spawn_listener(
            device_id,
            transfer_listen_port,
            peer_table.clone(),
            stop.clone(),
        )?;
        Ok(Self { peer_table, stop, broadcaster, listener })
    }

    /// Signals both threads to stop and waits for them to exit.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.broadcaster.join();
        let _ = self.listener.join();
    }
}
