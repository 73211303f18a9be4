//! The two entry points a frontend drives this crate through: `run_listen`
//! and `run_send` (spec.md §6's "the core exposes `runListen()` and
//! `runSend(paths…)` entry points"). Everything else in this crate —
//! discovery, the codec, the transfer state machines — is reachable
//! directly, but this module is what ties them together into the two
//! whole-transfer operations a CLI (or any other frontend) actually needs.

use crate::discovery::{Discovery, DiscoveryError};
use crate::transfer::client;
use crate::transfer::server::{self, OnOffer, OnProgress as ServerOnProgress};
use crate::transfer::TransferError;
use crate::types::{FileEntry, Peer, TransferOffer, TransferProgress};
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

/// The resolved configuration a frontend supplies to [`run_listen`] /
/// [`run_send`] — spec.md §6's "resolved configuration `{device_id, alias,
/// listen_port, download_dir}`". Building this (on-disk settings, `~`
/// expansion, first-run identity bootstrap) is a collaborator's job; this
/// crate only ever consumes the resolved values.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub device_id: String,
    pub alias: String,
    /// TCP port to accept transfers on; `0` asks the OS for an ephemeral
    /// port. Only meaningful to [`run_listen`] (`run_send` dials out).
    pub listen_port: u16,
    /// Destination directory for received files. Only meaningful to
    /// [`run_listen`].
    pub download_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to create download directory {path}: {source}")]
    CreateDownloadDir { path: PathBuf, source: std::io::Error },

    #[error("failed to bind transfer listener: {0}")]
    Bind(std::io::Error),

    #[error("failed to start discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("invalid peer address {address}:{port}: {source}")]
    InvalidPeerAddress { address: String, port: u16, source: AddrParseError },

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Runs the receive side: creates `config.download_dir` if needed, binds
/// the transfer listener, starts discovery broadcasting this device, and
/// serially accepts and drives connections through the receive-side state
/// machine until the process is killed — spec.md §5 specifies no
/// application-level cancellation, so this call does not return in
/// ordinary operation. `on_offer` decides whether to accept each incoming
/// offer; `on_progress` is called as file bytes are received.
pub fn run_listen(
    config: &CoreConfig,
    on_offer: impl Fn(&TransferOffer) -> bool + Send + Sync + 'static,
    on_progress: impl Fn(&TransferProgress) + Send + Sync + 'static,
) -> Result<(), RunError> {
    std::fs::create_dir_all(&config.download_dir).map_err(|source| {
        RunError::CreateDownloadDir { path: config.download_dir.clone(), source }
    })?;

    let (listener, bound_port) = server::bind(config.listen_port).map_err(RunError::Bind)?;
    tracing::info!(port = bound_port, alias = %config.alias, "transfer listener bound");

    let discovery = Discovery::start(config.device_id.clone(), config.alias.clone(), bound_port)?;

    let on_offer: Arc<OnOffer> = Arc::new(on_offer);
    let on_progress: Arc<ServerOnProgress> = Arc::new(on_progress);
    let stop = Arc::new(AtomicBool::new(false));

    server::run(listener, config.download_dir.clone(), on_offer, on_progress, stop);

    // `server::run` only returns once `stop` is set, which nothing above
    // ever does in this call — reached only if a future caller adds its
    // own shutdown signal atop `stop`.
    discovery.shutdown();
    Ok(())
}

/// Runs the send side: dials `peer`'s advertised transfer port and drives
/// the offer → stream-each-file → `transfer_complete` → `ack` exchange
/// for `files`. `on_progress` is called as file bytes are sent. `peer` is
/// expected to already be resolved (e.g. via a [`crate::peer_table::PeerTable`]
/// lookup) — this function does not perform discovery itself.
pub fn run_send(
    config: &CoreConfig,
    peer: &Peer,
    files: &[FileEntry],
    on_progress: impl Fn(&TransferProgress) + Send + Sync + 'static,
) -> Result<(), RunError> {
    let addr: SocketAddr = format!("{}:{}", peer.address, peer.port).parse().map_err(|source| {
        RunError::InvalidPeerAddress { address: peer.address.clone(), port: peer.port, source }
    })?;

    client::send_files(addr, &config.device_id, &config.alias, files, &on_progress)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_send_rejects_unparseable_peer_address() {
        let config = CoreConfig {
            device_id: "device-1".to_string(),
            alias: "alias-1".to_string(),
            listen_port: 0,
            download_dir: PathBuf::from("/tmp/lanshare-test-unused"),
        };
        let peer = Peer {
            device_id: "peer-1".to_string(),
            alias: "peer-alias".to_string(),
            address: "not-an-ip".to_string(),
            port: 53318,
            last_active: 0,
        };

        let result = run_send(&config, &peer, &[], |_p| {});
        assert!(matches!(result, Err(RunError::InvalidPeerAddress { .. })));
    }
}
