//! `lanshare` — a peer-to-peer LAN file-transfer CLI.
//!
//! # Usage
//!
//! ```bash
//! lanshare listen                       # Accept incoming transfers
//! lanshare listen --port 53318          # Listen on a specific TCP port
//! lanshare send kitchen-pc ./photos     # Send a file or directory to a peer
//! lanshare peers                        # Discover peers on the LAN for a few seconds
//! ```
//!
//! On first run, the CLI generates a unique device id and prompts for an
//! alias (falling back to the hostname if not run interactively). The
//! config is saved to `~/.config/lanshare/config.toml`.
//!
//! # Architecture
//!
//! `peers` spins up [`lanshare_core::discovery::Discovery`] (a UDP
//! broadcaster + listener thread pair) directly against the shared
//! `lanshare-core` peer table for a lookup snapshot. `listen` and `send`
//! instead hand a resolved [`lanshare_core::CoreConfig`] and their
//! terminal-facing prompt/progress callbacks to
//! [`lanshare_core::run_listen`]/[`lanshare_core::run_send`], which own
//! discovery, the TCP accept loop, and the send-side state machine —
//! matching spec.md §5's "parallel OS threads with blocking I/O" model.
//! There is no async runtime here.

mod config;
mod enumerate;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use lanshare_core::discovery::Discovery;
use lanshare_core::peer_table::STALE_THRESHOLD_SECS;
use lanshare_core::types::Peer;
use lanshare_core::types::{TransferOffer, TransferProgress};
use lanshare_core::CoreConfig;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// lanshare — peer-to-peer LAN file transfer.
#[derive(Parser, Debug)]
#[command(name = "lanshare", about = "Peer-to-peer LAN file transfer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Display name advertised to other peers. Overrides config.toml for
    /// this run (and is saved if this is the first run).
    #[arg(short, long, global = true)]
    name: Option<String>,

    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept incoming transfer offers.
    Listen {
        /// TCP port to accept transfers on (0 = auto-assign).
        #[arg(short, long, default_value = "0")]
        port: u16,

        /// Directory to write received files under. Defaults to
        /// `~/Downloads/lanshare` (or the config file's `download_dir`).
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Accept every incoming offer without prompting.
        #[arg(long)]
        yes: bool,
    },
    /// Send a file or directory to a peer discovered on the LAN.
    Send {
        /// Target peer's alias or device id (as seen in `lanshare peers`).
        peer: String,

        /// One or more files or directories to send.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// How long to wait for the target peer to appear via discovery.
        #[arg(long, default_value = "10")]
        discover_timeout: u64,
    },
    /// Print a snapshot of peers discovered on the LAN.
    Peers {
        /// How long to listen for announces before printing the snapshot.
        #[arg(long, default_value = "6")]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::config_file_path().context("could not determine config directory")?,
    };

    let mut app_config = match AppConfig::load_from(&config_path)? {
        Some(config) => {
            info!(path = %config_path.display(), "loaded config");
            config
        }
        None => {
            info!("first run detected, creating new config");
            let alias = cli.name.clone().unwrap_or_else(|| get_alias().unwrap_or_default());
            let alias = if alias.is_empty() { get_hostname() } else { alias };
            let config = AppConfig::new_first_run(&alias);
            config.save_to(&config_path)?;
            info!(path = %config_path.display(), device_id = %config.device_id, alias = %config.alias, "saved new config");
            config
        }
    };

    if let Some(name) = &cli.name {
        app_config.alias = name.clone();
    }

    match cli.command {
        Command::Listen { port, download_dir, yes } => {
            let listen_port = if port != 0 { port } else { app_config.listen_port };
            let download_dir = download_dir.unwrap_or_else(|| app_config.resolved_download_dir());
            run_listen(&app_config, listen_port, download_dir, yes)
        }
        Command::Send { peer, paths, discover_timeout } => {
            run_send(&app_config, &peer, &paths, Duration::from_secs(discover_timeout))
        }
        Command::Peers { timeout } => run_peers(&app_config, Duration::from_secs(timeout)),
    }
}

fn run_listen(
    app_config: &AppConfig,
    listen_port: u16,
    download_dir: PathBuf,
    auto_accept: bool,
) -> Result<()> {
    println!(
        "starting \"{}\", writing received files under {}",
        app_config.alias,
        download_dir.display()
    );
    println!("run with LANSHARE_LOG=info to see the bound TCP port and peer activity");

    let config = CoreConfig {
        device_id: app_config.device_id.clone(),
        alias: app_config.alias.clone(),
        listen_port,
        download_dir,
    };

    lanshare_core::run_listen(
        &config,
        move |offer: &TransferOffer| prompt_accept(offer, auto_accept),
        print_progress,
    )
    .context("listen failed")
}

fn prompt_accept(offer: &TransferOffer, auto_accept: bool) -> bool {
    println!(
        "\nincoming transfer from \"{}\": {} file(s), {} bytes",
        offer.alias, offer.total_files, offer.total_size
    );
    for file in &offer.files {
        println!("  {} ({} bytes)", file.path, file.size);
    }

    if auto_accept || !io::stdin().is_terminal() {
        println!("accepting automatically");
        return true;
    }

    print!("accept? [y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

fn run_send(
    app_config: &AppConfig,
    peer_query: &str,
    paths: &[PathBuf],
    discover_timeout: Duration,
) -> Result<()> {
    let files = enumerate::enumerate_paths(paths).context("failed to enumerate files to send")?;
    if files.is_empty() {
        bail!("no files found under the given path(s)");
    }
    let total_size: u64 = files.iter().map(|f| f.size).sum();
    println!("preparing to send {} file(s), {} bytes", files.len(), total_size);

    let discovery = Discovery::start(
        app_config.device_id.clone(),
        app_config.alias.clone(),
        app_config.listen_port,
    )
    .context("failed to start discovery")?;

    println!("looking for peer \"{peer_query}\" (up to {}s)...", discover_timeout.as_secs());
    let peer = wait_for_peer(&discovery, peer_query, discover_timeout);
    discovery.shutdown();

    let Some(peer) = peer else {
        bail!("peer \"{peer_query}\" was not found on the LAN within the timeout");
    };
    println!("sending to \"{}\" at {}:{}", peer.alias, peer.address, peer.port);

    let config = CoreConfig {
        device_id: app_config.device_id.clone(),
        alias: app_config.alias.clone(),
        listen_port: app_config.listen_port,
        download_dir: app_config.resolved_download_dir(),
    };

    lanshare_core::run_send(&config, &peer, &files, print_progress).context("transfer failed")?;

    println!("transfer complete");
    Ok(())
}

fn wait_for_peer(discovery: &Discovery, query: &str, timeout: Duration) -> Option<Peer> {
    let deadline = Instant::now() + timeout;
    loop {
        let snapshot = discovery.peer_table.snapshot();
        if let Some(peer) = snapshot
            .into_iter()
            .find(|p| p.alias == query || p.device_id == query || p.device_id.starts_with(query))
        {
            return Some(peer);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

fn run_peers(app_config: &AppConfig, timeout: Duration) -> Result<()> {
    let discovery = Discovery::start(
        app_config.device_id.clone(),
        app_config.alias.clone(),
        app_config.listen_port,
    )
    .context("failed to start discovery")?;

    println!("discovering peers for {}s...", timeout.as_secs());
    std::thread::sleep(timeout);
    discovery.peer_table.remove_stale(STALE_THRESHOLD_SECS);
    let peers = discovery.peer_table.snapshot();
    discovery.shutdown();

    if peers.is_empty() {
        println!("no peers found");
    } else {
        println!("{:<20} {:<16} {:<8} last seen", "alias", "address", "port");
        for peer in peers {
            println!("{:<20} {:<16} {:<8} {}s ago", peer.alias, peer.address, peer.port, peer.last_active);
        }
    }
    Ok(())
}

fn print_progress(progress: &TransferProgress) {
    print!(
        "\r[{}/{}] {} — {}/{} bytes ({}/{} total)    ",
        progress.current_file_index + 1,
        progress.total_files,
        progress.current_file_path,
        progress.bytes_transferred_for_file,
        progress.current_file_size,
        progress.total_bytes_transferred,
        progress.total_bytes,
    );
    let _ = io::stdout().flush();
    if progress.bytes_transferred_for_file == progress.current_file_size {
        println!();
    }
}

/// Prompts the user for an alias on first run. Falls back to the system
/// hostname when stdin isn't an interactive terminal.
fn get_alias() -> Result<String> {
    if io::stdin().is_terminal() {
        print!("Enter a display name for this device: ");
        io::stdout().flush()?;
        let mut name = String::new();
        io::stdin().read_line(&mut name)?;
        Ok(name.trim().to_string())
    } else {
        Ok(String::new())
    }
}

fn get_hostname() -> String {
    hostname::get().map(|h| h.to_string_lossy().to_string()).unwrap_or_else(|_| "lanshare-device".to_string())
}

/// Initializes the tracing logging infrastructure: always logs to stderr,
/// and best-effort also to a log file under the platform data directory.
/// The log level is controlled by `LANSHARE_LOG` (default `info`).
fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_env("LANSHARE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file_layer = AppConfig::data_dir()
        .and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            std::fs::OpenOptions::new().create(true).append(true).open(dir.join("lanshare.log")).ok()
        })
        .map(|file| fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false));

    tracing_subscriber::registry().with(env_filter).with(stderr_layer).with(file_layer).init();
}
