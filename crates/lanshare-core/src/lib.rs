//! `lanshare-core`: the discovery-and-transfer engine for `lanshare`, a
//! peer-to-peer LAN file-transfer tool.
//!
//! This crate is the CORE of the design: UDP broadcast peer discovery
//! ([`discovery`]) feeding a concurrent [`peer_table`], a length-prefixed
//! JSON message protocol ([`codec`]), and a TCP transfer state machine
//! ([`transfer`]) that negotiates an offer, streams file contents with
//! per-file SHA-256 verification, and applies filesystem-safety checks
//! ([`path_validator`]) on received paths.
//!
//! Everything here is synchronous: discovery and transfer use blocking
//! `std::net` sockets and `std::thread`, not an async runtime (see
//! SPEC_FULL.md's REDESIGN FLAGS). The CLI, configuration, and directory
//! enumeration that turn this into a runnable program live in the
//! `lanshare-cli` binary crate, but the whole-transfer orchestration
//! ([`run_listen`], [`run_send`]) lives here so any frontend can drive it
//! without re-deriving the glue between discovery and transfer itself.

pub mod codec;
pub mod discovery;
pub mod identity;
pub mod path_validator;
pub mod peer_table;
pub mod runtime;
pub mod transfer;
pub mod types;

pub use runtime::{run_listen, run_send, CoreConfig, RunError};
