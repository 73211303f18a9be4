//! Concurrent peer table: the sole cross-thread mutable structure shared
//! by the discovery broadcaster, listener, and the CLI's `peers` lookup.
//!
//! A single table-wide mutex guards the map. No operation suspends while
//! holding it — snapshots are owned copies, never borrowed views, so
//! readers never hold the lock while iterating. A poisoned lock (another
//! thread panicked mid-mutation) is recovered rather than propagated, so
//! one thread's panic doesn't cascade into every other thread touching
//! the table.

use crate::types::{now_unix_secs, Peer};
use std::collections::HashMap;
use std::sync::Mutex;

/// The stale threshold used by callers: three broadcast intervals.
pub const STALE_THRESHOLD_SECS: u64 = 15;

#[derive(Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<String, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `peer` by `device_id`; last write wins on every field.
    pub fn add_or_update(&self, peer: Peer) {
        let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        peers.insert(peer.device_id.clone(), peer);
    }

    /// Removes every entry whose `last_active` is more than `max_age_secs`
    /// behind the current time. `now` is read once for the whole call.
    pub fn remove_stale(&self, max_age_secs: u64) {
        let now = now_unix_secs();
        let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        peers.retain(|_, peer| now.saturating_sub(peer.last_active) <= max_age_secs);
    }

    /// Returns an owned copy of every peer currently in the table.
    /// Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }

    /// Number of peers currently in the table. Test/diagnostic helper.
    pub fn len(&self) -> usize {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(device_id: &str, last_active: u64) -> Peer {
        Peer {
            device_id: device_id.to_string(),
            alias: "test-peer".to_string(),
            address: "192.168.1.10".to_string(),
            port: 53318,
            last_active,
        }
    }

    #[test]
    fn add_or_update_is_idempotent() {
        let table = PeerTable::new();
        let p = peer("d1", now_unix_secs());
        table.add_or_update(p.clone());
        table.add_or_update(p);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn add_or_update_overwrites_all_fields() {
        let table = PeerTable::new();
        table.add_or_update(peer("d1", 100));
        let mut updated = peer("d1", 200);
        updated.alias = "renamed".to_string();
        updated.port = 9999;
        table.add_or_update(updated);

        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].alias, "renamed");
        assert_eq!(snap[0].port, 9999);
        assert_eq!(snap[0].last_active, 200);
    }

    #[test]
    fn remove_stale_evicts_only_old_entries() {
        let table = PeerTable::new();
        let now = now_unix_secs();
        table.add_or_update(peer("fresh", now));
        table.add_or_update(peer("stale", now.saturating_sub(100)));

        table.remove_stale(15);

        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].device_id, "fresh");
    }

    #[test]
    fn remove_stale_keeps_entries_at_exact_threshold() {
        let table = PeerTable::new();
        let now = now_unix_secs();
        table.add_or_update(peer("boundary", now - 15));
        table.remove_stale(15);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn snapshot_is_independent_of_table_mutation() {
        let table = PeerTable::new();
        table.add_or_update(peer("d1", now_unix_secs()));
        let snap = table.snapshot();
        table.add_or_update(peer("d2", now_unix_secs()));
        assert_eq!(snap.len(), 1);
        assert_eq!(table.len(), 2);
    }
}
