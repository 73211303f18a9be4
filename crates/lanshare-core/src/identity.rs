//! UUIDv4 identifiers: device-id bootstrap, and per-transfer/per-file ids.

use uuid::Uuid;

/// Generates a fresh lowercase UUIDv4 string.
///
/// Used for the device-id on first run (persisted by the configuration
/// collaborator thereafter), and for a fresh `transfer_id`/file `id` on
/// every send.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
