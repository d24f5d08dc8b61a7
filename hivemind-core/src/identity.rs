//! Identity types for HIVEMIND entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Agent identifier using UUIDv7 for timestamp-sortable IDs.
/// Sorting agent ids lexicographically yields creation order.
pub type AgentId = Uuid;

/// Memory fragment identifier. Fragments may be keyed by externally supplied
/// ids (e.g. re-imported exports), so this is a plain string.
pub type FragmentId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 digest used for stable, run-independent hashing.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 agent id.
pub fn new_agent_id() -> AgentId {
    Uuid::now_v7()
}

/// Generate a new fragment id.
pub fn new_fragment_id() -> FragmentId {
    Uuid::now_v7().to_string()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Stable 64-bit hash of a string (first 8 bytes of its SHA-256 digest).
///
/// Unlike `std::hash`, the result is identical across processes and builds.
pub fn stable_hash(value: &str) -> u64 {
    let digest = compute_content_hash(value.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
