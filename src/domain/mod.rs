//! The queue/message data model.

pub mod manager;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Generate a cryptographically random, hex-encoded identifier of
/// `num_bytes` bytes. Used for queue handles and access tokens (32 bytes,
/// 256 bits) and message ids (16 bytes, 128 bits).
pub fn random_hex_id(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A receiver's drop-box. Never mutated except `last_active_at`; the
/// access token is never stored here (see [`crate::store::Store`] token
/// index) — once the creation response has been sent, the token index is
/// the sole source of truth for authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub handle: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// An opaque ciphertext blob queued for one receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub queue_handle: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A bounded slice of a queue's messages returned by one poll.
#[derive(Debug, Clone, Serialize)]
pub struct Window {
    pub messages: Vec<MessageRecord>,
    pub has_more: bool,
}

/// Data-model constants, loaded from [`crate::config::LimitSettings`]
/// rather than hardcoded so tests can exercise boundary behaviors with small
/// values without waiting on real TTLs.
#[derive(Debug, Clone, Copy)]
pub struct RelayLimits {
    pub queue_ttl_secs: u64,
    pub message_ttl_secs: u64,
    pub max_queue_depth: u64,
    pub max_msg_bytes: usize,
    pub default_window_limit: u64,
    pub max_window_limit: u64,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            queue_ttl_secs: 7 * 24 * 60 * 60,
            message_ttl_secs: 24 * 60 * 60,
            max_queue_depth: 1000,
            max_msg_bytes: 4 * 1024 * 1024,
            default_window_limit: 100,
            max_window_limit: 100,
        }
    }
}

impl From<&crate::config::LimitSettings> for RelayLimits {
    fn from(s: &crate::config::LimitSettings) -> Self {
        Self {
            queue_ttl_secs: s.queue_ttl_secs,
            message_ttl_secs: s.message_ttl_secs,
            max_queue_depth: s.max_queue_depth,
            max_msg_bytes: s.max_msg_bytes,
            default_window_limit: s.default_window_limit,
            max_window_limit: s.max_window_limit,
        }
    }
}
