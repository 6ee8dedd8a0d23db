//! The storage abstraction. Generalizes the capability set
//! `{Get, SetWithTTL, Delete, AppendToList, RangeList,
//! RemoveFromListByValue, ListLength, RefreshTTL}` into concrete typed
//! methods over the relay's three record families plus the token index,
//! rather than exposing raw key/value primitives to callers.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{MessageRecord, QueueRecord};
use crate::error::RelayError;

/// Key scheme, exposed so callers never hand-format keys.
pub fn queue_key(handle: &str) -> String {
    format!("queue:{handle}")
}

pub fn queue_messages_key(handle: &str) -> String {
    format!("queue:{handle}:messages")
}

pub fn message_key(handle: &str, message_id: &str) -> String {
    format!("message:{handle}:{message_id}")
}

pub fn token_key(token: &str) -> String {
    format!("token:{token}")
}

/// A single-key or single-list operation against the durable store. A
/// `Get` of an expired or absent key returns `Ok(None)`, a distinct
/// non-error result from a fault, which surfaces as `Err(RelayError::StorageFailure)`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_queue(&self, handle: &str) -> Result<Option<QueueRecord>, RelayError>;
    async fn set_queue(&self, record: &QueueRecord, ttl: Duration) -> Result<(), RelayError>;
    async fn delete_queue(&self, handle: &str) -> Result<(), RelayError>;

    async fn get_message(
        &self,
        handle: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, RelayError>;
    async fn set_message(&self, record: &MessageRecord, ttl: Duration) -> Result<(), RelayError>;
    async fn delete_message(&self, handle: &str, message_id: &str) -> Result<(), RelayError>;

    /// Atomically append `message_id` to the queue's message-id list and
    /// refresh the list's TTL to `list_ttl`.
    async fn append_message_id(
        &self,
        handle: &str,
        message_id: &str,
        list_ttl: Duration,
    ) -> Result<(), RelayError>;
    /// The full ordered list of message ids currently recorded for a queue.
    async fn list_message_ids(&self, handle: &str) -> Result<Vec<String>, RelayError>;
    async fn list_length(&self, handle: &str) -> Result<u64, RelayError>;
    /// Atomic removal by value; removing an absent id is a no-op.
    async fn remove_message_id(&self, handle: &str, message_id: &str) -> Result<(), RelayError>;
    async fn delete_message_list(&self, handle: &str) -> Result<(), RelayError>;

    async fn set_token_index(
        &self,
        token: &str,
        handle: &str,
        ttl: Duration,
    ) -> Result<(), RelayError>;
    async fn get_token_index(&self, token: &str) -> Result<Option<String>, RelayError>;
    async fn delete_token_index(&self, token: &str) -> Result<(), RelayError>;
}
