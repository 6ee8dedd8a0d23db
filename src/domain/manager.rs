//! `QueueManager`: the domain core. Stateless between
//! requests — all state lives in the [`Store`]. Each operation is a
//! short, non-transactional sequence of Store calls, following the
//! "validate -> fetch -> mutate -> respond" shape `backend/src/qs/
//! qs_api.rs` uses for its QS message processing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{random_hex_id, MessageRecord, QueueRecord, RelayLimits, Window};
use crate::error::RelayError;
use crate::registry::{BroadcastNotification, SubscriberRegistry};
use crate::store::Store;

pub struct CreatedQueue {
    pub handle: String,
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct AppendedMessage {
    pub message_id: String,
    pub received_at: chrono::DateTime<Utc>,
}

pub struct QueueManager {
    store: Arc<dyn Store>,
    registry: Arc<SubscriberRegistry>,
    limits: RelayLimits,
}

impl QueueManager {
    pub fn new(store: Arc<dyn Store>, registry: Arc<SubscriberRegistry>, limits: RelayLimits) -> Self {
        Self {
            store,
            registry,
            limits,
        }
    }

    pub fn limits(&self) -> RelayLimits {
        self.limits
    }

    fn queue_ttl(&self) -> Duration {
        Duration::from_secs(self.limits.queue_ttl_secs)
    }

    fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.limits.message_ttl_secs)
    }

    /// Time left until `queue.expires_at`, clamped to zero. Used whenever a
    /// queue record is re-persisted after touching `last_active_at`, so the
    /// record's own TTL stays pinned to its original `expires_at` instead of
    /// being pushed out by every append/poll.
    fn remaining_ttl(&self, queue: &QueueRecord) -> Duration {
        (queue.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Generate `handle` and `token` from a cryptographically strong
    /// source (32 bytes each, hex-encoded). The token is returned exactly
    /// once; after this call the token index is the sole authority.
    pub async fn create_queue(&self) -> Result<CreatedQueue, RelayError> {
        let handle = random_hex_id(32);
        let token = random_hex_id(32);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.limits.queue_ttl_secs as i64);

        let record = QueueRecord {
            handle: handle.clone(),
            created_at: now,
            expires_at,
            last_active_at: now,
        };
        self.store.set_queue(&record, self.queue_ttl()).await?;
        self.store
            .set_token_index(&token, &handle, self.queue_ttl())
            .await?;

        Ok(CreatedQueue {
            handle,
            token,
            expires_at,
        })
    }

    /// Validate size, check depth, persist the message, append its id,
    /// refresh the list TTL, bump `last_active_at`, and best-effort
    /// broadcast. A broadcast failure never fails the append.
    pub async fn append(&self, handle: &str, payload: Vec<u8>) -> Result<AppendedMessage, RelayError> {
        if payload.len() > self.limits.max_msg_bytes {
            return Err(RelayError::PayloadTooLarge);
        }

        let mut queue = self
            .store
            .get_queue(handle)
            .await?
            .ok_or(RelayError::NotFound)?;

        let depth = self.store.list_length(handle).await?;
        if depth >= self.limits.max_queue_depth {
            return Err(RelayError::QueueFull);
        }

        let message_id = random_hex_id(16);
        let now = Utc::now();
        let record = MessageRecord {
            id: message_id.clone(),
            queue_handle: handle.to_string(),
            payload: payload.clone(),
            received_at: now,
            expires_at: now + chrono::Duration::seconds(self.limits.message_ttl_secs as i64),
        };
        self.store.set_message(&record, self.message_ttl()).await?;
        self.store
            .append_message_id(handle, &message_id, self.queue_ttl())
            .await?;

        queue.last_active_at = now;
        let ttl = self.remaining_ttl(&queue);
        self.store.set_queue(&queue, ttl).await?;

        self.registry
            .broadcast(BroadcastNotification {
                queue_handle: handle.to_string(),
                message_id: message_id.clone(),
                payload,
                timestamp: now,
            })
            .await;

        Ok(AppendedMessage {
            message_id,
            received_at: now,
        })
    }

    /// Confirm the queue still exists, then authorize by token, then return
    /// a bounded window of messages starting after `since` (or from the
    /// start if absent or expired). Existence is checked before
    /// authorization so a deleted queue reads as `not-found`, not
    /// `unauthorized` — the token index is gone along with the queue record,
    /// but the queue's absence is the more specific fact.
    pub async fn window(
        &self,
        handle: &str,
        token: &str,
        since: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Window, RelayError> {
        let mut queue = self.store.get_queue(handle).await?.ok_or(RelayError::NotFound)?;
        self.authorize(handle, token).await?;

        let ids = self.store.list_message_ids(handle).await?;
        let start = match since {
            None => 0,
            Some(since_id) => ids
                .iter()
                .position(|id| id == since_id)
                .map(|pos| pos + 1)
                // Degrade to "return all available": the referenced
                // message has expired or was removed. Clients already
                // deduplicate by message id.
                .unwrap_or(0),
        };

        let limit = match limit {
            None | Some(0) => self.limits.default_window_limit,
            Some(l) => l.min(self.limits.max_window_limit),
        } as usize;

        let mut messages = Vec::new();
        let mut has_more = false;
        let mut idx = start;
        while idx < ids.len() {
            if messages.len() >= limit {
                has_more = true;
                break;
            }
            let id = &ids[idx];
            match self.store.get_message(handle, id).await? {
                Some(record) => messages.push(record),
                None => {
                    // Individually expired: drop it from the list and
                    // skip it, without consuming a slot in the window.
                    self.store.remove_message_id(handle, id).await?;
                }
            }
            idx += 1;
        }

        queue.last_active_at = Utc::now();
        let ttl = self.remaining_ttl(&queue);
        self.store.set_queue(&queue, ttl).await?;

        Ok(Window { messages, has_more })
    }

    /// Idempotent: removing an absent id is a no-op success. Queue
    /// existence is checked before authorization, as in [`Self::window`].
    pub async fn acknowledge(
        &self,
        handle: &str,
        message_id: &str,
        token: &str,
    ) -> Result<(), RelayError> {
        self.store.get_queue(handle).await?.ok_or(RelayError::NotFound)?;
        self.authorize(handle, token).await?;
        self.store.delete_message(handle, message_id).await?;
        self.store.remove_message_id(handle, message_id).await?;
        Ok(())
    }

    /// Authorize, then delete every message, the list, the queue record,
    /// and the token index. Best-effort removal of already-missing
    /// records is not an error.
    pub async fn delete_queue(&self, handle: &str, token: &str) -> Result<(), RelayError> {
        self.authorize(handle, token).await?;

        let ids = self.store.list_message_ids(handle).await?;
        for id in ids {
            self.store.delete_message(handle, &id).await?;
        }
        self.store.delete_message_list(handle).await?;
        self.store.delete_queue(handle).await?;
        self.store.delete_token_index(token).await?;
        Ok(())
    }

    /// No-op in the normal case: per-key TTL evicts records autonomously.
    /// Exists as a seam for storage backends without native TTL.
    pub async fn housekeep(&self) {
        tracing::debug!("housekeeping pass (no-op: store provides native per-key TTL)");
    }

    /// Non-mutating authorization check, used by the streaming session to
    /// validate an optional token on a `subscribe` frame without the rest
    /// of an operation's side effects.
    pub async fn validate_token(&self, handle: &str, token: &str) -> bool {
        self.authorize(handle, token).await.is_ok()
    }

    /// Authorize by checking that the token index maps exactly to
    /// `handle`. Any mismatch or miss is `unauthorized` — the queue
    /// record itself never stores a token to compare against; the token
    /// index is the sole source of truth.
    async fn authorize(&self, handle: &str, token: &str) -> Result<(), RelayError> {
        match self.store.get_token_index(token).await? {
            Some(mapped_handle) if mapped_handle == handle => Ok(()),
            _ => Err(RelayError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::Store as _;

    fn manager_with_limits(limits: RelayLimits) -> QueueManager {
        QueueManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SubscriberRegistry::new()),
            limits,
        )
    }

    fn manager() -> QueueManager {
        manager_with_limits(RelayLimits::default())
    }

    #[tokio::test]
    async fn create_send_poll_round_trip() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();

        mgr.append(&created.handle, vec![1, 2, 3]).await.unwrap();

        let window = mgr
            .window(&created.handle, &created.token, None, None)
            .await
            .unwrap();
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.messages[0].payload, vec![1, 2, 3]);
        assert!(!window.has_more);
    }

    #[tokio::test]
    async fn window_with_wrong_token_is_unauthorized() {
        let mgr = manager();
        let a = mgr.create_queue().await.unwrap();
        let b = mgr.create_queue().await.unwrap();

        let err = mgr.window(&a.handle, &b.token, None, None).await.unwrap_err();
        assert_eq!(err, RelayError::Unauthorized);
    }

    #[tokio::test]
    async fn append_to_unknown_queue_is_not_found() {
        let mgr = manager();
        let err = mgr.append("no-such-handle", vec![1]).await.unwrap_err();
        assert_eq!(err, RelayError::NotFound);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let mgr = manager_with_limits(RelayLimits {
            max_msg_bytes: 4,
            ..RelayLimits::default()
        });
        let created = mgr.create_queue().await.unwrap();

        mgr.append(&created.handle, vec![0; 4]).await.unwrap();
        let err = mgr.append(&created.handle, vec![0; 5]).await.unwrap_err();
        assert_eq!(err, RelayError::PayloadTooLarge);
    }

    #[tokio::test]
    async fn queue_full_at_max_depth() {
        let mgr = manager_with_limits(RelayLimits {
            max_queue_depth: 2,
            ..RelayLimits::default()
        });
        let created = mgr.create_queue().await.unwrap();

        mgr.append(&created.handle, vec![1]).await.unwrap();
        mgr.append(&created.handle, vec![2]).await.unwrap();
        let err = mgr.append(&created.handle, vec![3]).await.unwrap_err();
        assert_eq!(err, RelayError::QueueFull);
    }

    #[tokio::test]
    async fn since_recovery_degrades_to_all_when_unknown() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();

        mgr.append(&created.handle, vec![1]).await.unwrap();
        let m2 = mgr.append(&created.handle, vec![2]).await.unwrap();
        mgr.append(&created.handle, vec![3]).await.unwrap();

        let window = mgr
            .window(&created.handle, &created.token, Some("not-a-real-id"), None)
            .await
            .unwrap();
        assert_eq!(window.messages.len(), 3);

        let window = mgr
            .window(&created.handle, &created.token, Some(&m2.message_id), None)
            .await
            .unwrap();
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.messages[0].payload, vec![3]);
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();
        let sent = mgr.append(&created.handle, vec![1]).await.unwrap();

        mgr.acknowledge(&created.handle, &sent.message_id, &created.token)
            .await
            .unwrap();
        mgr.acknowledge(&created.handle, &sent.message_id, &created.token)
            .await
            .unwrap();

        let window = mgr
            .window(&created.handle, &created.token, None, None)
            .await
            .unwrap();
        assert!(window.messages.is_empty());
    }

    #[tokio::test]
    async fn delete_queue_cascades() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();
        mgr.append(&created.handle, vec![1]).await.unwrap();

        mgr.delete_queue(&created.handle, &created.token).await.unwrap();

        let err = mgr
            .window(&created.handle, &created.token, None, None)
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::NotFound);
    }

    #[tokio::test]
    async fn create_queue_yields_distinct_handles_and_tokens() {
        let mgr = manager();
        let mut handles = std::collections::HashSet::new();
        let mut tokens = std::collections::HashSet::new();
        for _ in 0..50 {
            let created = mgr.create_queue().await.unwrap();
            assert!(handles.insert(created.handle));
            assert!(tokens.insert(created.token));
        }
    }

    #[tokio::test]
    async fn window_limit_zero_uses_default() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();
        for i in 0..3u8 {
            mgr.append(&created.handle, vec![i]).await.unwrap();
        }
        let window = mgr
            .window(&created.handle, &created.token, None, Some(0))
            .await
            .unwrap();
        assert_eq!(window.messages.len(), 3);
    }

    #[tokio::test]
    async fn append_and_window_do_not_extend_queue_expiry() {
        let store = Arc::new(MemoryStore::new());
        let mgr = QueueManager::new(
            store.clone(),
            Arc::new(SubscriberRegistry::new()),
            RelayLimits::default(),
        );
        let created = mgr.create_queue().await.unwrap();

        mgr.append(&created.handle, vec![1]).await.unwrap();
        mgr.window(&created.handle, &created.token, None, None)
            .await
            .unwrap();

        let queue = store.get_queue(&created.handle).await.unwrap().unwrap();
        assert_eq!(queue.expires_at, created.expires_at);
    }

    #[tokio::test]
    async fn acknowledge_after_delete_is_not_found() {
        let mgr = manager();
        let created = mgr.create_queue().await.unwrap();
        let sent = mgr.append(&created.handle, vec![1]).await.unwrap();

        mgr.delete_queue(&created.handle, &created.token).await.unwrap();

        let err = mgr
            .acknowledge(&created.handle, &sent.message_id, &created.token)
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::NotFound);
    }

    #[tokio::test]
    async fn window_limit_is_capped_at_max() {
        let mgr = manager_with_limits(RelayLimits {
            max_window_limit: 2,
            ..RelayLimits::default()
        });
        let created = mgr.create_queue().await.unwrap();
        for i in 0..5u8 {
            mgr.append(&created.handle, vec![i]).await.unwrap();
        }
        let window = mgr
            .window(&created.handle, &created.token, None, Some(1000))
            .await
            .unwrap();
        assert_eq!(window.messages.len(), 2);
        assert!(window.has_more);
    }
}
