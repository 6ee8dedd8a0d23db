//! `SubscriberRegistry`: a process-wide map from queue
//! handle to the set of live push channels.
//!
//! An `actix::Actor`-mailbox dispatcher would serialize every attach/
//! detach/notify through a single queue, which would block a slow
//! subscriber's send for every other queue. This registry instead reads
//! the subscriber set once under a `tokio::sync::RwLock`, releases the
//! lock, and only then performs the per-channel sends. The per-connection
//! WebSocket session elsewhere in this module tree still runs as an
//! `actix` actor — only the shared map moved out of actor-mailbox
//! serialization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use actix::prelude::{Message, Recipient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// A broadcast of a newly appended message (the notification
/// payload). The payload is the same opaque ciphertext appended to the
/// store; the registry performs no decryption or transformation.
#[derive(Message, Clone, Debug, Serialize)]
#[rtype(result = "()")]
pub struct BroadcastNotification {
    pub queue_handle: String,
    pub message_id: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

pub type SubscriberId = u64;

/// `init -> serving -> shutdown` process-wide state.
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<(SubscriberId, Recipient<BroadcastNotification>)>>>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a channel as a subscriber of `handle`, returning an id the
    /// caller must retain in order to later `detach`.
    pub async fn attach(
        &self,
        handle: &str,
        recipient: Recipient<BroadcastNotification>,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(handle.to_string())
            .or_default()
            .push((id, recipient));
        id
    }

    /// Detach a channel; empty sets are dropped.
    pub async fn detach(&self, handle: &str, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(set) = subscribers.get_mut(handle) {
            set.retain(|(sid, _)| *sid != id);
            if set.is_empty() {
                subscribers.remove(handle);
            }
        }
    }

    /// Enumerate the current subscriber set for `notification.queue_handle`
    /// and deliver to each. Delivery is best-effort: a channel that fails
    /// to accept the notification is logged and skipped, not removed here
    /// — the owning session detaches itself once it observes the error.
    pub async fn broadcast(&self, notification: BroadcastNotification) {
        let targets = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&notification.queue_handle)
                .cloned()
                .unwrap_or_default()
            // read lock released here, before any channel send
        };
        for (_, recipient) in targets {
            if recipient.do_send(notification.clone()).is_err() {
                tracing::debug!(
                    queue_handle = %notification.queue_handle,
                    "failed to notify subscriber, channel closed"
                );
            }
        }
    }

    /// Detach every channel. Used on shutdown.
    pub async fn close(&self) {
        self.subscribers.write().await.clear();
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, handle: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(handle)
            .map_or(0, |set| set.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::prelude::*;

    struct Sink(std::sync::Arc<std::sync::Mutex<Vec<BroadcastNotification>>>);
    impl Actor for Sink {
        type Context = Context<Self>;
    }
    impl Handler<BroadcastNotification> for Sink {
        type Result = ();
        fn handle(&mut self, msg: BroadcastNotification, _: &mut Self::Context) {
            self.0.lock().unwrap().push(msg);
        }
    }

    #[actix_rt::test]
    async fn attach_detach_and_broadcast() {
        let registry = SubscriberRegistry::new();
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Sink(received.clone()).start();
        let id = registry.attach("h1", sink.recipient()).await;
        assert_eq!(registry.subscriber_count("h1").await, 1);

        registry
            .broadcast(BroadcastNotification {
                queue_handle: "h1".into(),
                message_id: "m1".into(),
                payload: vec![9, 9],
                timestamp: Utc::now(),
            })
            .await;

        // Let the actor's mailbox drain.
        tokio::task::yield_now().await;
        assert_eq!(received.lock().unwrap().len(), 1);

        registry.detach("h1", id).await;
        assert_eq!(registry.subscriber_count("h1").await, 0);
    }

    #[actix_rt::test]
    async fn broadcast_to_unknown_handle_is_noop() {
        let registry = SubscriberRegistry::new();
        registry
            .broadcast(BroadcastNotification {
                queue_handle: "ghost".into(),
                message_id: "m1".into(),
                payload: vec![],
                timestamp: Utc::now(),
            })
            .await;
    }
}
