//! In-memory [`Store`] implementation for tests: an `RwLock`-guarded
//! `HashMap` per record family, with manual expiry bookkeeping standing
//! in for Redis's native per-key TTL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::Store;
use crate::domain::{MessageRecord, QueueRecord};
use crate::error::RelayError;

struct Expiring<T> {
    value: T,
    expires_at: chrono::DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryStore {
    queues: RwLock<HashMap<String, Expiring<QueueRecord>>>,
    messages: RwLock<HashMap<(String, String), Expiring<MessageRecord>>>,
    message_lists: RwLock<HashMap<String, Expiring<Vec<String>>>>,
    tokens: RwLock<HashMap<String, Expiring<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_queue(&self, handle: &str) -> Result<Option<QueueRecord>, RelayError> {
        let mut queues = self.queues.write().await;
        match queues.get(handle) {
            Some(entry) if entry.is_expired() => {
                queues.remove(handle);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_queue(&self, record: &QueueRecord, ttl: Duration) -> Result<(), RelayError> {
        let mut queues = self.queues.write().await;
        queues.insert(record.handle.clone(), Expiring::new(record.clone(), ttl));
        Ok(())
    }

    async fn delete_queue(&self, handle: &str) -> Result<(), RelayError> {
        self.queues.write().await.remove(handle);
        Ok(())
    }

    async fn get_message(
        &self,
        handle: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, RelayError> {
        let key = (handle.to_string(), message_id.to_string());
        let mut messages = self.messages.write().await;
        match messages.get(&key) {
            Some(entry) if entry.is_expired() => {
                messages.remove(&key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_message(&self, record: &MessageRecord, ttl: Duration) -> Result<(), RelayError> {
        let key = (record.queue_handle.clone(), record.id.clone());
        self.messages
            .write()
            .await
            .insert(key, Expiring::new(record.clone(), ttl));
        Ok(())
    }

    async fn delete_message(&self, handle: &str, message_id: &str) -> Result<(), RelayError> {
        self.messages
            .write()
            .await
            .remove(&(handle.to_string(), message_id.to_string()));
        Ok(())
    }

    async fn append_message_id(
        &self,
        handle: &str,
        message_id: &str,
        list_ttl: Duration,
    ) -> Result<(), RelayError> {
        let mut lists = self.message_lists.write().await;
        match lists.get_mut(handle) {
            Some(entry) if !entry.is_expired() => {
                entry.value.push(message_id.to_string());
                entry.expires_at = Utc::now() + chrono::Duration::from_std(list_ttl).unwrap_or_default();
            }
            _ => {
                lists.insert(
                    handle.to_string(),
                    Expiring::new(vec![message_id.to_string()], list_ttl),
                );
            }
        }
        Ok(())
    }

    async fn list_message_ids(&self, handle: &str) -> Result<Vec<String>, RelayError> {
        let mut lists = self.message_lists.write().await;
        match lists.get(handle) {
            Some(entry) if entry.is_expired() => {
                lists.remove(handle);
                Ok(vec![])
            }
            Some(entry) => Ok(entry.value.clone()),
            None => Ok(vec![]),
        }
    }

    async fn list_length(&self, handle: &str) -> Result<u64, RelayError> {
        Ok(self.list_message_ids(handle).await?.len() as u64)
    }

    async fn remove_message_id(&self, handle: &str, message_id: &str) -> Result<(), RelayError> {
        let mut lists = self.message_lists.write().await;
        if let Some(entry) = lists.get_mut(handle) {
            if let Some(pos) = entry.value.iter().position(|id| id == message_id) {
                entry.value.remove(pos);
            }
        }
        Ok(())
    }

    async fn delete_message_list(&self, handle: &str) -> Result<(), RelayError> {
        self.message_lists.write().await.remove(handle);
        Ok(())
    }

    async fn set_token_index(
        &self,
        token: &str,
        handle: &str,
        ttl: Duration,
    ) -> Result<(), RelayError> {
        self.tokens
            .write()
            .await
            .insert(token.to_string(), Expiring::new(handle.to_string(), ttl));
        Ok(())
    }

    async fn get_token_index(&self, token: &str) -> Result<Option<String>, RelayError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get(token) {
            Some(entry) if entry.is_expired() => {
                tokens.remove(token);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete_token_index(&self, token: &str) -> Result<(), RelayError> {
        self.tokens.write().await.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Duration {
        Duration::from_secs(60)
    }

    #[tokio::test]
    async fn append_and_list_preserves_order() {
        let store = MemoryStore::new();
        store.append_message_id("h", "m1", ttl()).await.unwrap();
        store.append_message_id("h", "m2", ttl()).await.unwrap();
        assert_eq!(store.list_message_ids("h").await.unwrap(), vec!["m1", "m2"]);
        assert_eq!(store.list_length("h").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_message_id_is_idempotent() {
        let store = MemoryStore::new();
        store.append_message_id("h", "m1", ttl()).await.unwrap();
        store.remove_message_id("h", "m1").await.unwrap();
        store.remove_message_id("h", "m1").await.unwrap();
        assert!(store.list_message_ids("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .set_token_index("t", "h", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get_token_index("t").await.unwrap(), None);
    }
}
