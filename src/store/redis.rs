//! The production [`Store`] backend, against Redis via
//! `redis::aio::ConnectionManager` (`tokio-comp` + `connection-manager`
//! features, the same combination the `Ara-notification-service` and
//! `mepassa.app` reference repos use for their Redis-backed queues).

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use super::{message_key, queue_key, queue_messages_key, token_key, Store};
use crate::config::RedisSettings;
use crate::domain::{MessageRecord, QueueRecord};
use crate::error::RelayError;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `settings.addr`, authenticating with
    /// `settings.password` if non-empty and selecting `settings.db`.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, RelayError> {
        let url = if settings.password.is_empty() {
            format!("redis://{}/{}", settings.addr, settings.db)
        } else {
            format!("redis://:{}@{}/{}", settings.password, settings.addr, settings.db)
        };
        let client = Client::open(url).map_err(|e| {
            tracing::error!(error = %e, "failed to build redis client");
            RelayError::StorageFailure
        })?;
        let conn = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to redis");
            RelayError::StorageFailure
        })?;
        Ok(Self { conn })
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs() as i64
}

#[async_trait]
impl Store for RedisStore {
    async fn get_queue(&self, handle: &str) -> Result<Option<QueueRecord>, RelayError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(queue_key(handle)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|_| RelayError::StorageFailure))
            .transpose()
    }

    async fn set_queue(&self, record: &QueueRecord, ttl: Duration) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(record).map_err(|_| RelayError::StorageFailure)?;
        conn.set_ex(queue_key(&record.handle), raw, ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn delete_queue(&self, handle: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(queue_key(handle)).await?;
        Ok(())
    }

    async fn get_message(
        &self,
        handle: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, RelayError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(message_key(handle, message_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|_| RelayError::StorageFailure))
            .transpose()
    }

    async fn set_message(&self, record: &MessageRecord, ttl: Duration) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(record).map_err(|_| RelayError::StorageFailure)?;
        conn.set_ex(
            message_key(&record.queue_handle, &record.id),
            raw,
            ttl.as_secs(),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, handle: &str, message_id: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(message_key(handle, message_id)).await?;
        Ok(())
    }

    async fn append_message_id(
        &self,
        handle: &str,
        message_id: &str,
        list_ttl: Duration,
    ) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let key = queue_messages_key(handle);
        let _: () = conn.rpush(&key, message_id).await?;
        let _: () = conn.expire(&key, ttl_secs(list_ttl)).await?;
        Ok(())
    }

    async fn list_message_ids(&self, handle: &str) -> Result<Vec<String>, RelayError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(queue_messages_key(handle), 0, -1).await?;
        Ok(ids)
    }

    async fn list_length(&self, handle: &str) -> Result<u64, RelayError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(queue_messages_key(handle)).await?;
        Ok(len)
    }

    async fn remove_message_id(&self, handle: &str, message_id: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        // Count = 1: remove only the first match, mirroring a FIFO id list
        // that should never contain duplicates in practice.
        let _: () = conn.lrem(queue_messages_key(handle), 1, message_id).await?;
        Ok(())
    }

    async fn delete_message_list(&self, handle: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(queue_messages_key(handle)).await?;
        Ok(())
    }

    async fn set_token_index(
        &self,
        token: &str,
        handle: &str,
        ttl: Duration,
    ) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        conn.set_ex(token_key(token), handle, ttl.as_secs()).await?;
        Ok(())
    }

    async fn get_token_index(&self, token: &str) -> Result<Option<String>, RelayError> {
        let mut conn = self.conn.clone();
        let handle: Option<String> = conn.get(token_key(token)).await?;
        Ok(handle)
    }

    async fn delete_token_index(&self, token: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(token_key(token)).await?;
        Ok(())
    }
}
