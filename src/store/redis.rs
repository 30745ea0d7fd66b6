use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};

use super::types::{Store, StoreError, StoreResult, QUEUE_KEY};
use crate::record::RequestRecord;

/// Store backed by a Redis server. Cheap to clone; normal commands share
/// one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect and ping. Accepts `host:port` or a full `redis://` URL.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("redis://{}", url)
        };

        let client = Client::open(url.as_str())
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(RedisStore { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set_and_get_previous(
        &self,
        record: &RequestRecord,
    ) -> StoreResult<Option<RequestRecord>> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();

        let previous: Option<String> = conn.getset(&record.id, payload).await?;
        match previous {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, record: &RequestRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();

        let _: () = conn.set(&record.id, payload).await?;
        Ok(())
    }

    async fn push(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();

        let _: i64 = conn.lpush(QUEUE_KEY, id).await?;
        Ok(())
    }

    async fn pop_blocking(&self) -> StoreResult<String> {
        // BRPOP stalls the connection it runs on, so every waiting worker
        // gets a connection of its own instead of the shared one.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (_, id): (String, String) = conn.brpop(QUEUE_KEY, 0.0).await?;
        Ok(id)
    }
}
