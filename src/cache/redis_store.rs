//! Redis-backed entity cache shared by every process.

use std::marker::PhantomData;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use super::contract::{Cache, CacheError};
use super::keys::CacheKey;

/// Stores entities as JSON under `"{prefix}:{namespace}:id:{id}"` or
/// `"{prefix}:{namespace}:name:{name}"`, without expiry.
pub struct RedisCache<V> {
    connection: ConnectionManager,
    prefix: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> RedisCache<V> {
    pub fn new(connection: ConnectionManager, prefix: &str, namespace: &str) -> Self {
        Self {
            connection,
            prefix: format!("{prefix}:{namespace}"),
            _value: PhantomData,
        }
    }

    fn redis_key(&self, key: &CacheKey) -> String {
        redis_key(&self.prefix, key)
    }
}

fn redis_key(prefix: &str, key: &CacheKey) -> String {
    match key {
        CacheKey::Id(id) => format!("{prefix}:id:{id}"),
        CacheKey::Name(name) => format!("{prefix}:name:{name}"),
    }
}

#[async_trait]
impl<V> Cache<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<V>, CacheError> {
        let redis_key = self.redis_key(key);
        let mut connection = self.connection.clone();
        let Some(raw) = connection.get::<_, Option<String>>(&redis_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                // An undecodable entry is treated as a miss and dropped so the
                // next read repopulates it.
                warn!(key = %redis_key, error = %err, "Discarding undecodable cache entry");
                connection.del::<_, ()>(&redis_key).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: CacheKey, value: V) -> Result<(), CacheError> {
        let redis_key = self.redis_key(&key);
        let json = serde_json::to_string(&value).map_err(|err| CacheError::Serialize {
            key: redis_key.clone(),
            message: err.to_string(),
        })?;
        let mut connection = self.connection.clone();
        connection.set::<_, _, ()>(&redis_key, json).await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let redis_key = self.redis_key(key);
        let mut connection = self.connection.clone();
        connection.del::<_, ()>(&redis_key).await?;
        Ok(())
    }
}
