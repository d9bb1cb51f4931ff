use async_trait::async_trait;
use thiserror::Error;

use super::keys::CacheKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("failed to serialize cached value for `{key}`: {message}")]
    Serialize { key: String, message: String },
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::backend(err)
    }
}

/// Key-value store of fully hydrated entities.
///
/// Entries never expire; they are only replaced or removed by the owning
/// repository.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<V>, CacheError>;

    async fn set(&self, key: CacheKey, value: V) -> Result<(), CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;
}
