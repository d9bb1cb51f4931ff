use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::application::persistence::RepoError;
use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to decode pub/sub payload: {0}")]
    Decode(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl HandlerError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("channel `{channel}` already has a handler")]
    DuplicateChannel { channel: String },
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

pub type Handler<C> = Arc<dyn Fn(Arc<C>, Bytes) -> HandlerFuture + Send + Sync>;

/// Maps channel names to async handlers over a shared context `C`.
///
/// Feature modules each build their own router; the process merges them into
/// one before spawning the listener. A channel has exactly one handler.
pub struct PubSubRouter<C> {
    routes: BTreeMap<String, Handler<C>>,
}

impl<C> PubSubRouter<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            routes: BTreeMap::new(),
        }
    }

    pub fn register<F, Fut>(
        &mut self,
        channel: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self, RouterError>
    where
        F: Fn(Arc<C>, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let channel = channel.into();
        if self.routes.contains_key(&channel) {
            return Err(RouterError::DuplicateChannel { channel });
        }

        let handler: Handler<C> = Arc::new(move |ctx: Arc<C>, payload: Bytes| -> HandlerFuture {
            Box::pin(handler(ctx, payload))
        });
        self.routes.insert(channel, handler);
        Ok(self)
    }

    /// Absorbs every route of `other`. Leaves `self` untouched on conflict.
    pub fn merge(&mut self, other: PubSubRouter<C>) -> Result<&mut Self, RouterError> {
        if let Some(channel) = other.routes.keys().find(|c| self.routes.contains_key(*c)) {
            return Err(RouterError::DuplicateChannel {
                channel: channel.clone(),
            });
        }

        self.routes.extend(other.routes);
        Ok(self)
    }

    pub fn merge_all(
        routers: impl IntoIterator<Item = PubSubRouter<C>>,
    ) -> Result<Self, RouterError> {
        let mut merged = Self::new();
        for router in routers {
            merged.merge(router)?;
        }
        Ok(merged)
    }

    pub fn channels(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn handler(&self, channel: &str) -> Option<Handler<C>> {
        self.routes.get(channel).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<C> Default for PubSubRouter<C>
where
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for PubSubRouter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubRouter")
            .field("channels", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}
