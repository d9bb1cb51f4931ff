use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("pub/sub transport error: {0}")]
    Transport(String),
    #[error("pub/sub subscription closed")]
    Closed,
    #[error("failed to encode pub/sub payload: {0}")]
    Encode(String),
}

impl BusError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        Self::transport(err)
    }
}

/// A message received on a subscribed channel. The payload is opaque to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Live subscription to a fixed set of channels.
#[async_trait]
pub trait Subscription: Send {
    /// Returns the next pending message without waiting; `None` when nothing is pending.
    async fn get_message(&mut self) -> Result<Option<Message>, BusError>;
}

/// Best-effort broadcast transport: no delivery, ordering or acknowledgement guarantees.
#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, BusError>;

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError>;
}
