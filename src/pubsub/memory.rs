//! In-process bus for single-process deployments and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::bus::{BusError, Message, PubSubBus, Subscription};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<Message>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Messages beyond `capacity` that a subscriber has not polled yet are dropped for it.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubBus for MemoryBus {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, BusError> {
        Ok(Box::new(MemorySubscription {
            channels: channels.iter().cloned().collect(),
            receiver: self.sender.subscribe(),
        }))
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        if self.sender.send(Message::new(channel, payload)).is_err() {
            debug!(channel, "Published with no active subscribers");
        }
        Ok(())
    }
}

struct MemorySubscription {
    channels: HashSet<String>,
    receiver: broadcast::Receiver<Message>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn get_message(&mut self) -> Result<Option<Message>, BusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if self.channels.contains(&message.channel) => {
                    return Ok(Some(message));
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind; messages dropped");
                }
                Err(TryRecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_subscribed_channels() {
        let bus = MemoryBus::new();
        let mut subscription = bus
            .subscribe(&["songs".to_string()])
            .await
            .expect("subscribe");

        bus.publish("users", Bytes::from_static(b"ignored"))
            .await
            .unwrap();
        bus.publish("songs", Bytes::from_static(b"42")).await.unwrap();

        let message = subscription
            .get_message()
            .await
            .unwrap()
            .expect("pending message");
        assert_eq!(message.channel, "songs");
        assert_eq!(message.payload, Bytes::from_static(b"42"));
        assert!(subscription.get_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_poll_returns_none() {
        let bus = MemoryBus::new();
        let mut subscription = bus.subscribe(&["songs".to_string()]).await.unwrap();
        assert!(subscription.get_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = MemoryBus::new();
        assert!(bus.publish("songs", Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let bus = MemoryBus::with_capacity(2);
        let mut subscription = bus.subscribe(&["songs".to_string()]).await.unwrap();

        for i in 0..5_u8 {
            bus.publish("songs", Bytes::from(vec![i])).await.unwrap();
        }

        let message = subscription.get_message().await.unwrap().expect("message");
        assert_eq!(message.payload, Bytes::from(vec![3_u8]));
    }
}
