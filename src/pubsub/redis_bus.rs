//! Redis pub/sub transport shared by every process.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::bus::{BusError, Message, PubSubBus, Subscription};

type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    pub fn new(client: redis::Client, publisher: ConnectionManager) -> Self {
        Self { client, publisher }
    }
}

#[async_trait]
impl PubSubBus for RedisBus {
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel).await?;
            debug!(channel = %channel, "Subscribed to redis channel");
        }

        Ok(Box::new(RedisSubscription {
            messages: Box::pin(pubsub.into_on_message()),
        }))
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        let mut connection = self.publisher.clone();
        connection
            .publish::<_, _, ()>(channel, payload.as_ref())
            .await?;
        Ok(())
    }
}

struct RedisSubscription {
    messages: MessageStream,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn get_message(&mut self) -> Result<Option<Message>, BusError> {
        match self.messages.next().now_or_never() {
            None => Ok(None),
            Some(None) => Err(BusError::Closed),
            Some(Some(message)) => Ok(Some(Message::new(
                message.get_channel_name(),
                Bytes::copy_from_slice(message.get_payload_bytes()),
            ))),
        }
    }
}
