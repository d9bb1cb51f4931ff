//! Pub/sub invalidation
//!
//! Repositories that propagate through the bus publish an
//! [`InvalidationEvent`] after every write. Each process runs one
//! [`PubSubListener`] that polls its subscription and hands every message to
//! the handler registered for its channel in the merged [`PubSubRouter`].
//!
//! Delivery is best effort. A handler that fails or panics is logged and the
//! loop moves on to the next message.

mod bus;
mod events;
mod listener;
mod memory;
mod redis_bus;
mod router;

pub use bus::{BusError, Message, PubSubBus, Subscription};
pub use events::{
    FRIEND_REQUESTS_CHANNEL, InvalidationAction, InvalidationEvent, SONGS_CHANNEL,
    USER_COMMENTS_CHANNEL, USERS_CHANNEL,
};
pub use listener::{ListenerConfig, ListenerHandle, ListenerState, PubSubListener};
pub use memory::MemoryBus;
pub use redis_bus::RedisBus;
pub use router::{Handler, HandlerError, HandlerFuture, PubSubRouter, RouterError};
