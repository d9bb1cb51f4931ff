//! Cache invalidation events carried over pub/sub.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bus::BusError;
use super::router::HandlerError;

pub const USERS_CHANNEL: &str = "rgdps:users:invalidate";
pub const FRIEND_REQUESTS_CHANNEL: &str = "rgdps:friend_requests:invalidate";
pub const SONGS_CHANNEL: &str = "rgdps:songs:invalidate";
pub const USER_COMMENTS_CHANNEL: &str = "rgdps:user_comments:invalidate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationAction {
    /// Reload the entity from the store and overwrite the cached copy.
    Refresh,
    /// Drop the cached copy; the next read repopulates it.
    Evict,
}

/// Tells every subscribed process that one cached entity is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Unique per publication, for tracing deliveries across processes.
    pub id: Uuid,
    pub entity_id: i64,
    pub action: InvalidationAction,
}

impl InvalidationEvent {
    pub fn new(entity_id: i64, action: InvalidationAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            action,
        }
    }

    pub fn refresh(entity_id: i64) -> Self {
        Self::new(entity_id, InvalidationAction::Refresh)
    }

    pub fn evict(entity_id: i64) -> Self {
        Self::new(entity_id, InvalidationAction::Evict)
    }

    pub fn encode(&self) -> Result<Bytes, BusError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|err| BusError::Encode(err.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, HandlerError> {
        serde_json::from_slice(payload).map_err(|err| HandlerError::decode(err.to_string()))
    }
}
