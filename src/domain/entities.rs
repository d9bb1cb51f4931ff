//! Persisted domain objects.
//!
//! Every entity is identified by an `i64` primary key. An id of `0` marks an
//! entity that has not been inserted yet; the store assigns the real id.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::types::{PrivacySetting, SongSource, UserPrivileges};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub privileges: UserPrivileges,
    pub message_privacy: PrivacySetting,
    pub friend_privacy: PrivacySetting,
    pub comment_privacy: PrivacySetting,
    pub youtube_name: Option<String>,
    pub twitter_name: Option<String>,
    pub twitch_name: Option<String>,
    pub register_ts: OffsetDateTime,
    pub stars: i64,
    pub demons: i64,
    pub primary_colour: i64,
    pub secondary_colour: i64,
    pub display_type: i64,
    pub icon: i64,
    pub ship: i64,
    pub ball: i64,
    pub ufo: i64,
    pub wave: i64,
    pub robot: i64,
    pub spider: i64,
    pub explosion: i64,
    pub glow: bool,
    pub creator_points: i64,
    pub coins: i64,
    pub user_coins: i64,
    pub diamonds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub sender_user_id: i64,
    pub recipient_user_id: i64,
    pub message: String,
    pub post_ts: OffsetDateTime,
    pub seen_ts: Option<OffsetDateTime>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub name: String,
    pub author_id: i64,
    pub author: String,
    pub author_youtube: Option<String>,
    /// Size in megabytes.
    pub size: f64,
    pub download_url: String,
    pub source: SongSource,
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserComment {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub likes: i64,
    pub post_ts: OffsetDateTime,
    pub deleted: bool,
}
