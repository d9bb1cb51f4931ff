//! Process-wide wiring of repositories, caches and the invalidation bus.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::application::persistence::Database;
use crate::application::repositories::{
    self, CommentRepository, FriendRequestRepository, Propagation, SongRepository,
    UserRepository,
};
use crate::cache::{Cache, CacheConfig, MemoryCache, RedisCache, non_zero};
use crate::config::Settings;
use crate::domain::entities::{FriendRequest, Song, User, UserComment};
use crate::infra::db::{MySqlDatabase, SqliteDatabase};
use crate::infra::error::InfraError;
use crate::pubsub::{
    FRIEND_REQUESTS_CHANNEL, MemoryBus, PubSubBus, PubSubRouter, RedisBus, RouterError,
    SONGS_CHANNEL, USER_COMMENTS_CHANNEL,
};

/// One cache per entity type.
#[derive(Clone)]
pub struct Caches {
    pub users: Arc<dyn Cache<User>>,
    pub friend_requests: Arc<dyn Cache<FriendRequest>>,
    pub songs: Arc<dyn Cache<Song>>,
    pub comments: Arc<dyn Cache<UserComment>>,
}

impl Caches {
    /// Per-process LRU caches sized from `config`.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self {
            users: Arc::new(MemoryCache::new("user", non_zero(config.user_limit))),
            friend_requests: Arc::new(MemoryCache::new(
                "friend_request",
                non_zero(config.friend_request_limit),
            )),
            songs: Arc::new(MemoryCache::new("song", non_zero(config.song_limit))),
            comments: Arc::new(MemoryCache::new(
                "user_comment",
                non_zero(config.comment_limit),
            )),
        }
    }
}

/// Repositories shared by request handlers and the invalidation listener.
///
/// Users write straight through to their cache, which is shared through Redis
/// when one is configured. Every other entity lives in a per-process cache and
/// tells the other processes to refresh over the bus.
#[derive(Clone)]
pub struct AppContext {
    pub users: UserRepository,
    pub friend_requests: FriendRequestRepository,
    pub songs: SongRepository,
    pub comments: CommentRepository,
    bus: Arc<dyn PubSubBus>,
}

impl AppContext {
    pub fn new(db: Arc<dyn Database>, bus: Arc<dyn PubSubBus>, caches: Caches) -> Self {
        let via_bus = |channel: &'static str| Propagation::Bus {
            bus: bus.clone(),
            channel,
        };

        Self {
            users: UserRepository::new(db.clone(), caches.users, Propagation::Synchronous),
            friend_requests: FriendRequestRepository::new(
                db.clone(),
                caches.friend_requests,
                via_bus(FRIEND_REQUESTS_CHANNEL),
            ),
            songs: SongRepository::new(db.clone(), caches.songs, via_bus(SONGS_CHANNEL)),
            comments: CommentRepository::new(db, caches.comments, via_bus(USER_COMMENTS_CHANNEL)),
            bus,
        }
    }

    /// In-process caches with default capacities over the given ports.
    pub fn in_memory(db: Arc<dyn Database>, bus: Arc<dyn PubSubBus>) -> Self {
        Self::new(db, bus, Caches::in_memory(&CacheConfig::default()))
    }

    /// Connects the configured backends. A `sqlite:` database URL opens a
    /// local file; missing URLs fall back to an in-memory database, cache
    /// and bus.
    pub async fn connect(settings: &Settings) -> Result<Self, InfraError> {
        let cache_config = CacheConfig::from(&settings.cache);
        let db = connect_database(settings).await?;

        let Some(redis_url) = settings.redis.url.as_deref() else {
            warn!("No Redis URL configured; cache and pub/sub are process-local");
            return Ok(Self::new(
                db,
                Arc::new(MemoryBus::new()),
                Caches::in_memory(&cache_config),
            ));
        };

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        info!("Connected to Redis");

        let caches = Caches {
            users: Arc::new(RedisCache::new(
                manager.clone(),
                &cache_config.key_prefix,
                "users",
            )),
            ..Caches::in_memory(&cache_config)
        };
        Ok(Self::new(db, Arc::new(RedisBus::new(client, manager)), caches))
    }

    pub fn bus(&self) -> Arc<dyn PubSubBus> {
        self.bus.clone()
    }

    /// Routes every invalidation channel to the matching repository.
    pub fn invalidation_router() -> Result<PubSubRouter<AppContext>, RouterError> {
        repositories::invalidation_router()
    }
}

async fn connect_database(settings: &Settings) -> Result<Arc<dyn Database>, InfraError> {
    let Some(url) = settings.database.url.as_deref() else {
        warn!("No database URL configured; data is kept in an in-memory SQLite database");
        return Ok(Arc::new(SqliteDatabase::in_memory().await?));
    };

    if url.starts_with("sqlite:") {
        let db = SqliteDatabase::connect(url).await?;
        info!("Opened SQLite database");
        return Ok(Arc::new(db));
    }

    let pool = MySqlDatabase::connect(url, settings.database.max_connections.get()).await?;
    let db = MySqlDatabase::new(pool);
    db.health_check().await?;
    info!(
        max_connections = settings.database.max_connections.get(),
        "Connected to MySQL"
    );
    Ok(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_covers_every_invalidation_channel() {
        let router = AppContext::invalidation_router().expect("no duplicate channels");
        assert_eq!(
            router.channels(),
            vec![
                "rgdps:friend_requests:invalidate".to_string(),
                "rgdps:songs:invalidate".to_string(),
                "rgdps:user_comments:invalidate".to_string(),
                "rgdps:users:invalidate".to_string(),
            ]
        );
    }
}
