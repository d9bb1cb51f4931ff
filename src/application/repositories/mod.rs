//! Cached entity repositories.
//!
//! Every repository wraps an [`EntityRepository`], which owns the
//! read-through cache logic and the partial update path shared by all
//! entity types:
//!
//! - reads check the cache first and populate it on a miss;
//! - writes persist, re-read the row and then propagate the fresh state,
//!   either straight into the cache or through a pub/sub invalidation event.
//!
//! Two concurrent partial updates of the same id are not serialized. The row
//! ends up with the last write, and the cache may briefly hold either
//! writer's re-read.

mod comments;
mod friend_requests;
mod songs;
mod users;

pub use comments::{CommentPatch, CommentRepository, NewComment};
pub use friend_requests::{FriendRequestPatch, FriendRequestRepository, NewFriendRequest};
pub use songs::{NewSong, SongPatch, SongRepository};
pub use users::{NewUser, UserPatch, UserRepository};

use std::sync::Arc;

use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument, warn};

use crate::application::changeset::ChangeSet;
use crate::application::persistence::{Database, FromValue, Params, RepoError, Row};
use crate::cache::{Cache, CacheKey};
use crate::context::AppContext;
use crate::pubsub::{
    HandlerError, InvalidationAction, InvalidationEvent, PubSubBus, PubSubRouter, RouterError,
};

const METRIC_CACHE_HIT_TOTAL: &str = "rgdps_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "rgdps_cache_miss_total";

/// Invalidation routes of every repository, merged into one router.
pub fn invalidation_router() -> Result<PubSubRouter<AppContext>, RouterError> {
    PubSubRouter::merge_all([
        users::router()?,
        friend_requests::router()?,
        songs::router()?,
        comments::router()?,
    ])
}

/// Current UTC time truncated to whole seconds, the precision of `DATETIME` columns.
pub(crate) fn now_in_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// `LIMIT` and `OFFSET` binds for a zero-based page.
pub(crate) fn page_params(page: i64, page_size: i64) -> Result<Params, RepoError> {
    if page < 0 || page_size < 0 {
        return Err(RepoError::InvalidInput {
            message: format!("page {page} and page size {page_size} must not be negative"),
        });
    }
    let offset = page
        .checked_mul(page_size)
        .ok_or_else(|| RepoError::InvalidInput {
            message: format!("page {page} of size {page_size} is out of range"),
        })?;
    Ok(Params::new().with("limit", page_size).with("offset", offset))
}

/// A persisted type with an `i64` primary key stored in a single table.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Label used in logs and metrics.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Every column, `id` first.
    const COLUMNS: &'static [&'static str];
    /// Whether the table carries a `deleted` flag.
    const SOFT_DELETE: bool = false;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    fn is_deleted(&self) -> bool {
        false
    }

    fn from_row(row: &Row) -> Result<Self, RepoError>;

    /// Every column except `id`.
    fn to_params(&self) -> Params;
}

/// Whether soft-deleted rows are visible to a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Active,
    IncludeDeleted,
}

impl Scope {
    pub fn from_include_deleted(include_deleted: bool) -> Self {
        if include_deleted {
            Scope::IncludeDeleted
        } else {
            Scope::Active
        }
    }

    fn filters_deleted<E: Entity>(self) -> bool {
        E::SOFT_DELETE && self == Scope::Active
    }
}

/// How a successful write reaches the caches.
#[derive(Clone)]
pub enum Propagation {
    /// Overwrite (or evict) the cache entry right after the write. Suits a
    /// cache shared by every process.
    Synchronous,
    /// Evict locally, then publish a refresh on `channel` so every process
    /// reloads its own copy.
    Bus {
        bus: Arc<dyn PubSubBus>,
        channel: &'static str,
    },
}

/// Read-through cache plus persistence for one entity type.
pub struct EntityRepository<E: Entity> {
    db: Arc<dyn Database>,
    cache: Arc<dyn Cache<E>>,
    propagation: Propagation,
}

impl<E: Entity> Clone for EntityRepository<E> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            cache: Arc::clone(&self.cache),
            propagation: self.propagation.clone(),
        }
    }
}

impl<E: Entity> EntityRepository<E> {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn Cache<E>>, propagation: Propagation) -> Self {
        Self {
            db,
            cache,
            propagation,
        }
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    /// `SELECT <all columns> FROM <table>`, ready for a `WHERE` clause.
    pub fn select_clause() -> String {
        format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
    }

    /// ` AND deleted = 0` when `scope` hides soft-deleted rows, else empty.
    pub fn deleted_condition(scope: Scope) -> &'static str {
        if scope.filters_deleted::<E>() {
            " AND deleted = 0"
        } else {
            ""
        }
    }

    pub async fn from_id(&self, id: i64) -> Result<Option<E>, RepoError> {
        self.from_id_scoped(id, Scope::Active).await
    }

    /// Cached lookup by primary key. Misses are filled from the store;
    /// absent rows are not cached.
    #[instrument(skip(self), fields(entity = E::NAME))]
    pub async fn from_id_scoped(&self, id: i64, scope: Scope) -> Result<Option<E>, RepoError> {
        let key = CacheKey::Id(id);
        match self.cache.get(&key).await {
            Ok(Some(entity)) => {
                counter!(METRIC_CACHE_HIT_TOTAL, "entity" => E::NAME).increment(1);
                if scope.filters_deleted::<E>() && entity.is_deleted() {
                    return Ok(None);
                }
                return Ok(Some(entity));
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Cache read failed; falling back to store"),
        }
        counter!(METRIC_CACHE_MISS_TOTAL, "entity" => E::NAME).increment(1);

        let Some(entity) = self.from_db(id, scope).await? else {
            return Ok(None);
        };

        if let Err(err) = self.cache.set(key, entity.clone()).await {
            warn!(error = %err, "Failed to populate cache");
        }
        Ok(Some(entity))
    }

    /// Uncached lookup by primary key.
    pub async fn from_db(&self, id: i64, scope: Scope) -> Result<Option<E>, RepoError> {
        let query = format!(
            "{} WHERE id = :id{}",
            Self::select_clause(),
            Self::deleted_condition(scope)
        );
        let params = Params::new().with("id", id);

        self.db
            .fetch_one(&query, &params)
            .await?
            .map(|row| E::from_row(&row))
            .transpose()
    }

    /// Resolves a secondary key to an id with an uncached query whose first
    /// column is the id.
    pub async fn lookup_id(&self, query: &str, params: &Params) -> Result<Option<i64>, RepoError> {
        self.db
            .fetch_val(query, params)
            .await?
            .map(|value| i64::from_value(&value).map_err(|message| RepoError::decode("id", message)))
            .transpose()
    }

    /// Uncached list query; rows must carry every column.
    pub async fn fetch_many(&self, query: &str, params: &Params) -> Result<Vec<E>, RepoError> {
        self.db
            .fetch_all(query, params)
            .await?
            .iter()
            .map(E::from_row)
            .collect()
    }

    /// Scalar integer query such as `COUNT(*)`; no row counts as zero.
    pub async fn fetch_count(&self, query: &str, params: &Params) -> Result<i64, RepoError> {
        match self.db.fetch_val(query, params).await? {
            Some(value) => {
                i64::from_value(&value).map_err(|message| RepoError::decode("count", message))
            }
            None => Ok(0),
        }
    }

    pub async fn fetch_exists(&self, query: &str, params: &Params) -> Result<bool, RepoError> {
        match self.db.fetch_val(query, params).await? {
            Some(value) => {
                bool::from_value(&value).map_err(|message| RepoError::decode("exists", message))
            }
            None => Ok(false),
        }
    }

    /// Inserts `entity` and returns it carrying the stored id. A non-zero id
    /// is inserted as given. The cache is left alone.
    #[instrument(skip_all, fields(entity = E::NAME))]
    pub async fn insert(&self, mut entity: E) -> Result<E, RepoError> {
        let values = entity.to_params();
        let mut columns = Vec::with_capacity(E::COLUMNS.len());
        let mut params = Params::new();
        if entity.id() != 0 {
            columns.push("id");
            params.insert("id", entity.id());
        }
        for (column, value) in values.iter() {
            columns.push(column);
            params.insert(column, value.clone());
        }

        let placeholders = columns
            .iter()
            .map(|column| format!(":{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            E::TABLE,
            columns.join(", ")
        );

        let generated = self.db.execute(&query, &params).await?;
        if generated != 0 {
            entity.set_id(generated);
        }
        debug!(id = entity.id(), "Inserted entity");
        Ok(entity)
    }

    /// Writes only the columns in `changes`, then re-reads the row and
    /// propagates it. An empty change set is a plain cached read. Either way
    /// soft-deleted rows are returned.
    #[instrument(skip(self, changes), fields(entity = E::NAME, columns = changes.len()))]
    pub async fn update_partial(&self, id: i64, changes: ChangeSet) -> Result<Option<E>, RepoError> {
        if changes.is_empty() {
            return self.from_id_scoped(id, Scope::IncludeDeleted).await;
        }

        let (query, params) = changes.update_statement(E::TABLE, id);
        self.db.execute(&query, &params).await?;

        let refreshed = self.from_db(id, Scope::IncludeDeleted).await?;
        self.propagate(id, refreshed.as_ref()).await;
        Ok(refreshed)
    }

    /// Writes every column of `entity` unconditionally, then caches it as is.
    #[instrument(skip_all, fields(entity = E::NAME, id = entity.id()))]
    pub async fn overwrite(&self, entity: &E) -> Result<(), RepoError> {
        let params = entity.to_params();
        let assignments = params
            .iter()
            .map(|(column, _)| format!("{column} = :{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!("UPDATE {} SET {assignments} WHERE id = :id", E::TABLE);

        self.db
            .execute(&query, &params.with("id", entity.id()))
            .await?;
        self.propagate(entity.id(), Some(entity)).await;
        Ok(())
    }

    /// Reloads `id` from the store into the cache, evicting it if the row is gone.
    pub async fn refresh(&self, id: i64) -> Result<(), HandlerError> {
        let key = CacheKey::Id(id);
        match self.from_db(id, Scope::IncludeDeleted).await? {
            Some(entity) => self.cache.set(key, entity).await?,
            None => self.cache.delete(&key).await?,
        }
        Ok(())
    }

    pub async fn evict(&self, id: i64) -> Result<(), HandlerError> {
        self.cache.delete(&CacheKey::Id(id)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(entity = E::NAME, event = %event.id, id = event.entity_id))]
    pub async fn apply_invalidation(&self, event: &InvalidationEvent) -> Result<(), HandlerError> {
        match event.action {
            InvalidationAction::Refresh => self.refresh(event.entity_id).await,
            InvalidationAction::Evict => self.evict(event.entity_id).await,
        }
    }

    /// Decodes a raw bus payload and applies it.
    pub async fn handle_invalidation(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event = InvalidationEvent::decode(payload)?;
        self.apply_invalidation(&event).await
    }

    async fn propagate(&self, id: i64, entity: Option<&E>) {
        let key = CacheKey::Id(id);
        match &self.propagation {
            Propagation::Synchronous => {
                let outcome = match entity {
                    Some(entity) => self.cache.set(key, entity.clone()).await,
                    None => self.cache.delete(&key).await,
                };
                if let Err(err) = outcome {
                    warn!(entity = E::NAME, id, error = %err, "Failed to update cache after write");
                }
            }
            Propagation::Bus { bus, channel } => {
                if let Err(err) = self.cache.delete(&key).await {
                    warn!(entity = E::NAME, id, error = %err, "Failed to evict cache after write");
                }

                let event = InvalidationEvent::refresh(id);
                let published = match event.encode() {
                    Ok(payload) => bus.publish(channel, payload).await,
                    Err(err) => Err(err),
                };
                match published {
                    Ok(()) => debug!(entity = E::NAME, id, event = %event.id, channel, "Published invalidation"),
                    Err(err) => warn!(
                        entity = E::NAME,
                        id,
                        channel,
                        error = %err,
                        "Failed to publish invalidation"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::persistence::Value;

    #[test]
    fn page_params_compute_offset() {
        let params = page_params(3, 20).unwrap();
        assert_eq!(params.get("limit"), Some(&Value::Int(20)));
        assert_eq!(params.get("offset"), Some(&Value::Int(60)));
    }

    #[test]
    fn page_params_reject_overflow_and_negatives() {
        for (page, page_size) in [(i64::MAX, 10), (-1, 10), (0, -5)] {
            assert!(
                matches!(
                    page_params(page, page_size),
                    Err(RepoError::InvalidInput { .. })
                ),
                "page {page} size {page_size}"
            );
        }
    }
}
