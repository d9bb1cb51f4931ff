use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;

use super::{Entity, EntityRepository, Propagation, Scope, now_in_seconds, page_params};
use crate::application::changeset::ChangeSet;
use crate::application::persistence::{Database, Params, RepoError, Row};
use crate::cache::Cache;
use crate::context::AppContext;
use crate::domain::entities::FriendRequest;
use crate::domain::patch::Patch;
use crate::pubsub::{FRIEND_REQUESTS_CHANNEL, HandlerError, PubSubRouter, RouterError};

impl Entity for FriendRequest {
    const NAME: &'static str = "friend_request";
    const TABLE: &'static str = "friend_requests";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "sender_user_id",
        "recipient_user_id",
        "message",
        "post_ts",
        "seen_ts",
        "deleted",
    ];
    const SOFT_DELETE: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn from_row(row: &Row) -> Result<Self, RepoError> {
        Ok(FriendRequest {
            id: row.get("id")?,
            sender_user_id: row.get("sender_user_id")?,
            recipient_user_id: row.get("recipient_user_id")?,
            message: row.get("message")?,
            post_ts: row.get("post_ts")?,
            seen_ts: row.get("seen_ts")?,
            deleted: row.get("deleted")?,
        })
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("sender_user_id", self.sender_user_id)
            .with("recipient_user_id", self.recipient_user_id)
            .with("message", self.message.as_str())
            .with("post_ts", self.post_ts)
            .with("seen_ts", self.seen_ts)
            .with("deleted", self.deleted)
    }
}

#[derive(Debug, Clone)]
pub struct NewFriendRequest {
    pub sender_user_id: i64,
    pub recipient_user_id: i64,
    pub message: String,
    /// Defaults to the insertion time.
    pub post_ts: Option<OffsetDateTime>,
    pub seen_ts: Option<OffsetDateTime>,
}

impl NewFriendRequest {
    pub fn new(sender_user_id: i64, recipient_user_id: i64, message: impl Into<String>) -> Self {
        Self {
            sender_user_id,
            recipient_user_id,
            message: message.into(),
            post_ts: None,
            seen_ts: None,
        }
    }
}

/// Sparse update of a friend request. Setting `deleted` soft-deletes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendRequestPatch {
    pub seen_ts: Patch<Option<OffsetDateTime>>,
    pub deleted: Patch<bool>,
}

impl FriendRequestPatch {
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::new()
            .field("seen_ts", self.seen_ts)
            .field("deleted", self.deleted)
    }
}

/// Which side of the request a user id refers to.
fn user_column(is_sender_user_id: bool) -> &'static str {
    if is_sender_user_id {
        "sender_user_id"
    } else {
        "recipient_user_id"
    }
}

type Repo = EntityRepository<FriendRequest>;

#[derive(Clone)]
pub struct FriendRequestRepository {
    inner: Repo,
}

impl FriendRequestRepository {
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<dyn Cache<FriendRequest>>,
        propagation: Propagation,
    ) -> Self {
        Self {
            inner: EntityRepository::new(db, cache, propagation),
        }
    }

    pub async fn from_id(
        &self,
        request_id: i64,
        include_deleted: bool,
    ) -> Result<Option<FriendRequest>, RepoError> {
        self.inner
            .from_id_scoped(request_id, Scope::from_include_deleted(include_deleted))
            .await
    }

    pub async fn from_target_and_recipient(
        &self,
        sender_user_id: i64,
        recipient_user_id: i64,
        include_deleted: bool,
    ) -> Result<Option<FriendRequest>, RepoError> {
        let scope = Scope::from_include_deleted(include_deleted);
        let query = format!(
            "SELECT id FROM friend_requests WHERE sender_user_id = :sender_user_id \
             AND recipient_user_id = :recipient_user_id{}",
            Repo::deleted_condition(scope)
        );
        let params = Params::new()
            .with("sender_user_id", sender_user_id)
            .with("recipient_user_id", recipient_user_id);

        match self.inner.lookup_id(&query, &params).await? {
            Some(request_id) => self.inner.from_id_scoped(request_id, scope).await,
            None => Ok(None),
        }
    }

    /// Every request sent by (or addressed to) `user_id`, newest first.
    pub async fn from_user_id(
        &self,
        user_id: i64,
        is_sender_user_id: bool,
        include_deleted: bool,
    ) -> Result<Vec<FriendRequest>, RepoError> {
        let query = format!(
            "{} WHERE {} = :user_id{} ORDER BY post_ts DESC",
            Repo::select_clause(),
            user_column(is_sender_user_id),
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        self.inner
            .fetch_many(&query, &Params::new().with("user_id", user_id))
            .await
    }

    /// One page (zero-based) of [`Self::from_user_id`].
    pub async fn from_user_id_paginated(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
        is_sender_user_id: bool,
        include_deleted: bool,
    ) -> Result<Vec<FriendRequest>, RepoError> {
        let query = format!(
            "{} WHERE {} = :user_id{} ORDER BY post_ts DESC LIMIT :limit OFFSET :offset",
            Repo::select_clause(),
            user_column(is_sender_user_id),
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        let mut params = page_params(page, page_size)?;
        params.insert("user_id", user_id);

        self.inner.fetch_many(&query, &params).await
    }

    /// Counts requests for `user_id`; `is_new` restricts to unseen ones.
    pub async fn get_user_friend_request_count(
        &self,
        user_id: i64,
        is_sender_user_id: bool,
        is_new: bool,
        include_deleted: bool,
    ) -> Result<i64, RepoError> {
        let unseen = if is_new { " AND seen_ts IS NULL" } else { "" };
        let query = format!(
            "SELECT COUNT(*) FROM friend_requests WHERE {} = :user_id{}{unseen}",
            user_column(is_sender_user_id),
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        self.inner
            .fetch_count(&query, &Params::new().with("user_id", user_id))
            .await
    }

    pub async fn check_request_exists(
        &self,
        sender_user_id: i64,
        recipient_user_id: i64,
        include_deleted: bool,
    ) -> Result<bool, RepoError> {
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM friend_requests WHERE sender_user_id = :sender_user_id \
             AND recipient_user_id = :recipient_user_id{})",
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        let params = Params::new()
            .with("sender_user_id", sender_user_id)
            .with("recipient_user_id", recipient_user_id);

        self.inner.fetch_exists(&query, &params).await
    }

    pub async fn create(&self, request: NewFriendRequest) -> Result<FriendRequest, RepoError> {
        self.inner
            .insert(FriendRequest {
                id: 0,
                sender_user_id: request.sender_user_id,
                recipient_user_id: request.recipient_user_id,
                message: request.message,
                post_ts: request.post_ts.unwrap_or_else(now_in_seconds),
                seen_ts: request.seen_ts,
                deleted: false,
            })
            .await
    }

    /// The returned request may be soft-deleted; `None` means the row is gone.
    pub async fn update_partial(
        &self,
        request_id: i64,
        patch: FriendRequestPatch,
    ) -> Result<Option<FriendRequest>, RepoError> {
        self.inner
            .update_partial(request_id, patch.into_changes())
            .await
    }

    pub async fn get_count(&self) -> Result<i64, RepoError> {
        self.inner
            .fetch_count("SELECT COUNT(*) FROM friend_requests", &Params::new())
            .await
    }

    pub async fn handle_invalidation(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.inner.handle_invalidation(payload).await
    }
}

pub(crate) fn router() -> Result<PubSubRouter<AppContext>, RouterError> {
    let mut router = PubSubRouter::new();
    router.register(
        FRIEND_REQUESTS_CHANNEL,
        |ctx: Arc<AppContext>, payload: Bytes| async move {
            ctx.friend_requests.handle_invalidation(&payload).await
        },
    )?;
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_scope_hides_deleted_rows() {
        assert_eq!(Repo::deleted_condition(Scope::Active), " AND deleted = 0");
        assert_eq!(Repo::deleted_condition(Scope::IncludeDeleted), "");
    }

    #[test]
    fn soft_delete_patch_writes_only_flag() {
        let changes = FriendRequestPatch {
            deleted: Patch::Set(true),
            ..FriendRequestPatch::default()
        }
        .into_changes();

        let (query, _) = changes.update_statement(FriendRequest::TABLE, 3);
        assert_eq!(query, "UPDATE friend_requests SET deleted = :deleted WHERE id = :id");
    }
}
