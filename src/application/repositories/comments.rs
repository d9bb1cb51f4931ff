use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;

use super::{Entity, EntityRepository, Propagation, Scope, now_in_seconds, page_params};
use crate::application::changeset::ChangeSet;
use crate::application::persistence::{Database, Params, RepoError, Row};
use crate::cache::Cache;
use crate::context::AppContext;
use crate::domain::entities::UserComment;
use crate::domain::patch::Patch;
use crate::pubsub::{HandlerError, PubSubRouter, RouterError, USER_COMMENTS_CHANNEL};

impl Entity for UserComment {
    const NAME: &'static str = "user_comment";
    const TABLE: &'static str = "user_comments";
    const COLUMNS: &'static [&'static str] =
        &["id", "user_id", "content", "likes", "post_ts", "deleted"];
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
        Ok(UserComment {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            content: row.get("content")?,
            likes: row.get("likes")?,
            post_ts: row.get("post_ts")?,
            deleted: row.get("deleted")?,
        })
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("user_id", self.user_id)
            .with("content", self.content.as_str())
            .with("likes", self.likes)
            .with("post_ts", self.post_ts)
            .with("deleted", self.deleted)
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: i64,
    pub content: String,
    pub likes: i64,
    /// Defaults to the insertion time.
    pub post_ts: Option<OffsetDateTime>,
}

impl NewComment {
    pub fn new(user_id: i64, content: impl Into<String>) -> Self {
        Self {
            user_id,
            content: content.into(),
            likes: 0,
            post_ts: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPatch {
    pub content: Patch<String>,
    pub likes: Patch<i64>,
    pub deleted: Patch<bool>,
}

impl CommentPatch {
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::new()
            .field("content", self.content)
            .field("likes", self.likes)
            .field("deleted", self.deleted)
    }
}

type Repo = EntityRepository<UserComment>;

#[derive(Clone)]
pub struct CommentRepository {
    inner: Repo,
}

impl CommentRepository {
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<dyn Cache<UserComment>>,
        propagation: Propagation,
    ) -> Self {
        Self {
            inner: EntityRepository::new(db, cache, propagation),
        }
    }

    pub async fn from_id(
        &self,
        comment_id: i64,
        include_deleted: bool,
    ) -> Result<Option<UserComment>, RepoError> {
        self.inner
            .from_id_scoped(comment_id, Scope::from_include_deleted(include_deleted))
            .await
    }

    /// One page (zero-based) of a user's profile comments, newest first.
    pub async fn from_user_id_paginated(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
        include_deleted: bool,
    ) -> Result<Vec<UserComment>, RepoError> {
        let query = format!(
            "{} WHERE user_id = :user_id{} ORDER BY post_ts DESC LIMIT :limit OFFSET :offset",
            Repo::select_clause(),
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        let mut params = page_params(page, page_size)?;
        params.insert("user_id", user_id);

        self.inner.fetch_many(&query, &params).await
    }

    pub async fn get_user_comment_count(
        &self,
        user_id: i64,
        include_deleted: bool,
    ) -> Result<i64, RepoError> {
        let query = format!(
            "SELECT COUNT(*) FROM user_comments WHERE user_id = :user_id{}",
            Repo::deleted_condition(Scope::from_include_deleted(include_deleted))
        );
        self.inner
            .fetch_count(&query, &Params::new().with("user_id", user_id))
            .await
    }

    pub async fn create(&self, comment: NewComment) -> Result<UserComment, RepoError> {
        self.inner
            .insert(UserComment {
                id: 0,
                user_id: comment.user_id,
                content: comment.content,
                likes: comment.likes,
                post_ts: comment.post_ts.unwrap_or_else(now_in_seconds),
                deleted: false,
            })
            .await
    }

    pub async fn update_partial(
        &self,
        comment_id: i64,
        patch: CommentPatch,
    ) -> Result<Option<UserComment>, RepoError> {
        self.inner
            .update_partial(comment_id, patch.into_changes())
            .await
    }

    pub async fn handle_invalidation(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.inner.handle_invalidation(payload).await
    }
}

pub(crate) fn router() -> Result<PubSubRouter<AppContext>, RouterError> {
    let mut router = PubSubRouter::new();
    router.register(
        USER_COMMENTS_CHANNEL,
        |ctx: Arc<AppContext>, payload: Bytes| async move {
            ctx.comments.handle_invalidation(&payload).await
        },
    )?;
    Ok(router)
}
