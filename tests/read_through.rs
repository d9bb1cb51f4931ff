use std::sync::Arc;

use rgdps::application::persistence::RepoError;
use rgdps::application::repositories::{
    CommentPatch, FriendRequestPatch, NewComment, NewFriendRequest, NewUser,
};
use rgdps::context::AppContext;
use rgdps::domain::patch::Patch;
use rgdps::infra::db::SqliteDatabase;
use rgdps::pubsub::MemoryBus;
use time::macros::datetime;

async fn context() -> (Arc<SqliteDatabase>, AppContext) {
    let db = Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("in-memory sqlite should open"),
    );
    let ctx = AppContext::in_memory(db.clone(), Arc::new(MemoryBus::new()));
    (db, ctx)
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let (db, ctx) = context().await;
    let user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");

    let loaded = ctx
        .users
        .from_id(user.id)
        .await
        .expect("lookup")
        .expect("user exists");
    assert_eq!(loaded, user);

    let before = db.statement_count();
    let cached = ctx.users.from_id(user.id).await.expect("lookup");
    assert_eq!(cached, Some(user));
    assert_eq!(db.statement_count(), before);
}

#[tokio::test]
async fn missing_rows_are_not_cached() {
    let (db, ctx) = context().await;

    assert!(ctx.users.from_id(999).await.expect("lookup").is_none());
    let before = db.statement_count();
    assert!(ctx.users.from_id(999).await.expect("lookup").is_none());
    assert_eq!(db.statement_count(), before + 1);
}

#[tokio::test]
async fn username_lookup_resolves_through_cache() {
    let (_, ctx) = context().await;
    let user = ctx
        .users
        .create(NewUser::new("bob", "bob@example.com", "hash"))
        .await
        .expect("create user");

    let found = ctx.users.from_name("bob").await.expect("lookup");
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(ctx.users.from_name("carol").await.expect("lookup").is_none());

    assert!(ctx.users.check_username_exists("bob").await.unwrap());
    assert!(ctx.users.check_email_exists("bob@example.com").await.unwrap());
    assert!(!ctx.users.check_email_exists("nobody@example.com").await.unwrap());
    assert_eq!(ctx.users.get_count().await.unwrap(), 1);
}

#[tokio::test]
async fn soft_deleted_comment_is_hidden_by_default() {
    let (_, ctx) = context().await;
    let comment = ctx
        .comments
        .create(NewComment::new(7, "first"))
        .await
        .expect("create comment");

    let updated = ctx
        .comments
        .update_partial(
            comment.id,
            CommentPatch {
                deleted: Patch::Set(true),
                ..CommentPatch::default()
            },
        )
        .await
        .expect("soft delete")
        .expect("row still exists");
    assert!(updated.deleted);

    assert!(
        ctx.comments
            .from_id(comment.id, false)
            .await
            .expect("lookup")
            .is_none()
    );
    let hidden = ctx
        .comments
        .from_id(comment.id, true)
        .await
        .expect("lookup")
        .expect("visible with include_deleted");
    assert!(hidden.deleted);
    assert_eq!(hidden.content, "first");

    // The cached copy is deleted now, so an active lookup still hides it.
    assert!(
        ctx.comments
            .from_id(comment.id, false)
            .await
            .expect("lookup")
            .is_none()
    );
    assert_eq!(ctx.comments.get_user_comment_count(7, false).await.unwrap(), 0);
    assert_eq!(ctx.comments.get_user_comment_count(7, true).await.unwrap(), 1);
}

#[tokio::test]
async fn empty_patch_sees_soft_deleted_rows_like_a_real_update() {
    let (db, ctx) = context().await;
    let comment = ctx
        .comments
        .create(NewComment::new(7, "first"))
        .await
        .expect("create comment");
    let soft_delete = CommentPatch {
        deleted: Patch::Set(true),
        ..CommentPatch::default()
    };
    ctx.comments
        .update_partial(comment.id, soft_delete.clone())
        .await
        .expect("soft delete");

    let before = db.statement_count();
    let unchanged = ctx
        .comments
        .update_partial(comment.id, CommentPatch::default())
        .await
        .expect("empty update")
        .expect("deleted row is still returned");
    assert!(unchanged.deleted);
    assert_eq!(db.statement_count(), before + 1);

    let again = ctx
        .comments
        .update_partial(comment.id, soft_delete)
        .await
        .expect("repeat soft delete")
        .expect("deleted row is still returned");
    assert_eq!(again, unchanged);
}

#[tokio::test]
async fn comment_pages_are_newest_first_and_bounded() {
    let (_, ctx) = context().await;
    for (content, ts) in [
        ("old", datetime!(2024-01-01 10:00 UTC)),
        ("new", datetime!(2024-01-03 10:00 UTC)),
        ("mid", datetime!(2024-01-02 10:00 UTC)),
    ] {
        ctx.comments
            .create(NewComment {
                post_ts: Some(ts),
                ..NewComment::new(7, content)
            })
            .await
            .expect("create comment");
    }

    let page = ctx
        .comments
        .from_user_id_paginated(7, 0, 2, false)
        .await
        .expect("first page");
    let contents: Vec<&str> = page.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, ["new", "mid"]);

    let tail = ctx
        .comments
        .from_user_id_paginated(7, 1, 2, false)
        .await
        .expect("second page");
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].content, "old");

    let err = ctx
        .comments
        .from_user_id_paginated(7, i64::MAX, 10, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput { .. }), "{err:?}");
    let err = ctx
        .friend_requests
        .from_user_id_paginated(2, -1, 10, false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput { .. }), "{err:?}");
}

#[tokio::test]
async fn friend_request_queries_respect_deletion_and_seen_state() {
    let (_, ctx) = context().await;
    let first = ctx
        .friend_requests
        .create(NewFriendRequest::new(1, 2, "hi"))
        .await
        .expect("create request");
    ctx.friend_requests
        .create(NewFriendRequest::new(3, 2, "hello"))
        .await
        .expect("create request");

    assert_eq!(
        ctx.friend_requests
            .get_user_friend_request_count(2, false, true, false)
            .await
            .unwrap(),
        2
    );

    ctx.friend_requests
        .update_partial(
            first.id,
            FriendRequestPatch {
                seen_ts: Patch::Set(Some(first.post_ts)),
                ..FriendRequestPatch::default()
            },
        )
        .await
        .expect("mark seen");
    assert_eq!(
        ctx.friend_requests
            .get_user_friend_request_count(2, false, true, false)
            .await
            .unwrap(),
        1
    );

    let found = ctx
        .friend_requests
        .from_target_and_recipient(1, 2, false)
        .await
        .expect("lookup")
        .expect("request exists");
    assert_eq!(found.seen_ts, Some(first.post_ts));

    ctx.friend_requests
        .update_partial(
            first.id,
            FriendRequestPatch {
                deleted: Patch::Set(true),
                ..FriendRequestPatch::default()
            },
        )
        .await
        .expect("soft delete");

    assert!(
        !ctx.friend_requests
            .check_request_exists(1, 2, false)
            .await
            .unwrap()
    );
    assert!(
        ctx.friend_requests
            .check_request_exists(1, 2, true)
            .await
            .unwrap()
    );
    let inbox = ctx
        .friend_requests
        .from_user_id(2, false, false)
        .await
        .expect("list");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].sender_user_id, 3);
}
