use std::sync::Arc;

use rgdps::application::repositories::{NewSong, NewUser, SongPatch, UserPatch};
use rgdps::context::AppContext;
use rgdps::domain::patch::Patch;
use rgdps::domain::types::{PrivacySetting, SongSource, UserPrivileges};
use rgdps::infra::db::SqliteDatabase;
use rgdps::pubsub::MemoryBus;

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
async fn empty_patch_issues_no_write() {
    let (db, ctx) = context().await;
    let user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");
    ctx.users.from_id(user.id).await.expect("warm cache");

    let before = db.statement_count();
    let unchanged = ctx
        .users
        .update_partial(user.id, UserPatch::default())
        .await
        .expect("update");

    assert_eq!(unchanged, Some(user));
    assert_eq!(db.statement_count(), before);
}

#[tokio::test]
async fn only_set_fields_change() {
    let (db, ctx) = context().await;
    db.set_auto_increment("users", 42)
        .await
        .expect("seed auto increment");
    let user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");
    assert_eq!(user.id, 42);

    let updated = ctx
        .users
        .update_partial(
            42,
            UserPatch {
                stars: Patch::Set(5),
                message_privacy: Patch::Set(PrivacySetting::Friends),
                ..UserPatch::default()
            },
        )
        .await
        .expect("update")
        .expect("user exists");

    assert_eq!(updated.stars, 5);
    assert_eq!(updated.message_privacy, PrivacySetting::Friends);
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.email, "alice@example.com");
    assert_eq!(updated.secondary_colour, 4);

    // Users write through, so the cache already holds the new state.
    let before = db.statement_count();
    let cached = ctx.users.from_id(42).await.expect("lookup");
    assert_eq!(cached, Some(updated));
    assert_eq!(db.statement_count(), before);
}

#[tokio::test]
async fn nullable_column_can_be_cleared() {
    let (_, ctx) = context().await;
    let user = ctx
        .users
        .create(NewUser {
            youtube_name: Some("channel".to_string()),
            ..NewUser::new("alice", "alice@example.com", "hash")
        })
        .await
        .expect("create user");

    let updated = ctx
        .users
        .update_partial(
            user.id,
            UserPatch {
                youtube_name: Patch::Set(None),
                ..UserPatch::default()
            },
        )
        .await
        .expect("update")
        .expect("user exists");

    assert_eq!(updated.youtube_name, None);
}

#[tokio::test]
async fn widest_privilege_set_survives_a_round_trip() {
    let (_, ctx) = context().await;
    let user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");
    let widest = UserPrivileges::from_bits(u64::MAX >> 1).expect("63 bits fit");

    let updated = ctx
        .users
        .update_partial(
            user.id,
            UserPatch {
                privileges: Patch::Set(widest),
                ..UserPatch::default()
            },
        )
        .await
        .expect("update")
        .expect("user exists");
    assert_eq!(updated.privileges, widest);

    let stored = ctx
        .users
        .from_db(user.id)
        .await
        .expect("decode stored privileges")
        .expect("user exists");
    assert_eq!(stored.privileges, widest);
}

#[tokio::test]
async fn updating_a_missing_row_yields_none() {
    let (_, ctx) = context().await;
    let result = ctx
        .users
        .update_partial(
            999,
            UserPatch {
                stars: Patch::Set(1),
                ..UserPatch::default()
            },
        )
        .await
        .expect("update");

    assert!(result.is_none());
    assert!(ctx.users.from_id(999).await.expect("lookup").is_none());
}

#[tokio::test]
async fn full_update_overwrites_every_column() {
    let (db, ctx) = context().await;
    let mut user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");

    user.demons = 3;
    user.glow = true;
    ctx.users.update_full(&user).await.expect("overwrite");

    let before = db.statement_count();
    assert_eq!(ctx.users.from_id(user.id).await.unwrap(), Some(user.clone()));
    assert_eq!(db.statement_count(), before);
    assert_eq!(ctx.users.from_db(user.id).await.unwrap(), Some(user));
}

#[tokio::test]
async fn bus_propagated_update_evicts_local_copy() {
    let (db, ctx) = context().await;
    let song = ctx
        .songs
        .create(NewSong {
            song_id: 1001,
            name: "Stereo Madness".to_string(),
            author_id: 1,
            author: "ForeverBound".to_string(),
            author_youtube: None,
            size: 2.5,
            download_url: "https://example.com/1001.mp3".to_string(),
            source: SongSource::Newgrounds,
            blocked: false,
        })
        .await
        .expect("create song");
    assert_eq!(song.id, 1001);
    ctx.songs.from_id(song.id).await.expect("warm cache");

    let updated = ctx
        .songs
        .update_partial(
            song.id,
            SongPatch {
                blocked: Patch::Set(true),
                ..SongPatch::default()
            },
        )
        .await
        .expect("update")
        .expect("song exists");
    assert!(updated.blocked);
    assert_eq!(updated.name, "Stereo Madness");

    let before = db.statement_count();
    let reloaded = ctx.songs.from_id(song.id).await.expect("lookup");
    assert_eq!(reloaded, Some(updated));
    assert_eq!(db.statement_count(), before + 1);
}
