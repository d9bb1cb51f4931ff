use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use rgdps::application::repositories::NewUser;
use rgdps::cache::{Cache, CacheKey, MemoryCache};
use rgdps::context::AppContext;
use rgdps::infra::db::SqliteDatabase;
use rgdps::pubsub::MemoryBus;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let db = SqliteDatabase::in_memory()
        .await
        .expect("in-memory sqlite should open");
    let ctx = AppContext::in_memory(Arc::new(db), Arc::new(MemoryBus::new()));
    let user = ctx
        .users
        .create(NewUser::new("alice", "alice@example.com", "hash"))
        .await
        .expect("create user");
    ctx.users.from_id(user.id).await.expect("miss");
    ctx.users.from_id(user.id).await.expect("hit");
    ctx.users.from_id(user.id).await.expect("hit");

    let tiny = MemoryCache::new("tiny", NonZeroUsize::MIN);
    tiny.set(CacheKey::Id(1), 1_u8).await.unwrap();
    tiny.set(CacheKey::Id(2), 2_u8).await.unwrap();

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "rgdps_cache_hit_total",
        "rgdps_cache_miss_total",
        "rgdps_cache_evict_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let user_hits = snapshot
        .iter()
        .find_map(|(composite_key, _, _, value)| {
            let key = composite_key.key();
            let is_user = key
                .labels()
                .any(|label| label.key() == "entity" && label.value() == "user");
            (key.name() == "rgdps_cache_hit_total" && is_user).then_some(value)
        })
        .expect("user hit counter");
    assert!(matches!(user_hits, DebugValue::Counter(2)), "{user_hits:?}");
}
