use std::sync::Arc;

use bytes::Bytes;

use super::{Entity, EntityRepository, Propagation};
use crate::application::changeset::ChangeSet;
use crate::application::persistence::{Database, FromValue, Params, RepoError, Row, Value};
use crate::cache::Cache;
use crate::context::AppContext;
use crate::domain::entities::Song;
use crate::domain::patch::Patch;
use crate::domain::types::SongSource;
use crate::pubsub::{HandlerError, PubSubRouter, RouterError, SONGS_CHANNEL};

impl From<SongSource> for Value {
    fn from(value: SongSource) -> Self {
        Value::Int(value.as_i64())
    }
}

impl FromValue for SongSource {
    fn from_value(value: &Value) -> Result<Self, String> {
        let raw = i64::from_value(value)?;
        SongSource::try_from(raw).map_err(|err| err.to_string())
    }
}

impl Entity for Song {
    const NAME: &'static str = "song";
    const TABLE: &'static str = "songs";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "author_id",
        "author",
        "author_youtube",
        "size",
        "download_url",
        "source",
        "blocked",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> Result<Self, RepoError> {
        Ok(Song {
            id: row.get("id")?,
            name: row.get("name")?,
            author_id: row.get("author_id")?,
            author: row.get("author")?,
            author_youtube: row.get("author_youtube")?,
            size: row.get("size")?,
            download_url: row.get("download_url")?,
            source: row.get("source")?,
            blocked: row.get("blocked")?,
        })
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("name", self.name.as_str())
            .with("author_id", self.author_id)
            .with("author", self.author.as_str())
            .with("author_youtube", self.author_youtube.clone())
            .with("size", self.size)
            .with("download_url", self.download_url.as_str())
            .with("source", self.source)
            .with("blocked", self.blocked)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSong {
    /// Explicit id (songs usually mirror an external catalogue); `0` lets
    /// the store assign one.
    pub song_id: i64,
    pub name: String,
    pub author_id: i64,
    pub author: String,
    pub author_youtube: Option<String>,
    pub size: f64,
    pub download_url: String,
    pub source: SongSource,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongPatch {
    pub name: Patch<String>,
    pub author_id: Patch<i64>,
    pub author: Patch<String>,
    pub author_youtube: Patch<Option<String>>,
    pub size: Patch<f64>,
    pub download_url: Patch<String>,
    pub source: Patch<SongSource>,
    pub blocked: Patch<bool>,
}

impl SongPatch {
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::new()
            .field("name", self.name)
            .field("author_id", self.author_id)
            .field("author", self.author)
            .field("author_youtube", self.author_youtube)
            .field("size", self.size)
            .field("download_url", self.download_url)
            .field("source", self.source)
            .field("blocked", self.blocked)
    }
}

/// Songs propagate writes over the bus so every process refreshes its own
/// copy.
#[derive(Clone)]
pub struct SongRepository {
    inner: EntityRepository<Song>,
}

impl SongRepository {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn Cache<Song>>, propagation: Propagation) -> Self {
        Self {
            inner: EntityRepository::new(db, cache, propagation),
        }
    }

    pub async fn from_id(&self, song_id: i64) -> Result<Option<Song>, RepoError> {
        self.inner.from_id(song_id).await
    }

    pub async fn create(&self, song: NewSong) -> Result<Song, RepoError> {
        self.inner
            .insert(Song {
                id: song.song_id,
                name: song.name,
                author_id: song.author_id,
                author: song.author,
                author_youtube: song.author_youtube,
                size: song.size,
                download_url: song.download_url,
                source: song.source,
                blocked: song.blocked,
            })
            .await
    }

    pub async fn update_partial(
        &self,
        song_id: i64,
        patch: SongPatch,
    ) -> Result<Option<Song>, RepoError> {
        self.inner
            .update_partial(song_id, patch.into_changes())
            .await
    }

    pub async fn get_count(&self) -> Result<i64, RepoError> {
        self.inner
            .fetch_count("SELECT COUNT(*) FROM songs", &Params::new())
            .await
    }

    pub async fn handle_invalidation(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.inner.handle_invalidation(payload).await
    }
}

pub(crate) fn router() -> Result<PubSubRouter<AppContext>, RouterError> {
    let mut router = PubSubRouter::new();
    router.register(SONGS_CHANNEL, |ctx: Arc<AppContext>, payload: Bytes| async move {
        ctx.songs.handle_invalidation(&payload).await
    })?;
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_decodes_from_integer_column() {
        assert_eq!(
            SongSource::from_value(&Value::Int(1)).unwrap(),
            SongSource::Newgrounds
        );
        assert!(SongSource::from_value(&Value::Int(9)).is_err());
    }

    #[test]
    fn blocking_a_song_touches_one_column() {
        let changes = SongPatch {
            blocked: Patch::Set(true),
            ..SongPatch::default()
        }
        .into_changes();

        assert_eq!(changes.columns().collect::<Vec<_>>(), ["blocked"]);
        assert_eq!(changes.get("blocked"), Some(&Value::Bool(true)));
    }
}
