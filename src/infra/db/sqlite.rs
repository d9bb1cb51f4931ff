//! SQLite adapter for local runs and tests.
//!
//! `sqlite::memory:` databases live as long as the pool's single connection,
//! so the in-memory constructor pins one connection open for the pool's
//! lifetime. The schema mirrors the MySQL tables the repositories target.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    Column, Row as _, Sqlite, TypeInfo, ValueRef,
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, trace};

use crate::application::persistence::{Database, Params, RepoError, Row, Value};

use super::map_sqlx_error;
use super::params::expand_named;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    password TEXT NOT NULL,
    privileges INTEGER NOT NULL,
    message_privacy INTEGER NOT NULL DEFAULT 0,
    friend_privacy INTEGER NOT NULL DEFAULT 0,
    comment_privacy INTEGER NOT NULL DEFAULT 0,
    twitter_name TEXT,
    youtube_name TEXT,
    twitch_name TEXT,
    register_ts DATETIME NOT NULL,
    stars INTEGER NOT NULL DEFAULT 0,
    demons INTEGER NOT NULL DEFAULT 0,
    primary_colour INTEGER NOT NULL DEFAULT 0,
    secondary_colour INTEGER NOT NULL DEFAULT 4,
    display_type INTEGER NOT NULL DEFAULT 0,
    icon INTEGER NOT NULL DEFAULT 0,
    ship INTEGER NOT NULL DEFAULT 0,
    ball INTEGER NOT NULL DEFAULT 0,
    ufo INTEGER NOT NULL DEFAULT 0,
    wave INTEGER NOT NULL DEFAULT 0,
    robot INTEGER NOT NULL DEFAULT 0,
    spider INTEGER NOT NULL DEFAULT 0,
    explosion INTEGER NOT NULL DEFAULT 0,
    glow BOOLEAN NOT NULL DEFAULT 0,
    creator_points INTEGER NOT NULL DEFAULT 0,
    coins INTEGER NOT NULL DEFAULT 0,
    user_coins INTEGER NOT NULL DEFAULT 0,
    diamonds INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

CREATE TABLE IF NOT EXISTS friend_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_user_id INTEGER NOT NULL,
    recipient_user_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    post_ts DATETIME NOT NULL,
    seen_ts DATETIME,
    deleted BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_friend_requests_pair
    ON friend_requests(sender_user_id, recipient_user_id);
CREATE INDEX IF NOT EXISTS idx_friend_requests_recipient ON friend_requests(recipient_user_id);

CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    author_id INTEGER NOT NULL,
    author TEXT NOT NULL,
    author_youtube TEXT,
    size REAL NOT NULL,
    download_url TEXT NOT NULL,
    source INTEGER NOT NULL,
    blocked BOOLEAN NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    likes INTEGER NOT NULL DEFAULT 0,
    post_ts DATETIME NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_user_comments_user_ts ON user_comments(user_id, post_ts);
"#;

pub struct SqliteDatabase {
    pool: SqlitePool,
    statements: AtomicU64,
}

impl SqliteDatabase {
    /// Fresh private database that disappears with the pool.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        Self::with_schema(pool).await
    }

    /// Opens (creating if missing) the database file named by a `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_schema(pool).await
    }

    async fn with_schema(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        debug!("SQLite schema ready");
        Ok(Self {
            pool,
            statements: AtomicU64::new(0),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of repository statements run so far, reads and writes alike.
    pub fn statement_count(&self) -> u64 {
        self.statements.load(Ordering::SeqCst)
    }

    /// Makes the next generated id of `table` equal to `next_id`.
    pub async fn set_auto_increment(&self, table: &str, next_id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(table)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)")
            .bind(table)
            .bind(next_id.saturating_sub(1))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn prepare(&self, query: &str, params: &Params) -> Result<(String, Vec<Value>), RepoError> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        trace!(query, "Running SQLite statement");
        expand_named(query, params)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn fetch_one(&self, query: &str, params: &Params) -> Result<Option<Row>, RepoError> {
        let (sql, values) = self.prepare(query, params)?;
        let row = bind_values(sqlx::query(&sql), values)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(convert_row).transpose()
    }

    async fn fetch_all(&self, query: &str, params: &Params) -> Result<Vec<Row>, RepoError> {
        let (sql, values) = self.prepare(query, params)?;
        let rows = bind_values(sqlx::query(&sql), values)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(convert_row).collect()
    }

    async fn execute(&self, query: &str, params: &Params) -> Result<i64, RepoError> {
        let (sql, values) = self.prepare(query, params)?;
        let result = bind_values(sqlx::query(&sql), values)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        debug!(rows_affected = result.rows_affected(), "Executed statement");
        // last_insert_rowid() is per connection and survives later updates.
        if is_insert(&sql) {
            Ok(result.last_insert_rowid())
        } else {
            Ok(0)
        }
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("INSERT"))
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Timestamp(v) => query.bind(v.to_offset(UtcOffset::UTC)),
        };
    }
    query
}

fn convert_row(row: &SqliteRow) -> Result<Row, RepoError> {
    let mut converted = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|message| RepoError::decode(column.name(), message))?;
        converted.push(column.name(), value);
    }
    Ok(converted)
}

/// Declared `BOOLEAN`/`DATETIME` columns decode by declaration; everything
/// else, computed columns included, by the stored value's class.
fn decode_column(row: &SqliteRow, index: usize, declared: &str) -> Result<Value, String> {
    let raw = row.try_get_raw(index).map_err(|err| err.to_string())?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let stored = raw.type_info().into_owned();

    let value = match (declared, stored.name()) {
        ("BOOLEAN", _) => Value::Bool(get(row, index)?),
        ("DATETIME", _) => {
            Value::Timestamp(get::<OffsetDateTime>(row, index)?.to_offset(UtcOffset::UTC))
        }
        (_, "INTEGER") => Value::Int(get(row, index)?),
        (_, "REAL") => Value::Float(get(row, index)?),
        (_, "TEXT") => Value::Text(get(row, index)?),
        (_, other) => return Err(format!("unsupported storage class `{other}`")),
    };
    Ok(value)
}

fn get<T>(row: &SqliteRow, index: usize) -> Result<T, String>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get::<T, _>(index).map_err(|err| err.to_string())
}
