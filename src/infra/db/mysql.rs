use async_trait::async_trait;
use sqlx::{
    Column, MySql, Row as _, TypeInfo,
    mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow},
    query::Query,
};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::debug;

use crate::application::persistence::{Database, Params, RepoError, Row, Value};

use super::map_sqlx_error;
use super::params::expand_named;

#[derive(Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
        MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn fetch_one(&self, query: &str, params: &Params) -> Result<Option<Row>, RepoError> {
        let (sql, values) = expand_named(query, params)?;
        let row = bind_values(sqlx::query(&sql), values)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(convert_row).transpose()
    }

    async fn fetch_all(&self, query: &str, params: &Params) -> Result<Vec<Row>, RepoError> {
        let (sql, values) = expand_named(query, params)?;
        let rows = bind_values(sqlx::query(&sql), values)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(convert_row).collect()
    }

    async fn execute(&self, query: &str, params: &Params) -> Result<i64, RepoError> {
        let (sql, values) = expand_named(query, params)?;
        let result = bind_values(sqlx::query(&sql), values)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        debug!(rows_affected = result.rows_affected(), "Executed statement");
        i64::try_from(result.last_insert_id()).map_err(|_| RepoError::Integrity {
            message: format!("generated id {} exceeds i64", result.last_insert_id()),
        })
    }
}

fn bind_values<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: Vec<Value>,
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            // DATETIME columns hold naive UTC wall-clock time.
            Value::Timestamp(v) => {
                let utc = v.to_offset(UtcOffset::UTC);
                query.bind(PrimitiveDateTime::new(utc.date(), utc.time()))
            }
        };
    }
    query
}

fn convert_row(row: &MySqlRow) -> Result<Row, RepoError> {
    let mut converted = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|message| RepoError::decode(column.name(), message))?;
        converted.push(column.name(), value);
    }
    Ok(converted)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, String> {
    let value = match type_name {
        "NULL" => None,
        "BOOLEAN" => get::<bool>(row, index)?.map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            get::<i64>(row, index)?.map(Value::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => match get::<u64>(row, index)? {
            Some(raw) => Some(Value::Int(
                i64::try_from(raw).map_err(|_| format!("unsigned value {raw} exceeds i64"))?,
            )),
            None => None,
        },
        "FLOAT" => get::<f32>(row, index)?.map(|v| Value::Float(f64::from(v))),
        "DOUBLE" => get::<f64>(row, index)?.map(Value::Float),
        "DATETIME" => get::<PrimitiveDateTime>(row, index)?
            .map(|naive| Value::Timestamp(naive.assume_utc())),
        "TIMESTAMP" => get::<OffsetDateTime>(row, index)?.map(Value::Timestamp),
        _ => get::<String>(row, index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn get<T>(row: &MySqlRow, index: usize) -> Result<Option<T>, String>
where
    T: for<'r> sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|err| err.to_string())
}
