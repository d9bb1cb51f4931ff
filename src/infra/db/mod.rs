//! Persistence adapters over sqlx: MySQL in production, SQLite for local
//! runs and tests.

mod mysql;
mod params;
mod sqlite;
mod util;

pub use mysql::MySqlDatabase;
pub use params::expand_named;
pub use sqlite::SqliteDatabase;
pub use util::map_sqlx_error;
