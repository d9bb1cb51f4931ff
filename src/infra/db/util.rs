use crate::application::persistence::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.message().contains("Duplicate entry") =>
        {
            RepoError::Duplicate {
                constraint: db
                    .constraint()
                    .map(str::to_string)
                    .or_else(|| duplicate_key_name(db.message()))
                    .unwrap_or_else(|| "unknown".to_string()),
            }
        }
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation()
                || db.is_check_violation()
                || db.message().contains("foreign key constraint fails")
                || db.message().starts_with("Incorrect")
                || db.message().starts_with("Data too long") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("cannot be null")
                || db.message().starts_with("NOT NULL constraint failed") =>
        {
            RepoError::Integrity {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("maximum statement execution time exceeded")
                || db.message().contains("Lock wait timeout exceeded") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Pulls `users.username` out of MySQL's `Duplicate entry 'x' for key
/// 'users.username'` or SQLite's `UNIQUE constraint failed: users.username`.
fn duplicate_key_name(message: &str) -> Option<String> {
    if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
        return Some(columns.to_string());
    }
    let (_, tail) = message.rsplit_once("for key '")?;
    tail.strip_suffix('\'').map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_key_from_duplicate_message() {
        assert_eq!(
            duplicate_key_name("Duplicate entry 'alice' for key 'users.username'").as_deref(),
            Some("users.username")
        );
        assert_eq!(
            duplicate_key_name("UNIQUE constraint failed: users.username").as_deref(),
            Some("users.username")
        );
        assert_eq!(duplicate_key_name("Duplicate entry 'alice'"), None);
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }
}
