//! Named placeholder expansion for positional drivers.

use crate::application::persistence::{Params, RepoError, Value};

/// Rewrites every `:name` placeholder in `query` to `?` and returns the
/// values in bind order. Quoted literals and `::` casts are left alone.
pub fn expand_named(query: &str, params: &Params) -> Result<(String, Vec<Value>), RepoError> {
    let mut sql = String::with_capacity(query.len());
    let mut values = Vec::new();
    let mut chars = query.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((index, ch)) = chars.next() {
        if let Some(open) = quote {
            sql.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                sql.push(ch);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                sql.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, next)) if is_name_start(*next)) => {
                let start = index + 1;
                let mut end = start;
                while let Some((at, next)) = chars.peek().copied() {
                    if !is_name_char(next) {
                        break;
                    }
                    end = at + next.len_utf8();
                    chars.next();
                }

                let name = &query[start..end];
                let value = params.get(name).ok_or_else(|| RepoError::InvalidInput {
                    message: format!("missing value for query parameter `{name}`"),
                })?;
                values.push(value.clone());
                sql.push('?');
            }
            _ => sql.push(ch),
        }
    }

    Ok((sql, values))
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_become_positional_in_order() {
        let params = Params::new().with("id", 7_i64).with("stars", 5_i64);
        let (sql, values) =
            expand_named("UPDATE users SET stars = :stars WHERE id = :id", &params).unwrap();

        assert_eq!(sql, "UPDATE users SET stars = ? WHERE id = ?");
        assert_eq!(values, [Value::Int(5), Value::Int(7)]);
    }

    #[test]
    fn repeated_placeholder_binds_twice() {
        let params = Params::new().with("user_id", 3_i64);
        let (sql, values) = expand_named(
            "SELECT 1 FROM t WHERE a = :user_id OR b = :user_id",
            &params,
        )
        .unwrap();

        assert_eq!(sql, "SELECT 1 FROM t WHERE a = ? OR b = ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn literals_and_casts_are_untouched() {
        let params = Params::new().with("name", "x");
        let (sql, values) = expand_named(
            "SELECT ':skip', id::text FROM t WHERE name = :name",
            &params,
        )
        .unwrap();

        assert_eq!(sql, "SELECT ':skip', id::text FROM t WHERE name = ?");
        assert_eq!(values, [Value::Text("x".into())]);
    }

    #[test]
    fn missing_parameter_is_invalid_input() {
        let err = expand_named("SELECT * FROM t WHERE id = :id", &Params::new()).unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
