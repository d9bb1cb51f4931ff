//! Cache key definitions.

use std::fmt;

/// Key of a cached entity: its integer id or a string identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(i64),
    Name(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Id(id) => write!(f, "{id}"),
            CacheKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(id: i64) -> Self {
        CacheKey::Id(id)
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        CacheKey::Name(name.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(name: String) -> Self {
        CacheKey::Name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_raw_identifier() {
        assert_eq!(CacheKey::from(42).to_string(), "42");
        assert_eq!(CacheKey::from("alice").to_string(), "alice");
    }

    #[test]
    fn integer_and_string_keys_do_not_collide() {
        assert_ne!(CacheKey::from(42), CacheKey::from("42"));
    }
}
