//! Cache configuration.
//!
//! Controls the capacity of the in-process entity caches and the key prefix
//! used when entities are cached in Redis.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_USER_LIMIT: usize = 2048;
const DEFAULT_FRIEND_REQUEST_LIMIT: usize = 1024;
const DEFAULT_SONG_LIMIT: usize = 512;
const DEFAULT_COMMENT_LIMIT: usize = 1024;
const DEFAULT_KEY_PREFIX: &str = "rgdps:cache";

/// Entity cache configuration from `rgdps.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum users held by the in-process cache.
    pub user_limit: usize,
    /// Maximum friend requests held by the in-process cache.
    pub friend_request_limit: usize,
    /// Maximum songs held by the in-process cache.
    pub song_limit: usize,
    /// Maximum user comments held by the in-process cache.
    pub comment_limit: usize,
    /// Prefix of every key written to a shared (Redis) cache.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_limit: DEFAULT_USER_LIMIT,
            friend_request_limit: DEFAULT_FRIEND_REQUEST_LIMIT,
            song_limit: DEFAULT_SONG_LIMIT,
            comment_limit: DEFAULT_COMMENT_LIMIT,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            user_limit: settings.user_limit,
            friend_request_limit: settings.friend_request_limit,
            song_limit: settings.song_limit,
            comment_limit: settings.comment_limit,
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

/// Clamps a configured capacity to at least one entry.
pub fn non_zero(limit: usize) -> NonZeroUsize {
    NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.user_limit, 2048);
        assert_eq!(config.friend_request_limit, 1024);
        assert_eq!(config.song_limit, 512);
        assert_eq!(config.comment_limit, 1024);
        assert_eq!(config.key_prefix, "rgdps:cache");
    }

    #[test]
    fn non_zero_clamps_to_min() {
        assert_eq!(non_zero(0).get(), 1);
        assert_eq!(non_zero(12).get(), 12);
    }
}
