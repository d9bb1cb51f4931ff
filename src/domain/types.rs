use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Who may interact with a user (messages, friend requests, comments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PrivacySetting {
    #[default]
    Public,
    Friends,
    Private,
}

impl PrivacySetting {
    pub fn as_i64(self) -> i64 {
        match self {
            PrivacySetting::Public => 0,
            PrivacySetting::Friends => 1,
            PrivacySetting::Private => 2,
        }
    }
}

impl TryFrom<i64> for PrivacySetting {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PrivacySetting::Public),
            1 => Ok(PrivacySetting::Friends),
            2 => Ok(PrivacySetting::Private),
            other => Err(DomainError::unknown_code("privacy setting", other)),
        }
    }
}

/// Bit set of actions a user is allowed to perform. Bit 63 is never set, so
/// the value always fits a signed `BIGINT` column.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u64", into = "u64")]
pub struct UserPrivileges(u64);

impl UserPrivileges {
    pub const USER_AUTHENTICATE: Self = Self(1 << 0);
    pub const USER_PROFILE_PUBLIC: Self = Self(1 << 1);
    pub const USER_STAR_LEADERBOARD_PUBLIC: Self = Self(1 << 2);
    pub const USER_CP_LEADERBOARD_PUBLIC: Self = Self(1 << 3);
    pub const USER_CREATE_USER_COMMENTS: Self = Self(1 << 4);
    pub const USER_CHANGE_CREDENTIALS_OWN: Self = Self(1 << 5);
    pub const LEVEL_UPLOAD: Self = Self(1 << 6);
    pub const LEVEL_UPDATE: Self = Self(1 << 7);
    pub const LEVEL_DELETE_OWN: Self = Self(1 << 8);
    pub const COMMENTS_POST: Self = Self(1 << 9);
    pub const COMMENTS_DELETE_OWN: Self = Self(1 << 10);
    pub const COMMENTS_TRIGGER_COMMANDS: Self = Self(1 << 11);
    pub const COMMENTS_LIKE: Self = Self(1 << 12);
    pub const MESSAGES_SEND: Self = Self(1 << 13);
    pub const MESSAGES_DELETE_OWN: Self = Self(1 << 14);
    pub const FRIEND_REQUESTS_SEND: Self = Self(1 << 15);
    pub const FRIEND_REQUESTS_ACCEPT: Self = Self(1 << 16);
    pub const FRIEND_REQUESTS_DELETE_OWN: Self = Self(1 << 17);

    /// Privileges granted to a freshly registered account.
    pub const DEFAULT: Self = Self(
        Self::USER_AUTHENTICATE.0
            | Self::USER_PROFILE_PUBLIC.0
            | Self::USER_STAR_LEADERBOARD_PUBLIC.0
            | Self::USER_CP_LEADERBOARD_PUBLIC.0
            | Self::USER_CREATE_USER_COMMENTS.0
            | Self::USER_CHANGE_CREDENTIALS_OWN.0
            | Self::LEVEL_UPLOAD.0
            | Self::LEVEL_UPDATE.0
            | Self::LEVEL_DELETE_OWN.0
            | Self::COMMENTS_POST.0
            | Self::COMMENTS_DELETE_OWN.0
            | Self::COMMENTS_TRIGGER_COMMANDS.0
            | Self::COMMENTS_LIKE.0
            | Self::MESSAGES_SEND.0
            | Self::MESSAGES_DELETE_OWN.0
            | Self::FRIEND_REQUESTS_SEND.0
            | Self::FRIEND_REQUESTS_ACCEPT.0
            | Self::FRIEND_REQUESTS_DELETE_OWN.0,
    );

    const SIGN_BIT: u64 = 1 << 63;

    pub fn from_bits(bits: u64) -> Result<Self, DomainError> {
        if bits & Self::SIGN_BIT != 0 {
            return Err(DomainError::validation(format!(
                "privilege bits {bits:#x} use the reserved top bit"
            )));
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Signed form for storage.
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl TryFrom<u64> for UserPrivileges {
    type Error = DomainError;

    fn try_from(bits: u64) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<UserPrivileges> for u64 {
    fn from(value: UserPrivileges) -> Self {
        value.0
    }
}

impl fmt::Debug for UserPrivileges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserPrivileges({:#x})", self.0)
    }
}

/// Where a song's audio is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SongSource {
    #[default]
    Boomlings,
    Newgrounds,
    Custom,
}

impl SongSource {
    pub fn as_i64(self) -> i64 {
        match self {
            SongSource::Boomlings => 0,
            SongSource::Newgrounds => 1,
            SongSource::Custom => 2,
        }
    }
}

impl TryFrom<i64> for SongSource {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SongSource::Boomlings),
            1 => Ok(SongSource::Newgrounds),
            2 => Ok(SongSource::Custom),
            other => Err(DomainError::unknown_code("song source", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_setting_roundtrips_through_integer() {
        for setting in [
            PrivacySetting::Public,
            PrivacySetting::Friends,
            PrivacySetting::Private,
        ] {
            assert_eq!(PrivacySetting::try_from(setting.as_i64()).unwrap(), setting);
        }
        assert!(PrivacySetting::try_from(7).is_err());
    }

    #[test]
    fn unknown_song_source_names_the_code() {
        let err = SongSource::try_from(5).unwrap_err();
        assert_eq!(err, DomainError::unknown_code("song source", 5));
        assert_eq!(err.to_string(), "`5` is not a known song source");
    }

    #[test]
    fn default_privileges_allow_authentication() {
        assert!(UserPrivileges::DEFAULT.contains(UserPrivileges::USER_AUTHENTICATE));
        let restricted = UserPrivileges::DEFAULT.difference(UserPrivileges::COMMENTS_POST);
        assert!(!restricted.contains(UserPrivileges::COMMENTS_POST));
        assert!(restricted.contains(UserPrivileges::LEVEL_UPLOAD));
    }

    #[test]
    fn privileges_reserve_the_top_bit() {
        let highest = UserPrivileges::from_bits(1 << 62).unwrap();
        assert_eq!(highest.as_i64(), 1 << 62);
        assert!(matches!(
            UserPrivileges::from_bits(1 << 63),
            Err(DomainError::Validation { .. })
        ));
        assert!(serde_json::from_str::<UserPrivileges>(&u64::MAX.to_string()).is_err());
        assert_eq!(
            serde_json::from_str::<UserPrivileges>("3").unwrap(),
            UserPrivileges::USER_AUTHENTICATE.union(UserPrivileges::USER_PROFILE_PUBLIC)
        );
    }
}
