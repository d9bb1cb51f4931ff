use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::instrument;

use super::{Entity, EntityRepository, Propagation, Scope, now_in_seconds};
use crate::application::changeset::ChangeSet;
use crate::application::persistence::{Database, FromValue, Params, RepoError, Row, Value};
use crate::cache::Cache;
use crate::context::AppContext;
use crate::domain::entities::User;
use crate::domain::patch::Patch;
use crate::domain::types::{PrivacySetting, UserPrivileges};
use crate::pubsub::{HandlerError, PubSubRouter, RouterError, USERS_CHANNEL};

const USER_COLUMNS: &[&str] = &[
    "id",
    "username",
    "email",
    "password",
    "privileges",
    "message_privacy",
    "friend_privacy",
    "comment_privacy",
    "twitter_name",
    "youtube_name",
    "twitch_name",
    "register_ts",
    "stars",
    "demons",
    "primary_colour",
    "secondary_colour",
    "display_type",
    "icon",
    "ship",
    "ball",
    "ufo",
    "wave",
    "robot",
    "spider",
    "explosion",
    "glow",
    "creator_points",
    "coins",
    "user_coins",
    "diamonds",
];

impl From<PrivacySetting> for Value {
    fn from(value: PrivacySetting) -> Self {
        Value::Int(value.as_i64())
    }
}

impl FromValue for PrivacySetting {
    fn from_value(value: &Value) -> Result<Self, String> {
        let raw = i64::from_value(value)?;
        PrivacySetting::try_from(raw).map_err(|err| err.to_string())
    }
}

impl From<UserPrivileges> for Value {
    fn from(value: UserPrivileges) -> Self {
        Value::Int(value.as_i64())
    }
}

impl FromValue for UserPrivileges {
    fn from_value(value: &Value) -> Result<Self, String> {
        let raw = i64::from_value(value)?;
        let bits = u64::try_from(raw).map_err(|_| format!("negative privilege bits `{raw}`"))?;
        UserPrivileges::from_bits(bits).map_err(|err| err.to_string())
    }
}

impl Entity for User {
    const NAME: &'static str = "user";
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = USER_COLUMNS;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> Result<Self, RepoError> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password: row.get("password")?,
            privileges: row.get("privileges")?,
            message_privacy: row.get("message_privacy")?,
            friend_privacy: row.get("friend_privacy")?,
            comment_privacy: row.get("comment_privacy")?,
            youtube_name: row.get("youtube_name")?,
            twitter_name: row.get("twitter_name")?,
            twitch_name: row.get("twitch_name")?,
            register_ts: row.get("register_ts")?,
            stars: row.get("stars")?,
            demons: row.get("demons")?,
            primary_colour: row.get("primary_colour")?,
            secondary_colour: row.get("secondary_colour")?,
            display_type: row.get("display_type")?,
            icon: row.get("icon")?,
            ship: row.get("ship")?,
            ball: row.get("ball")?,
            ufo: row.get("ufo")?,
            wave: row.get("wave")?,
            robot: row.get("robot")?,
            spider: row.get("spider")?,
            explosion: row.get("explosion")?,
            glow: row.get("glow")?,
            creator_points: row.get("creator_points")?,
            coins: row.get("coins")?,
            user_coins: row.get("user_coins")?,
            diamonds: row.get("diamonds")?,
        })
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("username", self.username.as_str())
            .with("email", self.email.as_str())
            .with("password", self.password.as_str())
            .with("privileges", self.privileges)
            .with("message_privacy", self.message_privacy)
            .with("friend_privacy", self.friend_privacy)
            .with("comment_privacy", self.comment_privacy)
            .with("twitter_name", self.twitter_name.clone())
            .with("youtube_name", self.youtube_name.clone())
            .with("twitch_name", self.twitch_name.clone())
            .with("register_ts", self.register_ts)
            .with("stars", self.stars)
            .with("demons", self.demons)
            .with("primary_colour", self.primary_colour)
            .with("secondary_colour", self.secondary_colour)
            .with("display_type", self.display_type)
            .with("icon", self.icon)
            .with("ship", self.ship)
            .with("ball", self.ball)
            .with("ufo", self.ufo)
            .with("wave", self.wave)
            .with("robot", self.robot)
            .with("spider", self.spider)
            .with("explosion", self.explosion)
            .with("glow", self.glow)
            .with("creator_points", self.creator_points)
            .with("coins", self.coins)
            .with("user_coins", self.user_coins)
            .with("diamonds", self.diamonds)
    }
}

/// Registration input. [`NewUser::new`] fills in the in-game defaults.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Explicit id to insert with; `0` lets the store assign one.
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub privileges: UserPrivileges,
    pub message_privacy: PrivacySetting,
    pub friend_privacy: PrivacySetting,
    pub comment_privacy: PrivacySetting,
    pub youtube_name: Option<String>,
    pub twitter_name: Option<String>,
    pub twitch_name: Option<String>,
    /// Defaults to the insertion time.
    pub register_ts: Option<OffsetDateTime>,
    pub stars: i64,
    pub demons: i64,
    pub primary_colour: i64,
    pub secondary_colour: i64,
    pub display_type: i64,
    pub icon: i64,
    pub ship: i64,
    pub ball: i64,
    pub ufo: i64,
    pub wave: i64,
    pub robot: i64,
    pub spider: i64,
    pub explosion: i64,
    pub glow: bool,
    pub creator_points: i64,
    pub coins: i64,
    pub user_coins: i64,
    pub diamonds: i64,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: 0,
            username: username.into(),
            email: email.into(),
            password: password.into(),
            privileges: UserPrivileges::DEFAULT,
            message_privacy: PrivacySetting::Public,
            friend_privacy: PrivacySetting::Public,
            comment_privacy: PrivacySetting::Public,
            youtube_name: None,
            twitter_name: None,
            twitch_name: None,
            register_ts: None,
            stars: 0,
            demons: 0,
            primary_colour: 0,
            // The game client's default secondary colour.
            secondary_colour: 4,
            display_type: 0,
            icon: 0,
            ship: 0,
            ball: 0,
            ufo: 0,
            wave: 0,
            robot: 0,
            spider: 0,
            explosion: 0,
            glow: false,
            creator_points: 0,
            coins: 0,
            user_coins: 0,
            diamonds: 0,
        }
    }

    fn into_user(self) -> User {
        User {
            id: self.user_id,
            username: self.username,
            email: self.email,
            password: self.password,
            privileges: self.privileges,
            message_privacy: self.message_privacy,
            friend_privacy: self.friend_privacy,
            comment_privacy: self.comment_privacy,
            youtube_name: self.youtube_name,
            twitter_name: self.twitter_name,
            twitch_name: self.twitch_name,
            register_ts: self.register_ts.unwrap_or_else(now_in_seconds),
            stars: self.stars,
            demons: self.demons,
            primary_colour: self.primary_colour,
            secondary_colour: self.secondary_colour,
            display_type: self.display_type,
            icon: self.icon,
            ship: self.ship,
            ball: self.ball,
            ufo: self.ufo,
            wave: self.wave,
            robot: self.robot,
            spider: self.spider,
            explosion: self.explosion,
            glow: self.glow,
            creator_points: self.creator_points,
            coins: self.coins,
            user_coins: self.user_coins,
            diamonds: self.diamonds,
        }
    }
}

/// Sparse update of a user profile. `register_ts` and `id` are immutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Patch<String>,
    pub email: Patch<String>,
    pub password: Patch<String>,
    pub privileges: Patch<UserPrivileges>,
    pub message_privacy: Patch<PrivacySetting>,
    pub friend_privacy: Patch<PrivacySetting>,
    pub comment_privacy: Patch<PrivacySetting>,
    pub youtube_name: Patch<Option<String>>,
    pub twitter_name: Patch<Option<String>>,
    pub twitch_name: Patch<Option<String>>,
    pub stars: Patch<i64>,
    pub demons: Patch<i64>,
    pub primary_colour: Patch<i64>,
    pub secondary_colour: Patch<i64>,
    pub display_type: Patch<i64>,
    pub icon: Patch<i64>,
    pub ship: Patch<i64>,
    pub ball: Patch<i64>,
    pub ufo: Patch<i64>,
    pub wave: Patch<i64>,
    pub robot: Patch<i64>,
    pub spider: Patch<i64>,
    pub explosion: Patch<i64>,
    pub glow: Patch<bool>,
    pub creator_points: Patch<i64>,
    pub coins: Patch<i64>,
    pub user_coins: Patch<i64>,
    pub diamonds: Patch<i64>,
}

impl UserPatch {
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::new()
            .field("username", self.username)
            .field("email", self.email)
            .field("password", self.password)
            .field("privileges", self.privileges)
            .field("message_privacy", self.message_privacy)
            .field("friend_privacy", self.friend_privacy)
            .field("comment_privacy", self.comment_privacy)
            .field("youtube_name", self.youtube_name)
            .field("twitter_name", self.twitter_name)
            .field("twitch_name", self.twitch_name)
            .field("stars", self.stars)
            .field("demons", self.demons)
            .field("primary_colour", self.primary_colour)
            .field("secondary_colour", self.secondary_colour)
            .field("display_type", self.display_type)
            .field("icon", self.icon)
            .field("ship", self.ship)
            .field("ball", self.ball)
            .field("ufo", self.ufo)
            .field("wave", self.wave)
            .field("robot", self.robot)
            .field("spider", self.spider)
            .field("explosion", self.explosion)
            .field("glow", self.glow)
            .field("creator_points", self.creator_points)
            .field("coins", self.coins)
            .field("user_coins", self.user_coins)
            .field("diamonds", self.diamonds)
    }
}

#[derive(Clone)]
pub struct UserRepository {
    inner: EntityRepository<User>,
}

impl UserRepository {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn Cache<User>>, propagation: Propagation) -> Self {
        Self {
            inner: EntityRepository::new(db, cache, propagation),
        }
    }

    pub async fn from_id(&self, user_id: i64) -> Result<Option<User>, RepoError> {
        self.inner.from_id(user_id).await
    }

    pub async fn from_db(&self, user_id: i64) -> Result<Option<User>, RepoError> {
        self.inner.from_db(user_id, Scope::IncludeDeleted).await
    }

    /// Resolves the username with an uncached query, then reads through the cache.
    #[instrument(skip(self))]
    pub async fn from_name(&self, username: &str) -> Result<Option<User>, RepoError> {
        let params = Params::new().with("username", username);
        let Some(user_id) = self
            .inner
            .lookup_id("SELECT id FROM users WHERE username = :username", &params)
            .await?
        else {
            return Ok(None);
        };

        self.from_id(user_id).await
    }

    pub async fn create(&self, new_user: NewUser) -> Result<User, RepoError> {
        self.inner.insert(new_user.into_user()).await
    }

    pub async fn update_partial(
        &self,
        user_id: i64,
        patch: UserPatch,
    ) -> Result<Option<User>, RepoError> {
        self.inner
            .update_partial(user_id, patch.into_changes())
            .await
    }

    /// Persists every column of `user` and writes it through to the cache.
    pub async fn update_full(&self, user: &User) -> Result<(), RepoError> {
        self.inner.overwrite(user).await
    }

    pub async fn check_email_exists(&self, email: &str) -> Result<bool, RepoError> {
        self.inner
            .fetch_exists(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = :email)",
                &Params::new().with("email", email),
            )
            .await
    }

    pub async fn check_username_exists(&self, username: &str) -> Result<bool, RepoError> {
        self.inner
            .fetch_exists(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = :username)",
                &Params::new().with("username", username),
            )
            .await
    }

    pub async fn get_count(&self) -> Result<i64, RepoError> {
        self.inner
            .fetch_count("SELECT COUNT(*) FROM users", &Params::new())
            .await
    }

    pub async fn handle_invalidation(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.inner.handle_invalidation(payload).await
    }
}

pub(crate) fn router() -> Result<PubSubRouter<AppContext>, RouterError> {
    let mut router = PubSubRouter::new();
    router.register(USERS_CHANNEL, |ctx: Arc<AppContext>, payload: Bytes| async move {
        ctx.users.handle_invalidation(&payload).await
    })?;
    Ok(router)
}
