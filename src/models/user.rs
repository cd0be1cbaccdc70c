use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    config::SecurityConfig,
    database::{get_uuid, DbSession},
    error::ModelError,
    middleware::AuthenticatedPrincipal,
    models::Role,
    queries,
    utils::{
        decode_reset_token, encode_reset_token, hash_password, verify_password, TimedSerializer,
        MAX_PASSWORD_BYTES,
    },
};

const CONFIRM_SALT: &str = "email-confirm";

#[derive(Clone, Serialize, FromRow)]
pub struct User {
    pub user_uid: String,
    pub role_uid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[sqlx(rename = "password")]
    #[serde(skip_serializing)]
    hashed_password: String,
    pub active: bool,
    pub confirmed: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfirmPayload {
    confirm: String,
}

impl User {
    pub fn new(
        role_uid: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Self, ModelError> {
        let now = Utc::now();
        let mut user = Self {
            user_uid: get_uuid(),
            role_uid: role_uid.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            hashed_password: String::new(),
            active: true,
            confirmed: false,
            created: now,
            updated: now,
        };
        user.set_password(password)?;
        Ok(user)
    }

    /// The password is write-only; reading it is always an error.
    pub fn password(&self) -> Result<&str, ModelError> {
        Err(ModelError::PasswordNotReadable)
    }

    /// Hashes and stores `password`. bcrypt only reads the first
    /// `MAX_PASSWORD_BYTES` bytes, so longer passwords are refused.
    pub fn set_password(&mut self, password: &str) -> Result<(), ModelError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(ModelError::PasswordTooLong(MAX_PASSWORD_BYTES));
        }
        self.hashed_password = hash_password(password)?;
        Ok(())
    }

    pub(crate) fn hashed_password(&self) -> &str {
        &self.hashed_password
    }

    pub fn verify_password(&self, password: &str) -> bool {
        if password.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match verify_password(password, &self.hashed_password) {
            Ok(matches) => matches,
            Err(err) => {
                debug!("stored password hash for {} is unusable: {}", self.user_uid, err);
                false
            }
        }
    }

    pub fn confirmation_token(&self, config: &SecurityConfig) -> Result<String, ModelError> {
        let serializer = TimedSerializer::new(config.secret_key.as_bytes(), CONFIRM_SALT);
        let token = serializer.dumps(&ConfirmPayload {
            confirm: self.user_uid.clone(),
        })?;
        Ok(token)
    }

    /// Marks the user confirmed when `token` is a valid, unexpired confirmation
    /// token for this user. Token problems yield `Ok(false)`; only a failure to
    /// stage the update is an error. The update is left uncommitted in
    /// `session`.
    pub async fn confirm_token(
        &mut self,
        token: &str,
        config: &SecurityConfig,
        session: &mut DbSession,
    ) -> Result<bool, ModelError> {
        let serializer = TimedSerializer::new(config.secret_key.as_bytes(), CONFIRM_SALT);
        let Some(max_age) = config.confirmation_max_age() else {
            debug!(
                "confirmation link timeout of {} minutes is out of range",
                config.confirmation_link_timeout
            );
            return Ok(false);
        };

        let payload: ConfirmPayload = match serializer.loads(token, max_age) {
            Ok(payload) => payload,
            Err(err) => {
                debug!("confirmation token rejected: {}", err);
                return Ok(false);
            }
        };
        if payload.confirm != self.user_uid {
            debug!("confirmation token issued for a different user");
            return Ok(false);
        }

        let mut scope = session.scope(false);
        let was_confirmed = self.confirmed;
        self.confirmed = true;
        let result: Result<(), ModelError> = async {
            queries::users::update(scope.connection().await?, self).await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            self.confirmed = was_confirmed;
        }
        scope.finish(result).await?;
        Ok(true)
    }

    /// Signs a reset token for this user that expires `timeout` minutes from now.
    pub fn get_reset_token(
        &self,
        timeout: i64,
        config: &SecurityConfig,
    ) -> Result<String, ModelError> {
        let expires_at = Duration::try_minutes(timeout)
            .and_then(|timeout| Utc::now().checked_add_signed(timeout))
            .ok_or(ModelError::TimeoutOutOfRange(timeout))?;
        let token = encode_reset_token(&self.user_uid, expires_at, &config.secret_key)?;
        Ok(token)
    }

    /// Returns the user id a reset token was issued for. Fails on a bad
    /// signature or once the token's expiry has passed.
    pub fn verify_reset_token(token: &str, config: &SecurityConfig) -> Result<String, ModelError> {
        let user_uid = decode_reset_token(token, &config.secret_key)?;
        Ok(user_uid)
    }
}

impl AuthenticatedPrincipal for User {
    fn get_id(&self) -> String {
        self.user_uid.clone()
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("user_uid", &self.user_uid)
            .field("role_uid", &self.role_uid)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("active", &self.active)
            .field("confirmed", &self.confirmed)
            .field("created", &self.created)
            .field("updated", &self.updated)
            .finish_non_exhaustive()
    }
}

/// A user with its role loaded alongside.
#[derive(Debug, Clone)]
pub struct UserWithRole {
    pub user: User,
    pub role: Role,
}

impl fmt::Display for UserWithRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = &self.user;
        writeln!(f, "user_uid: {}", user.user_uid)?;
        writeln!(f, "name: {} {}", user.first_name, user.last_name)?;
        writeln!(f, "email: {}", user.email)?;
        writeln!(f, "confirmed: {}", user.confirmed)?;
        writeln!(f, "active: {}", if user.active { "True" } else { "False" })?;
        writeln!(f, "    role_uid: {}", self.role.role_uid)?;
        writeln!(f, "    name: {}", self.role.name)?;
        writeln!(f, "    description: {}", self.role.description)?;
        write!(f, "    permissions: {}", self.role.permissions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{connect_in_memory, Database};
    use crate::models::DEFAULT_ROLE;

    fn config() -> SecurityConfig {
        SecurityConfig::new("test-secret-key", 15)
    }

    async fn seeded_db() -> (Database, String) {
        let db = connect_in_memory().await.unwrap();
        let mut session = DbSession::new(db.clone());
        Role::initialize_role_table(&mut session).await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        let role = queries::roles::find_by_name(&mut conn, DEFAULT_ROLE)
            .await
            .unwrap()
            .unwrap();
        (db, role.role_uid)
    }

    async fn stored_user(db: &Database, user_uid: &str) -> User {
        let mut conn = db.acquire().await.unwrap();
        queries::users::find_by_uid(&mut conn, user_uid)
            .await
            .unwrap()
            .unwrap()
    }

    async fn insert_user(db: &Database, user: &User) {
        let mut conn = db.acquire().await.unwrap();
        queries::users::insert(&mut conn, user).await.unwrap();
    }

    fn new_user(role_uid: &str, email: &str) -> User {
        User::new(role_uid, "Ada", "Lovelace", email, "correct horse").unwrap()
    }

    #[test]
    fn password_round_trip() {
        let user = new_user("role", "ada@example.com");
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("correct horse "));
        assert!(!user.verify_password(""));
        assert_ne!(user.hashed_password(), "correct horse");
    }

    #[test]
    fn changing_password_replaces_hash() {
        let mut user = new_user("role", "ada@example.com");
        user.set_password("battery staple").unwrap();
        assert!(user.verify_password("battery staple"));
        assert!(!user.verify_password("correct horse"));
    }

    #[test]
    fn passwords_beyond_bcrypt_limit_are_refused() {
        let long = "a".repeat(MAX_PASSWORD_BYTES);
        let mut user = User::new("role", "Ada", "Lovelace", "ada@example.com", &long).unwrap();
        assert!(user.verify_password(&long));
        assert!(!user.verify_password(&format!("{long}y")));

        let too_long = format!("{long}x");
        assert!(matches!(
            user.set_password(&too_long),
            Err(ModelError::PasswordTooLong(MAX_PASSWORD_BYTES))
        ));
        assert!(user.verify_password(&long));
        assert!(User::new("role", "Ada", "Lovelace", "ada@example.com", &too_long).is_err());
    }

    #[test]
    fn password_is_write_only() {
        let user = new_user("role", "ada@example.com");
        assert!(matches!(user.password(), Err(ModelError::PasswordNotReadable)));
    }

    #[test]
    fn password_hash_never_leaks_through_debug_or_json() {
        let user = new_user("role", "ada@example.com");
        let debug = format!("{:?}", user);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!debug.contains(user.hashed_password()));
        assert!(!json.contains(user.hashed_password()));
        assert!(!json.contains("password"));
    }

    #[test]
    fn new_user_defaults() {
        let user = new_user("role", "ada@example.com");
        assert_eq!(user.user_uid.len(), 32);
        assert!(user.active);
        assert!(!user.confirmed);
        assert_eq!(user.get_id(), user.user_uid);
        assert!(user.is_authenticated());
        assert!(!user.is_anonymous());
    }

    #[tokio::test]
    async fn confirmation_token_confirms_its_user() {
        let (db, role_uid) = seeded_db().await;
        let mut user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;

        let token = user.confirmation_token(&config()).unwrap();
        let mut session = DbSession::new(db.clone());
        assert!(user.confirm_token(&token, &config(), &mut session).await.unwrap());
        assert!(user.confirmed);

        // staged, not committed
        assert!(session.in_transaction());
        session.commit().await.unwrap();
        assert!(stored_user(&db, &user.user_uid).await.confirmed);
    }

    #[tokio::test]
    async fn confirmation_token_for_another_user_is_rejected() {
        let (db, role_uid) = seeded_db().await;
        let mut ada = new_user(&role_uid, "ada@example.com");
        let grace = new_user(&role_uid, "grace@example.com");
        insert_user(&db, &ada).await;
        insert_user(&db, &grace).await;

        let token = grace.confirmation_token(&config()).unwrap();
        let mut session = DbSession::new(db.clone());
        assert!(!ada.confirm_token(&token, &config(), &mut session).await.unwrap());
        assert!(!ada.confirmed);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn expired_confirmation_token_is_rejected() {
        let (db, role_uid) = seeded_db().await;
        let mut user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;

        let config = config();
        let issued = Utc::now() - Duration::minutes(config.confirmation_link_timeout + 1);
        let token = TimedSerializer::new(config.secret_key.as_bytes(), CONFIRM_SALT)
            .dumps_at(&ConfirmPayload { confirm: user.user_uid.clone() }, issued)
            .unwrap();

        let mut session = DbSession::new(db.clone());
        assert!(!user.confirm_token(&token, &config, &mut session).await.unwrap());
        assert!(!user.confirmed);
        session.close();
        assert!(!stored_user(&db, &user.user_uid).await.confirmed);
    }

    #[tokio::test]
    async fn out_of_range_confirmation_timeout_rejects_without_panicking() {
        let (db, role_uid) = seeded_db().await;
        let mut user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;

        let config = SecurityConfig::new("test-secret-key", i64::MAX / 1000);
        let token = user.confirmation_token(&config).unwrap();
        let mut session = DbSession::new(db.clone());
        assert!(!user.confirm_token(&token, &config, &mut session).await.unwrap());
        assert!(!user.confirmed);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn tampered_confirmation_token_is_rejected() {
        let (db, role_uid) = seeded_db().await;
        let mut user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;

        let token = user
            .confirmation_token(&SecurityConfig::new("another-secret", 15))
            .unwrap();
        let mut session = DbSession::new(db.clone());
        assert!(!user.confirm_token(&token, &config(), &mut session).await.unwrap());
        assert!(!user.confirm_token("garbage", &config(), &mut session).await.unwrap());
        assert!(!user.confirmed);
    }

    #[test]
    fn reset_token_verifies_within_window() {
        let user = new_user("role", "ada@example.com");
        let token = user.get_reset_token(10, &config()).unwrap();
        assert_eq!(User::verify_reset_token(&token, &config()).unwrap(), user.user_uid);
    }

    #[test]
    fn reset_token_fails_after_window() {
        let user = new_user("role", "ada@example.com");
        let token = user.get_reset_token(-1, &config()).unwrap();
        assert!(matches!(
            User::verify_reset_token(&token, &config()),
            Err(ModelError::Jwt(_))
        ));
    }

    #[test]
    fn out_of_range_reset_timeout_is_an_error() {
        let user = new_user("role", "ada@example.com");
        assert!(matches!(
            user.get_reset_token(1_000_000_000_000, &config()),
            Err(ModelError::TimeoutOutOfRange(1_000_000_000_000))
        ));
        assert!(matches!(
            user.get_reset_token(i64::MIN, &config()),
            Err(ModelError::TimeoutOutOfRange(_))
        ));
    }

    #[test]
    fn reset_token_with_other_secret_fails() {
        let user = new_user("role", "ada@example.com");
        let token = user.get_reset_token(10, &config()).unwrap();
        let other = SecurityConfig::new("another-secret", 15);
        assert!(User::verify_reset_token(&token, &other).is_err());
    }

    #[test]
    fn reset_tokens_expire_independently() {
        let user = new_user("role", "ada@example.com");
        let long_lived = user.get_reset_token(30, &config()).unwrap();
        let short_lived = user.get_reset_token(5, &config()).unwrap();
        let already_expired = user.get_reset_token(-2, &config()).unwrap();

        assert_eq!(User::verify_reset_token(&long_lived, &config()).unwrap(), user.user_uid);
        assert_eq!(User::verify_reset_token(&short_lived, &config()).unwrap(), user.user_uid);
        assert!(User::verify_reset_token(&already_expired, &config()).is_err());
        // the expired sibling does not affect the live ones
        assert!(User::verify_reset_token(&long_lived, &config()).is_ok());
    }

    #[tokio::test]
    async fn user_loads_with_its_role() {
        let (db, role_uid) = seeded_db().await;
        let user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;

        let mut conn = db.acquire().await.unwrap();
        let loaded = queries::users::find_with_role(&mut conn, &user.user_uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.user.email, "ada@example.com");
        assert_eq!(loaded.role.name, DEFAULT_ROLE);
        assert!(loaded.user.verify_password("correct horse"));

        let users = loaded.role.users(&mut conn).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_uid, user.user_uid);

        let rendered = loaded.to_string();
        assert!(rendered.contains("name: Ada Lovelace"));
        assert!(rendered.contains("permissions: REGISTERED"));
    }

    #[tokio::test]
    async fn update_refreshes_timestamp_and_deactivate_is_soft() {
        let (db, role_uid) = seeded_db().await;
        let mut user = new_user(&role_uid, "ada@example.com");
        insert_user(&db, &user).await;
        let created = user.created;
        user.updated = created - Duration::hours(1);

        let mut conn = db.acquire().await.unwrap();
        queries::users::deactivate(&mut conn, &mut user).await.unwrap();
        drop(conn);

        let stored = stored_user(&db, &user.user_uid).await;
        assert!(!stored.active);
        assert_eq!(stored.created, created);
        assert!(stored.updated > created);
        assert_eq!(stored.updated, user.updated);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (db, role_uid) = seeded_db().await;
        insert_user(&db, &new_user(&role_uid, "ada@example.com")).await;

        let mut conn = db.acquire().await.unwrap();
        let duplicate = new_user(&role_uid, "ada@example.com");
        assert!(queries::users::insert(&mut conn, &duplicate).await.is_err());
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let (db, _) = seeded_db().await;
        let mut conn = db.acquire().await.unwrap();
        let orphan = new_user("no-such-role", "ada@example.com");
        assert!(queries::users::insert(&mut conn, &orphan).await.is_err());
    }
}
