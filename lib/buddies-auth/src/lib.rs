use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use argon2::{
    Argon2,
    password_hash::{
        PasswordHasher,
        PasswordVerifier, rand_core::{OsRng, RngCore}, SaltString
    }
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use buddies_core::UserId;
use buddies_core::authorization::{AuthService, IssuedSession, SessionCookie};
use buddies_utils::async_result;

mod csrf;
mod sweeper;

pub use csrf::CsrfGuard;
pub use sweeper::spawn_session_sweeper;

/// Random bytes behind every session token.
pub const SESSION_TOKEN_BYTES: usize = 64;

pub trait AuthStorage: 'static + Send + Sync + Clone {
    type Error: 'static + std::error::Error + Send + Sync;

    fn create_session(&self, session: &Session) -> async_result!(());
    /// Expired sessions are returned too, the caller decides what to do with them.
    fn fetch_session(&self, token: &str) -> async_result!(Option<Session>);
    fn delete_session(&self, token: &str) -> async_result!(bool);
    /// Returns how many sessions were deleted.
    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> async_result!(u64);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub session_lifetime: chrono::Duration,
    pub secure_cookies: bool,
    /// Key CSRF tokens are signed with. Tokens do not survive a change of the key.
    pub csrf_secret: Vec<u8>,
    pub csrf_max_age: chrono::Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut csrf_secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut csrf_secret);

        AuthConfig {
            session_lifetime: chrono::Duration::minutes(10),
            secure_cookies: false,
            csrf_secret,
            csrf_max_age: chrono::Duration::hours(1),
        }
    }
}

impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("session_lifetime", &self.session_lifetime)
            .field("secure_cookies", &self.secure_cookies)
            .field("csrf_max_age", &self.csrf_max_age)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct AuthServiceError(anyhow::Error);

impl From<anyhow::Error> for AuthServiceError {
    fn from(value: anyhow::Error) -> Self {
        Self(value)
    }
}

impl Display for AuthServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AuthServiceError {}

#[derive(Clone)]
pub struct AuthServiceImpl<A> {
    storage: A,
    config: Arc<AuthConfig>,
    csrf: CsrfGuard,
}

impl<A> AuthServiceImpl<A> {
    pub fn new(storage: A, config: AuthConfig) -> Self {
        let csrf = CsrfGuard::new(&config.csrf_secret, config.csrf_max_age);
        Self { storage, config: Arc::new(config), csrf }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

impl<A: AuthStorage> AuthServiceImpl<A> {
    /// Deletes every session that has run out. Returns how many there were.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthServiceError> {
        let purged = self.storage
            .delete_expired_sessions(Utc::now()).await
            .context("Couldn't delete expired sessions")?;
        Ok(purged)
    }
}

impl<A: AuthStorage> AuthService for AuthServiceImpl<A> {
    type Error = AuthServiceError;

    async fn hash_password(&self, password: String) -> Result<String, Self::Error> {
        let handle = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = match Argon2::default().hash_password(password.as_bytes(), &salt) {
                Ok(hash) => hash,
                Err(e) => bail!("Couldn't generate password hash: {e}"),
            };
            Ok(PasswordHash::from(password_hash))
        });

        let password_hash = handle.await.context("Password hash generation thread failed")??;
        Ok(password_hash.to_string())
    }

    async fn verify_password(&self, password: String, password_hash: String) -> Result<bool, Self::Error> {
        let password_hash: PasswordHash = password_hash.parse().context("Stored password hash is unusable")?;

        let handle = tokio::task::spawn_blocking(move || {
            let password_hash = password_hash.phc_string().password_hash();
            Argon2::default().verify_password(password.as_bytes(), &password_hash).is_ok()
        });

        let res = handle.await.context("Password verification thread failed")?;
        Ok(res)
    }

    async fn issue_session(&self, user_id: &UserId) -> Result<IssuedSession, Self::Error> {
        let now = Utc::now();

        // stale rows go before a new one comes in
        self.storage
            .delete_expired_sessions(now).await
            .context("Couldn't delete expired sessions")?;

        let session = Session {
            token: generate_session_token(),
            user_id: *user_id,
            created_at: now,
            expires_at: now + self.config.session_lifetime,
        };

        self.storage
            .create_session(&session).await
            .with_context(|| format!("Couldn't store session for {user_id}"))?;

        debug!(user_id = %user_id, expires_at = %session.expires_at, "session issued");

        let cookie = SessionCookie::new(session.token.clone(), self.config.session_lifetime, self.config.secure_cookies);
        Ok(IssuedSession { token: session.token, cookie })
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<UserId>, Self::Error> {
        let session = self.storage
            .fetch_session(token).await
            .context("Couldn't fetch session")?;

        let session = match session {
            Some(session) => session,
            None => return Ok(None),
        };

        let now = Utc::now();
        if session.is_expired(now) {
            // takes this row and every other stale one with it
            self.storage
                .delete_expired_sessions(now).await
                .context("Couldn't delete expired sessions")?;
            return Ok(None);
        }

        Ok(Some(session.user_id))
    }

    async fn end_session(&self, token: &str) -> Result<(), Self::Error> {
        self.storage
            .delete_session(token).await
            .context("Couldn't delete session")?;
        Ok(())
    }

    fn expired_session_cookie(&self) -> SessionCookie {
        SessionCookie::new(String::new(), chrono::Duration::zero(), self.config.secure_cookies)
    }

    fn issue_csrf_token(&self) -> String {
        self.csrf.issue(Utc::now())
    }

    fn verify_csrf_token(&self, token: &str) -> bool {
        self.csrf.verify(token, Utc::now())
    }
}

pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Argon2 hash in PHC string format, as it is stored next to the user.
pub struct PasswordHash {
    phc_string: password_hash::PasswordHashString,
}

impl PasswordHash {
    pub fn phc_string(&self) -> &password_hash::PasswordHashString {
        &self.phc_string
    }
}

impl<'a> From<password_hash::PasswordHash<'a>> for PasswordHash {
    fn from(value: password_hash::PasswordHash<'a>) -> Self {
        PasswordHash { phc_string: value.into() }
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.phc_string, f)
    }
}

impl FromStr for PasswordHash {
    type Err = PasswordHashParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse() {
            Ok(phc_string) => Ok(PasswordHash { phc_string }),
            Err(_) => Err(PasswordHashParsingError::IncorrectPHCString),
        }
    }
}

#[derive(Error, Debug)]
pub enum PasswordHashParsingError {
    #[error("Incorrect phc string")]
    IncorrectPHCString,
}
