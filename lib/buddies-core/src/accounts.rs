use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::authorization::{AuthService, IssuedSession, SessionCookie};
use crate::buddies::Buddies;
use crate::data_access::DataAccess;
use crate::gate::Identity;
use crate::matcher::MatchStrategy;
use crate::validation;
use crate::{Account, Credentials, Error, InterestId, NewUser, ProfileUpdate, Result, UserId, UserProfile};

#[derive(Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub avatar: String,
    pub bio: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub interests: Vec<InterestId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    pub name: String,
    pub avatar: String,
    pub bio: String,
    #[serde(default)]
    pub interests: Vec<InterestId>,
}

const LOGIN_FAILED: &str = "Login information incorrect";

impl<D: DataAccess, A: AuthService, S: MatchStrategy> Buddies<D, A, S> {
    pub async fn register(&self, csrf_token: &str, registration: Registration) -> Result<(Account, IssuedSession)> {
        self.check_csrf_token(csrf_token)?;

        let name = validation::user_name(&registration.name)?;
        let email = validation::email(&registration.email)?;
        let avatar = validation::avatar(&registration.avatar, &email)?;
        let bio = validation::bio(&registration.bio)?;
        validation::password(&registration.password)?;
        let interests = self.interests.check_selection(&registration.interests).await?;

        if self.find_credentials(&email).await?.is_some() {
            return Err(email_taken());
        }

        let password_hash = self.auth
            .hash_password(registration.password).await
            .context("Couldn't hash password")?;

        let new_user = NewUser { name, avatar, bio, email, password_hash };
        let user_id = self.data_access
            .create_user(&new_user, &interests).await
            .with_context(|| format!("Couldn't create user {}", new_user.email))?
            // someone registered the same address since the check above
            .ok_or_else(email_taken)?;

        let session = self.issue_session(&user_id).await?;
        let account = self.account_of(&user_id).await?;

        info!(user_id = %user_id, "user registered");
        Ok((account, session))
    }

    pub async fn login(&self, csrf_token: &str, email: &str, password: String) -> Result<(UserId, IssuedSession)> {
        self.check_csrf_token(csrf_token)?;

        let email = email.trim();
        if email.is_empty() {
            return Err(Error::validation("Please type in your email address"));
        }
        validation::password(&password)?;

        let credentials = match self.find_credentials(email).await? {
            Some(credentials) => credentials,
            None => return Err(Error::validation(LOGIN_FAILED)),
        };

        let password_correct = self.auth
            .verify_password(password, credentials.password_hash).await
            .with_context(|| format!("Couldn't verify password of {}", credentials.user_id))?;

        if !password_correct {
            return Err(Error::validation(LOGIN_FAILED));
        }

        let session = self.issue_session(&credentials.user_id).await?;
        Ok((credentials.user_id, session))
    }

    pub async fn logout(&self, token: &str) -> Result<SessionCookie> {
        self.auth
            .end_session(token).await
            .context("Couldn't end session")?;
        Ok(self.auth.expired_session_cookie())
    }

    pub async fn account(&self, identity: &Identity) -> Result<Account> {
        self.account_of(&identity.user_id()).await
    }

    pub async fn user_profile(&self, _identity: &Identity, user_id: &UserId) -> Result<UserProfile> {
        self.find_profile(user_id).await?
            .ok_or_else(|| Error::not_found("This user does not exist"))
    }

    pub async fn update_profile(&self, identity: &Identity, form: ProfileForm) -> Result<Account> {
        let user_id = identity.user_id();
        let user = self.data_access
            .fetch_user(&user_id).await
            .with_context(|| format!("Couldn't fetch user {user_id}"))?
            .ok_or(Error::AuthRequired)?;

        let update = ProfileUpdate {
            name: validation::user_name(&form.name)?,
            avatar: validation::avatar(&form.avatar, &user.email)?,
            bio: validation::bio(&form.bio)?,
        };
        let interests = self.interests.check_selection(&form.interests).await?;

        let updated = self.data_access
            .update_profile(&user_id, &update, &interests).await
            .with_context(|| format!("Couldn't update profile of {user_id}"))?;

        if !updated {
            return Err(Error::AuthRequired);
        }

        self.account_of(&user_id).await
    }

    /// Chats and messages outlive the account, only its memberships go. Returns the name the
    /// account had.
    pub async fn delete_account(&self, identity: &Identity) -> Result<(String, SessionCookie)> {
        let user_id = identity.user_id();

        let name = self.data_access
            .delete_user(&user_id).await
            .with_context(|| format!("Couldn't delete user {user_id}"))?
            .ok_or(Error::AuthRequired)?;

        info!(user_id = %user_id, "user deleted");
        Ok((name, self.auth.expired_session_cookie()))
    }

    pub(crate) async fn find_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let user = self.data_access
            .fetch_user(user_id).await
            .with_context(|| format!("Couldn't fetch user {user_id}"))?;

        let user = match user {
            Some(user) => user,
            None => return Ok(None),
        };

        let interests = self.interests.interests_of(user_id).await?;
        Ok(Some(UserProfile { id: user.id, name: user.name, avatar: user.avatar, bio: user.bio, interests }))
    }

    async fn account_of(&self, user_id: &UserId) -> Result<Account> {
        let user = self.data_access
            .fetch_user(user_id).await
            .with_context(|| format!("Couldn't fetch user {user_id}"))?
            .ok_or(Error::AuthRequired)?;

        let interests = self.interests.interests_of(user_id).await?;
        let profile = UserProfile { id: user.id, name: user.name, avatar: user.avatar, bio: user.bio, interests };
        Ok(Account { profile, email: user.email })
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>> {
        let credentials = self.data_access
            .fetch_credentials(email).await
            .with_context(|| format!("Couldn't fetch credentials for {email}"))?;
        Ok(credentials)
    }

    async fn issue_session(&self, user_id: &UserId) -> Result<IssuedSession> {
        let session = self.auth
            .issue_session(user_id).await
            .with_context(|| format!("Couldn't issue session for {user_id}"))?;
        Ok(session)
    }

    fn check_csrf_token(&self, csrf_token: &str) -> Result<()> {
        if csrf_token.is_empty() {
            return Err(Error::validation("CSRF token not provided"));
        }
        if !self.auth.verify_csrf_token(csrf_token) {
            return Err(Error::validation("Invalid CSRF token"));
        }
        Ok(())
    }
}

fn email_taken() -> Error {
    Error::Conflict("A profile with this email address already exists.".into())
}
