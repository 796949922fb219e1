use anyhow::Context;

use crate::authorization::AuthService;
use crate::{Error, Result, UserId};

/// A user whose session token was checked during the current request.
///
/// Only [`SessionGate`] hands these out, so an operation taking an `Identity` cannot run before
/// the token was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
}

impl Identity {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[derive(Clone)]
pub struct SessionGate<A> {
    auth: A,
}

impl<A: AuthService> SessionGate<A> {
    pub fn new(auth: A) -> Self {
        SessionGate { auth }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(Error::AuthRequired),
        };

        let user_id = self.auth
            .resolve_session(token).await
            .context("Couldn't resolve session")?;

        match user_id {
            Some(user_id) => Ok(Identity { user_id }),
            None => Err(Error::AuthRequired),
        }
    }
}
