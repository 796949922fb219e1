use buddies_utils::async_result;

use crate::UserId;

pub const SESSION_COOKIE: &str = "sessionToken";

pub trait AuthService: 'static + Send + Sync + Clone {
    type Error: 'static + std::error::Error + Send + Sync;

    fn hash_password(&self, password: String) -> async_result!(String);
    fn verify_password(&self, password: String, password_hash: String) -> async_result!(bool);

    fn issue_session(&self, user_id: &UserId) -> async_result!(IssuedSession);
    /// `None` for unknown and expired tokens alike.
    fn resolve_session(&self, token: &str) -> async_result!(Option<UserId>);
    fn end_session(&self, token: &str) -> async_result!(());
    fn expired_session_cookie(&self) -> SessionCookie;

    fn issue_csrf_token(&self) -> String;
    fn verify_csrf_token(&self, token: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub cookie: SessionCookie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age: chrono::Duration,
    pub http_only: bool,
    pub secure: bool,
    pub same_site_lax: bool,
    pub path: &'static str,
}

impl SessionCookie {
    pub fn new(value: String, max_age: chrono::Duration, secure: bool) -> Self {
        SessionCookie {
            name: SESSION_COOKIE,
            value,
            max_age,
            http_only: true,
            secure,
            same_site_lax: true,
            path: "/",
        }
    }

    pub fn to_header_value(&self) -> String {
        let mut res = format!("{}={}; Max-Age={}; Path={}", self.name, self.value, self.max_age.num_seconds(), self.path);
        if self.http_only {
            res.push_str("; HttpOnly");
        }
        if self.secure {
            res.push_str("; Secure");
        }
        if self.same_site_lax {
            res.push_str("; SameSite=Lax");
        }
        res
    }
}
