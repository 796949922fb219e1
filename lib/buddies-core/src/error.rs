use serde::Serialize;
use thiserror::Error;

use buddies_utils::log_internal_error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Display output is always safe to show to the person using the app. `Internal` keeps its cause
/// for logs only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("This user is already in the chat")]
    AlreadyMember,
    #[error("Please log in")]
    AuthRequired,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("A chat can have at most {0} members")]
    CapacityExceeded(usize),
    #[error("Something went wrong on our side, please try again later")]
    Internal(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    Conflict,
    AlreadyMember,
    AuthRequired,
    Forbidden,
    NotFound,
    CapacityExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::AlreadyMember => "ALREADY_MEMBER",
            ErrorKind::AuthRequired => "AUTH_REQUIRED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::AlreadyMember)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::AlreadyMember => ErrorKind::AlreadyMember,
            Error::AuthRequired => ErrorKind::AuthRequired,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Error::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        log_internal_error(&error);
        Error::Internal(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_their_cause() {
        let error = Error::from(anyhow::anyhow!("connection refused by 10.0.0.3:5432"));
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(!error.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn already_member_is_a_conflict() {
        assert!(Error::AlreadyMember.kind().is_conflict());
        assert_eq!(Error::AlreadyMember.kind().as_str(), "ALREADY_MEMBER");
    }
}
