use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub mod accounts;
pub mod authorization;
pub mod buddies;
pub mod chats;
pub mod data_access;
pub mod error;
pub mod feed;
pub mod gate;
pub mod interests;
pub mod matcher;
pub mod messages;
pub mod validation;

pub use buddies::Buddies;
pub use error::{Error, ErrorKind, Result};
pub use gate::Identity;

pub type UserId = Uuid;
pub type ChatId = Uuid;
pub type MessageId = i64;
pub type InterestId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
    pub bio: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary { id: user.id, name: user.name, avatar: user.avatar }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
    pub bio: String,
    pub interests: Vec<Interest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Interest {
    pub id: InterestId,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub avatar: String,
    pub bio: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub avatar: String,
    pub bio: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: UserId,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub creator_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatDetails {
    #[serde(flatten)]
    pub chat: Chat,
    pub members: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    /// May point to a user that no longer exists.
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    #[serde(serialize_with = "buddies_utils::serde::serialize_datetime")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    AlreadyMember,
    ChatFull,
    ChatNotFound,
}
