use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;

use buddies_core::data_access::DataAccess;
use buddies_core::{
    Chat, ChatId, Credentials, Interest, InterestId, MembershipChange, Message, MessageId, NewMessage, NewUser,
    ProfileUpdate, User, UserId, UserSummary,
};
use buddies_auth::{AuthStorage, Session};

pub const INTEREST_CATALOG: [&str; 15] = [
    "Hiking",
    "Gym",
    "Team Sports",
    "Outdoor activities",
    "Dancing",
    "Cinema",
    "Concerts",
    "Climbing",
    "Theater",
    "Museums",
    "Pubs & Bars",
    "Restaurants & Cafés",
    "Arts & Crafts",
    "Running",
    "Lectures & Discussions",
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Thread poisoning error")]
    ThreadPoisonError,
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::ThreadPoisonError
    }
}

struct UserRecord {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    interests: Vec<Interest>,
    user_interests: Vec<(UserId, InterestId)>,
    chats: Vec<Chat>,
    chat_members: Vec<(ChatId, UserId)>,
    messages: Vec<Message>,
    last_message_id: MessageId,
    sessions: Vec<Session>,
}

impl Tables {
    fn user(&self, user_id: &UserId) -> Option<&UserRecord> {
        self.users.iter().find(|record| record.user.id == *user_id)
    }

    fn chat_exists(&self, chat_id: &ChatId) -> bool {
        self.chats.iter().any(|chat| chat.id == *chat_id)
    }

    fn member_count(&self, chat_id: &ChatId) -> usize {
        self.chat_members.iter().filter(|(chat, _)| chat == chat_id).count()
    }

    fn is_member(&self, chat_id: &ChatId, user_id: &UserId) -> bool {
        self.chat_members.iter().any(|(chat, user)| chat == chat_id && user == user_id)
    }

    fn user_interests(&self, user_id: &UserId) -> Vec<Interest> {
        let mut res: Vec<Interest> = self.user_interests.iter()
            .filter(|(user, _)| user == user_id)
            .filter_map(|(_, interest_id)| self.interests.iter().find(|interest| interest.id == *interest_id))
            .cloned()
            .collect();
        res.sort_by_key(|interest| interest.id);
        res
    }

    fn set_user_interests(&mut self, user_id: &UserId, interests: &[InterestId]) {
        self.user_interests.retain(|(user, _)| user != user_id);
        for interest_id in interests {
            if !self.user_interests.contains(&(*user_id, *interest_id)) {
                self.user_interests.push((*user_id, *interest_id));
            }
        }
    }

    fn remove_chat(&mut self, chat_id: &ChatId) -> bool {
        self.messages.retain(|message| message.chat_id != *chat_id);
        self.chat_members.retain(|(chat, _)| chat != chat_id);
        let chats_before = self.chats.len();
        self.chats.retain(|chat| chat.id != *chat_id);
        self.chats.len() != chats_before
    }
}

/// In-memory storage. Every operation runs under one lock, so multi-table changes are atomic.
#[derive(Clone)]
pub struct Db {
    tables: Arc<Mutex<Tables>>,
}

impl Db {
    pub fn new() -> Self {
        let interests = INTEREST_CATALOG.iter()
            .zip(1..)
            .map(|(title, id)| Interest { id, title: (*title).to_owned() })
            .collect();

        let tables = Tables { interests, ..Default::default() };
        Db { tables: Arc::new(Mutex::new(tables)) }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl DataAccess for Db {
    type Error = Error;

    async fn create_user(&self, user: &NewUser, interests: &[InterestId]) -> Result<Option<UserId>, Self::Error> {
        let mut tables = self.tables.lock()?;

        if tables.users.iter().any(|record| record.user.email == user.email) {
            return Ok(None);
        }

        let user_id = uuid::Uuid::new_v4();
        tables.users.push(UserRecord {
            user: User {
                id: user_id,
                name: user.name.clone(),
                avatar: user.avatar.clone(),
                bio: user.bio.clone(),
                email: user.email.clone(),
            },
            password_hash: user.password_hash.clone(),
        });
        tables.set_user_interests(&user_id, interests);

        Ok(Some(user_id))
    }

    async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, Self::Error> {
        Ok(self.tables.lock()?.user(user_id).map(|record| record.user.clone()))
    }

    async fn fetch_user_ids(&self) -> Result<Vec<UserId>, Self::Error> {
        let mut res: Vec<UserId> = self.tables.lock()?.users.iter().map(|record| record.user.id).collect();
        res.sort();
        Ok(res)
    }

    async fn fetch_credentials(&self, email: &str) -> Result<Option<Credentials>, Self::Error> {
        let res = self.tables.lock()?.users.iter()
            .find(|record| record.user.email == email)
            .map(|record| Credentials { user_id: record.user.id, password_hash: record.password_hash.clone() });
        Ok(res)
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate, interests: &[InterestId]) -> Result<bool, Self::Error> {
        let mut tables = self.tables.lock()?;

        let record = match tables.users.iter_mut().find(|record| record.user.id == *user_id) {
            Some(record) => record,
            None => return Ok(false),
        };
        record.user.name = update.name.clone();
        record.user.avatar = update.avatar.clone();
        record.user.bio = update.bio.clone();

        tables.set_user_interests(user_id, interests);
        Ok(true)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<Option<String>, Self::Error> {
        let mut tables = self.tables.lock()?;

        let name = match tables.user(user_id) {
            Some(record) => record.user.name.clone(),
            None => return Ok(None),
        };

        tables.sessions.retain(|session| session.user_id != *user_id);
        tables.user_interests.retain(|(user, _)| user != user_id);
        tables.chat_members.retain(|(_, user)| user != user_id);
        tables.users.retain(|record| record.user.id != *user_id);
        Ok(Some(name))
    }

    async fn fetch_interests(&self) -> Result<Vec<Interest>, Self::Error> {
        Ok(self.tables.lock()?.interests.clone())
    }

    async fn fetch_user_interests(&self, user_id: &UserId) -> Result<Vec<Interest>, Self::Error> {
        Ok(self.tables.lock()?.user_interests(user_id))
    }

    async fn fetch_all_user_interests(&self) -> Result<Vec<(UserId, Vec<Interest>)>, Self::Error> {
        let tables = self.tables.lock()?;
        let mut res: Vec<(UserId, Vec<Interest>)> = tables.users.iter()
            .map(|record| (record.user.id, tables.user_interests(&record.user.id)))
            .collect();
        res.sort_by_key(|(user_id, _)| *user_id);
        Ok(res)
    }

    async fn create_chat(&self, name: &str, creator_id: &UserId, members: &[UserId]) -> Result<Chat, Self::Error> {
        let mut tables = self.tables.lock()?;

        let chat = Chat { id: uuid::Uuid::new_v4(), name: name.to_owned(), creator_id: *creator_id };
        tables.chats.push(chat.clone());
        tables.chat_members.push((chat.id, *creator_id));
        for member in members {
            if !tables.is_member(&chat.id, member) {
                tables.chat_members.push((chat.id, *member));
            }
        }

        Ok(chat)
    }

    async fn fetch_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, Self::Error> {
        Ok(self.tables.lock()?.chats.iter().find(|chat| chat.id == *chat_id).cloned())
    }

    async fn fetch_users_chats(&self, user_id: &UserId) -> Result<Vec<Chat>, Self::Error> {
        let tables = self.tables.lock()?;
        let mut res: Vec<Chat> = tables.chats.iter()
            .filter(|chat| tables.is_member(&chat.id, user_id))
            .cloned()
            .collect();
        res.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(res)
    }

    async fn fetch_chat_members(&self, chat_id: &ChatId) -> Result<Vec<UserSummary>, Self::Error> {
        let tables = self.tables.lock()?;
        let mut res: Vec<UserSummary> = tables.chat_members.iter()
            .filter(|(chat, _)| chat == chat_id)
            .filter_map(|(_, user_id)| tables.user(user_id))
            .map(|record| UserSummary::from(record.user.clone()))
            .collect();
        res.sort_by_key(|member| member.id);
        Ok(res)
    }

    async fn add_chat_member(&self, chat_id: &ChatId, user_id: &UserId, capacity: usize) -> Result<MembershipChange, Self::Error> {
        let mut tables = self.tables.lock()?;

        if !tables.chat_exists(chat_id) {
            return Ok(MembershipChange::ChatNotFound);
        }
        if tables.is_member(chat_id, user_id) {
            return Ok(MembershipChange::AlreadyMember);
        }
        if tables.member_count(chat_id) >= capacity {
            return Ok(MembershipChange::ChatFull);
        }

        tables.chat_members.push((*chat_id, *user_id));
        Ok(MembershipChange::Added)
    }

    async fn remove_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<bool, Self::Error> {
        let mut tables = self.tables.lock()?;
        let members_before = tables.chat_members.len();
        tables.chat_members.retain(|(chat, user)| !(chat == chat_id && user == user_id));
        Ok(tables.chat_members.len() != members_before)
    }

    async fn delete_chat(&self, chat_id: &ChatId) -> Result<bool, Self::Error> {
        Ok(self.tables.lock()?.remove_chat(chat_id))
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, Self::Error> {
        let mut tables = self.tables.lock()?;

        tables.last_message_id += 1;
        let message = Message {
            id: tables.last_message_id,
            chat_id: message.chat_id,
            author_id: message.author_id,
            author_name: message.author_name.clone(),
            content: message.content.clone(),
            timestamp: Utc::now(),
        };
        tables.messages.push(message.clone());

        Ok(message)
    }

    async fn fetch_chat_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, Self::Error> {
        let mut res: Vec<Message> = self.tables.lock()?.messages.iter()
            .filter(|message| message.chat_id == *chat_id)
            .cloned()
            .collect();
        res.sort_by_key(|message| (message.timestamp, message.id));
        Ok(res)
    }
}

impl AuthStorage for Db {
    type Error = Error;

    async fn create_session(&self, session: &Session) -> Result<(), Self::Error> {
        self.tables.lock()?.sessions.push(session.clone());
        Ok(())
    }

    async fn fetch_session(&self, token: &str) -> Result<Option<Session>, Self::Error> {
        Ok(self.tables.lock()?.sessions.iter().find(|session| session.token == token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<bool, Self::Error> {
        let mut tables = self.tables.lock()?;
        let sessions_before = tables.sessions.len();
        tables.sessions.retain(|session| session.token != token);
        Ok(tables.sessions.len() != sessions_before)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, Self::Error> {
        let mut tables = self.tables.lock()?;
        let sessions_before = tables.sessions.len();
        tables.sessions.retain(|session| !session.is_expired(now));
        Ok((sessions_before - tables.sessions.len()) as u64)
    }
}
