use std::future::Future;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Executor, PgPool, query, Row};

use buddies_core::data_access::DataAccess;
use buddies_core::{
    Chat, ChatId, Credentials, Interest, InterestId, MembershipChange, Message, NewMessage, NewUser, ProfileUpdate,
    User, UserId, UserSummary,
};
use buddies_auth::{AuthStorage, Session};

pub const MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
const DB_VERSION: i64 = 7;

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let options: PgConnectOptions = connection_string.parse()?;
        let pool = PgPool::connect_with(options).await?;

        Ok(Db { pool })
    }

    pub fn graceful_shutdown(&self, cancellation_token: CancellationToken) -> impl Future<Output = Result<(), JoinError>> {
        let pool_cloned = self.pool.clone();
        tokio::spawn(async move {
            cancellation_token.cancelled().await;
            info!("Shutting down database connection...");
            pool_cloned.close().await;
            info!("Shutting down database connection...Success");
        })
    }

    pub async fn check_migrations(&self) -> Result<()> {
        let migrations_table_exists: bool = self.pool
            .acquire().await?
            .fetch_one(query("select exists (select from pg_tables where (schemaname = 'public') and (tablename = '_sqlx_migrations'))"))
            .await?
            .get(0);

        if !migrations_table_exists {
            bail!("Database uninitialized. Please migrate database using the 'migrate' tool");
        }

        let latest_version: i64 = self.pool
            .acquire().await?
            .fetch_optional(query("select version from _sqlx_migrations order by version desc limit 1"))
            .await?
            .map(|row| row.get(0))
            .unwrap_or(-1);

        if latest_version < DB_VERSION {
            bail!("Database schema not up to date. Please migrate database using the 'migrate' tool")
        } else if latest_version > DB_VERSION {
            bail!("Application not up to date with the database. Please use a newer version of the app or undo database migrations until version {}", DB_VERSION)
        };

        Ok(())
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("Couldn't migrate")
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Db { pool }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Postgres error: {0}")]
    PgError(#[from] sqlx::Error),
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        avatar: row.get("avatar"),
        bio: row.get("bio"),
        email: row.get("email"),
    }
}

fn chat_from_row(row: &PgRow) -> Chat {
    Chat {
        id: row.get("id"),
        name: row.get("name"),
        creator_id: row.get("creator_id"),
    }
}

fn message_from_row(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        author_id: row.get("user_id"),
        author_name: row.get("name"),
        content: row.get("content"),
        timestamp: row.get("timestamp"),
    }
}

impl DataAccess for Db {
    type Error = Error;

    async fn create_user(&self, user: &NewUser, interests: &[InterestId]) -> Result<Option<UserId>, Self::Error> {
        let user_id = Uuid::new_v4();
        let mut transaction = self.pool.begin().await?;

        let inserted = transaction
            .execute(query(r#"
                insert into users (id, name, avatar, bio, email, pwhash)
                values ($1, $2, $3, $4, $5, $6)
                on conflict (email) do nothing
            "#)
            .bind(user_id)
            .bind(&user.name)
            .bind(&user.avatar)
            .bind(&user.bio)
            .bind(&user.email)
            .bind(&user.password_hash)).await?
            .rows_affected();

        if inserted == 0 {
            return Ok(None);
        }

        transaction.execute(query(r#"
                insert into user_activities (user_id, activity_id)
                select $1, unnest($2::integer[])
                on conflict do nothing
            "#).bind(user_id).bind(interests)).await?;

        transaction.commit().await?;

        Ok(Some(user_id))
    }

    async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_optional(query("select id, name, avatar, bio, email from users where id = $1").bind(user_id)).await?
            .map(|row| user_from_row(&row));
        Ok(res)
    }

    async fn fetch_user_ids(&self) -> Result<Vec<UserId>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all("select id from users order by id").await?
            .iter()
            .map(|row| row.get(0))
            .collect();
        Ok(res)
    }

    async fn fetch_credentials(&self, email: &str) -> Result<Option<Credentials>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_optional(query("select id, pwhash from users where email = $1").bind(email)).await?
            .map(|row| Credentials { user_id: row.get(0), password_hash: row.get(1) });
        Ok(res)
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate, interests: &[InterestId]) -> Result<bool, Self::Error> {
        let mut transaction = self.pool.begin().await?;

        let updated = transaction
            .execute(query("update users set name = $1, avatar = $2, bio = $3 where id = $4")
            .bind(&update.name)
            .bind(&update.avatar)
            .bind(&update.bio)
            .bind(user_id)).await?
            .rows_affected();

        if updated == 0 {
            return Ok(false);
        }

        transaction.execute(query("delete from user_activities where user_id = $1").bind(user_id)).await?;
        transaction.execute(query(r#"
                insert into user_activities (user_id, activity_id)
                select $1, unnest($2::integer[])
                on conflict do nothing
            "#).bind(user_id).bind(interests)).await?;

        transaction.commit().await?;
        Ok(true)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<Option<String>, Self::Error> {
        let mut transaction = self.pool.begin().await?;

        let name: String = match transaction
            .fetch_optional(query("select name from users where id = $1 for update").bind(user_id)).await? {
            Some(row) => row.get(0),
            None => return Ok(None),
        };

        let steps = [
            "delete from sessions where user_id = $1",
            "delete from user_activities where user_id = $1",
            "delete from chat_users where user_id = $1",
            "delete from users where id = $1",
        ];
        for step in steps {
            transaction.execute(query(step).bind(user_id)).await?;
        }

        transaction.commit().await?;
        Ok(Some(name))
    }

    async fn fetch_interests(&self) -> Result<Vec<Interest>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all("select id, title from activities order by id").await?
            .iter()
            .map(|row| Interest { id: row.get(0), title: row.get(1) })
            .collect();
        Ok(res)
    }

    async fn fetch_user_interests(&self, user_id: &UserId) -> Result<Vec<Interest>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all(query(r#"
                select activities.id, activities.title
                from user_activities
                    join activities on activities.id = user_activities.activity_id
                where user_activities.user_id = $1
                order by activities.id
            "#).bind(user_id)).await?
            .iter()
            .map(|row| Interest { id: row.get(0), title: row.get(1) })
            .collect();
        Ok(res)
    }

    async fn fetch_all_user_interests(&self) -> Result<Vec<(UserId, Vec<Interest>)>, Self::Error> {
        let rows = self.pool.acquire().await?
            .fetch_all(r#"
                select users.id, activities.id, activities.title
                from users
                    left join user_activities on user_activities.user_id = users.id
                    left join activities on activities.id = user_activities.activity_id
                order by users.id, activities.id
            "#).await?;

        let mut res: Vec<(UserId, Vec<Interest>)> = vec![];
        for row in rows {
            let user_id: UserId = row.get(0);
            let interest_id: Option<InterestId> = row.get(1);
            let title: Option<String> = row.get(2);

            if res.last().map(|(last, _)| *last != user_id).unwrap_or(true) {
                res.push((user_id, vec![]));
            }
            if let (Some(id), Some(title), Some((_, interests))) = (interest_id, title, res.last_mut()) {
                interests.push(Interest { id, title });
            }
        }
        Ok(res)
    }

    async fn create_chat(&self, name: &str, creator_id: &UserId, members: &[UserId]) -> Result<Chat, Self::Error> {
        let chat = Chat { id: Uuid::new_v4(), name: name.to_owned(), creator_id: *creator_id };
        let mut transaction = self.pool.begin().await?;

        transaction.execute(query("insert into chats (id, name, creator_id) values ($1, $2, $3)")
            .bind(chat.id)
            .bind(&chat.name)
            .bind(chat.creator_id)).await?;

        let mut member_ids = vec![*creator_id];
        member_ids.extend_from_slice(members);
        transaction.execute(query(r#"
                insert into chat_users (chat_id, user_id)
                select $1, unnest($2::uuid[])
                on conflict do nothing
            "#).bind(chat.id).bind(&member_ids)).await?;

        transaction.commit().await?;
        Ok(chat)
    }

    async fn fetch_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_optional(query("select id, name, creator_id from chats where id = $1").bind(chat_id)).await?
            .map(|row| chat_from_row(&row));
        Ok(res)
    }

    async fn fetch_users_chats(&self, user_id: &UserId) -> Result<Vec<Chat>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all(query(r#"
                select chats.id, chats.name, chats.creator_id
                from chats
                    join chat_users on chat_users.chat_id = chats.id
                where chat_users.user_id = $1
                order by chats.name, chats.id
            "#).bind(user_id)).await?
            .iter()
            .map(chat_from_row)
            .collect();
        Ok(res)
    }

    async fn fetch_chat_members(&self, chat_id: &ChatId) -> Result<Vec<UserSummary>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all(query(r#"
                select users.id, users.name, users.avatar
                from chat_users
                    join users on users.id = chat_users.user_id
                where chat_users.chat_id = $1
                order by users.id
            "#).bind(chat_id)).await?
            .iter()
            .map(|row| UserSummary { id: row.get(0), name: row.get(1), avatar: row.get(2) })
            .collect();
        Ok(res)
    }

    async fn add_chat_member(&self, chat_id: &ChatId, user_id: &UserId, capacity: usize) -> Result<MembershipChange, Self::Error> {
        let mut transaction = self.pool.begin().await?;

        // concurrent adds to the same chat queue up here
        let chat = transaction
            .fetch_optional(query("select id from chats where id = $1 for update").bind(chat_id)).await?;
        if chat.is_none() {
            return Ok(MembershipChange::ChatNotFound);
        }

        let already_member: bool = transaction
            .fetch_one(query("select exists(select 1 from chat_users where chat_id = $1 and user_id = $2)")
            .bind(chat_id)
            .bind(user_id)).await?
            .get(0);
        if already_member {
            return Ok(MembershipChange::AlreadyMember);
        }

        let member_count: i64 = transaction
            .fetch_one(query("select count(*) from chat_users where chat_id = $1").bind(chat_id)).await?
            .get(0);
        if member_count >= i64::try_from(capacity).unwrap_or(i64::MAX) {
            return Ok(MembershipChange::ChatFull);
        }

        transaction.execute(query("insert into chat_users (chat_id, user_id) values ($1, $2)")
            .bind(chat_id)
            .bind(user_id)).await?;

        transaction.commit().await?;
        Ok(MembershipChange::Added)
    }

    async fn remove_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<bool, Self::Error> {
        let removed = self.pool.acquire().await?
            .execute(query("delete from chat_users where chat_id = $1 and user_id = $2")
            .bind(chat_id)
            .bind(user_id)).await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn delete_chat(&self, chat_id: &ChatId) -> Result<bool, Self::Error> {
        let mut transaction = self.pool.begin().await?;

        transaction.execute(query("delete from messages where chat_id = $1").bind(chat_id)).await?;
        transaction.execute(query("delete from chat_users where chat_id = $1").bind(chat_id)).await?;
        let deleted = transaction
            .execute(query("delete from chats where id = $1").bind(chat_id)).await?
            .rows_affected();

        transaction.commit().await?;
        Ok(deleted > 0)
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, Self::Error> {
        let row = self.pool.acquire().await?
            .fetch_one(query(r#"
                insert into messages (chat_id, user_id, name, content)
                values ($1, $2, $3, $4)
                returning id, chat_id, user_id, name, content, timestamp
            "#)
            .bind(message.chat_id)
            .bind(message.author_id)
            .bind(&message.author_name)
            .bind(&message.content)).await?;
        Ok(message_from_row(&row))
    }

    async fn fetch_chat_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_all(query(r#"
                select id, chat_id, user_id, name, content, timestamp
                from messages
                where chat_id = $1
                order by timestamp, id
            "#).bind(chat_id)).await?
            .iter()
            .map(message_from_row)
            .collect();
        Ok(res)
    }
}

impl AuthStorage for Db {
    type Error = Error;

    async fn create_session(&self, session: &Session) -> Result<(), Self::Error> {
        self.pool.acquire().await?
            .execute(query("insert into sessions (token, user_id, created_at, expires_at) values ($1, $2, $3, $4)")
            .bind(&session.token)
            .bind(session.user_id)
            .bind(session.created_at)
            .bind(session.expires_at)).await?;
        Ok(())
    }

    async fn fetch_session(&self, token: &str) -> Result<Option<Session>, Self::Error> {
        let res = self.pool.acquire().await?
            .fetch_optional(query("select token, user_id, created_at, expires_at from sessions where token = $1").bind(token)).await?
            .map(|row| Session {
                token: row.get(0),
                user_id: row.get(1),
                created_at: row.get(2),
                expires_at: row.get(3),
            });
        Ok(res)
    }

    async fn delete_session(&self, token: &str) -> Result<bool, Self::Error> {
        let deleted = self.pool.acquire().await?
            .execute(query("delete from sessions where token = $1").bind(token)).await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, Self::Error> {
        let deleted = self.pool.acquire().await?
            .execute(query("delete from sessions where expires_at <= $1").bind(now)).await?
            .rows_affected();
        Ok(deleted)
    }
}
