use anyhow::Context;

use buddies_utils::log_internal_error;

use crate::chats::ChatAuthority;
use crate::data_access::DataAccess;
use crate::feed::ChatFeed;
use crate::{ChatId, Error, Message, NewMessage, Result, UserId};

pub const MAX_MESSAGE_LEN: usize = 600;

#[derive(Clone)]
pub struct MessageStore<D> {
    data_access: D,
    chats: ChatAuthority<D>,
    feed: ChatFeed,
}

impl<D: DataAccess> MessageStore<D> {
    pub fn new(data_access: D, chats: ChatAuthority<D>, feed: ChatFeed) -> Self {
        MessageStore { data_access, chats, feed }
    }

    pub async fn post_message(&self, acting_user_id: &UserId, chat_id: &ChatId, content: &str, author_name: &str) -> Result<Message> {
        self.chats.require_member(acting_user_id, chat_id).await?;

        if content.trim().is_empty() {
            return Err(Error::validation("Please write a message first"));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(Error::validation("A message can have at most 600 characters"));
        }

        let new_message = NewMessage {
            chat_id: *chat_id,
            author_id: *acting_user_id,
            author_name: author_name.to_owned(),
            content: content.to_owned(),
        };

        let message = self.data_access
            .create_message(&new_message).await
            .with_context(|| format!("Couldn't store message from {acting_user_id} in chat {chat_id}"))?;

        if let Err(e) = self.feed.publish(&message) {
            log_internal_error(e);
        };

        Ok(message)
    }

    /// Full history of the chat, oldest first. Does not check membership.
    pub async fn history(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        self.chats.fetch_chat(chat_id).await?;
        let messages = self.data_access
            .fetch_chat_messages(chat_id).await
            .with_context(|| format!("Couldn't fetch messages of chat {chat_id}"))?;
        Ok(messages)
    }

    pub async fn history_for(&self, acting_user_id: &UserId, chat_id: &ChatId) -> Result<Vec<Message>> {
        self.chats.require_member(acting_user_id, chat_id).await?;
        self.history(chat_id).await
    }

    pub async fn subscribe(&self, acting_user_id: &UserId, chat_id: &ChatId) -> Result<tokio::sync::mpsc::UnboundedReceiver<Message>> {
        self.chats.require_member(acting_user_id, chat_id).await?;
        let subscription = self.feed
            .subscribe(*chat_id)
            .with_context(|| format!("Couldn't subscribe {acting_user_id} to chat {chat_id}"))?;
        Ok(subscription)
    }
}
