use std::collections::BTreeSet;

use anyhow::Context;
use tracing::debug;

use crate::data_access::DataAccess;
use crate::validation;
use crate::{Chat, ChatId, Error, MembershipChange, Result, UserId, UserSummary};

pub const MAX_CHAT_MEMBERS: usize = 5;
pub const MAX_CHAT_NAME_LEN: usize = 50;
pub const MAX_INVITEES: usize = MAX_CHAT_MEMBERS - 1;

/// The creator of a chat is its admin: only they add members or delete the chat, and they cannot
/// leave it. Everyone else may only remove themselves.
#[derive(Clone)]
pub struct ChatAuthority<D> {
    data_access: D,
}

impl<D: DataAccess> ChatAuthority<D> {
    pub fn new(data_access: D) -> Self {
        ChatAuthority { data_access }
    }

    pub async fn create_chat(&self, creator_id: &UserId, name: &str) -> Result<Chat> {
        let name = chat_name(name)?;
        self.create_with_members(creator_id, name, BTreeSet::new()).await
    }

    pub async fn start_chat(&self, creator_id: &UserId, name: &str, invitees: &[UserId]) -> Result<Chat> {
        let name = chat_name(name)?;

        let invitees: BTreeSet<UserId> = invitees.iter().copied().filter(|id| id != creator_id).collect();
        if invitees.is_empty() || invitees.len() > MAX_INVITEES {
            return Err(Error::validation("Please select between one and four buddies to chat with"));
        }

        self.create_with_members(creator_id, name, invitees).await
    }

    async fn create_with_members(&self, creator_id: &UserId, name: String, invitees: BTreeSet<UserId>) -> Result<Chat> {
        for invitee in &invitees {
            self.require_user(invitee).await?;
        }

        let invitees: Vec<UserId> = invitees.into_iter().collect();
        let chat = self.data_access
            .create_chat(&name, creator_id, &invitees).await
            .with_context(|| format!("Couldn't create chat {name:?} for {creator_id}"))?;

        debug!(chat_id = %chat.id, creator_id = %creator_id, members = invitees.len() + 1, "chat created");
        Ok(chat)
    }

    pub async fn add_member(&self, acting_user_id: &UserId, target_user_id: &UserId, chat_id: &ChatId) -> Result<()> {
        let chat = self.fetch_chat(chat_id).await?;
        if chat.creator_id != *acting_user_id {
            return Err(Error::forbidden("You are not allowed to add members to this chat"));
        }

        self.require_user(target_user_id).await?;

        let change = self.data_access
            .add_chat_member(chat_id, target_user_id, MAX_CHAT_MEMBERS).await
            .with_context(|| format!("Couldn't add {target_user_id} to chat {chat_id}"))?;

        match change {
            MembershipChange::Added => {
                debug!(chat_id = %chat_id, user_id = %target_user_id, "member added");
                Ok(())
            },
            MembershipChange::AlreadyMember => Err(Error::AlreadyMember),
            MembershipChange::ChatFull => Err(Error::CapacityExceeded(MAX_CHAT_MEMBERS)),
            MembershipChange::ChatNotFound => Err(chat_not_found()),
        }
    }

    pub async fn remove_member(&self, acting_user_id: &UserId, target_user_id: &UserId, chat_id: &ChatId) -> Result<()> {
        let chat = self.fetch_chat(chat_id).await?;

        if acting_user_id != target_user_id {
            return Err(Error::forbidden("You are not allowed to delete someone else from a chat"));
        }
        if chat.creator_id == *acting_user_id {
            return Err(Error::forbidden("You started this chat, delete the chat instead of leaving it"));
        }

        let removed = self.data_access
            .remove_chat_member(chat_id, target_user_id).await
            .with_context(|| format!("Couldn't remove {target_user_id} from chat {chat_id}"))?;

        if !removed {
            return Err(Error::not_found("You are not in this chat"));
        }

        debug!(chat_id = %chat_id, user_id = %target_user_id, "member left");
        Ok(())
    }

    pub async fn delete_chat(&self, acting_user_id: &UserId, chat_id: &ChatId) -> Result<()> {
        let chat = self.fetch_chat(chat_id).await?;
        if chat.creator_id != *acting_user_id {
            return Err(Error::forbidden("You do not have permission to delete this chat"));
        }

        let deleted = self.data_access
            .delete_chat(chat_id).await
            .with_context(|| format!("Couldn't delete chat {chat_id}"))?;

        if !deleted {
            return Err(chat_not_found());
        }

        debug!(chat_id = %chat_id, "chat deleted");
        Ok(())
    }

    pub async fn list_members(&self, chat_id: &ChatId) -> Result<Vec<UserSummary>> {
        self.fetch_chat(chat_id).await?;
        let members = self.data_access
            .fetch_chat_members(chat_id).await
            .with_context(|| format!("Couldn't fetch members of chat {chat_id}"))?;
        Ok(members)
    }

    pub async fn require_member(&self, user_id: &UserId, chat_id: &ChatId) -> Result<Vec<UserSummary>> {
        let members = self.list_members(chat_id).await?;
        if !members.iter().any(|member| member.id == *user_id) {
            return Err(Error::forbidden("You are not in this chat"));
        }
        Ok(members)
    }

    pub async fn fetch_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        let chat = self.data_access
            .fetch_chat(chat_id).await
            .with_context(|| format!("Couldn't fetch chat {chat_id}"))?;
        chat.ok_or_else(chat_not_found)
    }

    pub async fn list_chats(&self, user_id: &UserId) -> Result<Vec<Chat>> {
        let chats = self.data_access
            .fetch_users_chats(user_id).await
            .with_context(|| format!("Couldn't fetch chats of {user_id}"))?;
        Ok(chats)
    }

    async fn require_user(&self, user_id: &UserId) -> Result<()> {
        let user = self.data_access
            .fetch_user(user_id).await
            .with_context(|| format!("Couldn't fetch user {user_id}"))?;
        match user {
            Some(_) => Ok(()),
            None => Err(Error::not_found("This user does not exist anymore")),
        }
    }
}

fn chat_name(name: &str) -> Result<String> {
    validation::required_text(
        name,
        MAX_CHAT_NAME_LEN,
        "Please give your chat a name",
        "A chat name can have at most 50 characters",
    )
}

fn chat_not_found() -> Error {
    Error::not_found("This chat does not exist")
}
