use serde::Deserialize;

use buddies_core::{ChatId, InterestId, UserId};

/// Body of `POST /api`: `{"op": "<name>", ...arguments}`.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    Register {
        csrf_token: String,
        name: String,
        avatar: String,
        bio: String,
        email: String,
        password: String,
        #[serde(default)]
        interests: Vec<InterestId>,
    },
    Login {
        csrf_token: String,
        email: String,
        password: String,
    },
    Logout,
    Me,
    User {
        user_id: UserId,
    },
    UpdateProfile {
        name: String,
        avatar: String,
        bio: String,
        #[serde(default)]
        interests: Vec<InterestId>,
    },
    DeleteAccount,
    Interests,
    Matches,
    /// Without `memberIds` the creator is alone in the new chat.
    CreateChat {
        name: String,
        member_ids: Option<Vec<UserId>>,
    },
    Chats,
    Chat {
        chat_id: ChatId,
    },
    AddMember {
        chat_id: ChatId,
        user_id: UserId,
    },
    RemoveMember {
        chat_id: ChatId,
        user_id: UserId,
    },
    DeleteChat {
        chat_id: ChatId,
    },
    Members {
        chat_id: ChatId,
    },
    PostMessage {
        chat_id: ChatId,
        content: String,
    },
    MessageHistory {
        chat_id: ChatId,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Register { .. } => "register",
            Operation::Login { .. } => "login",
            Operation::Logout => "logout",
            Operation::Me => "me",
            Operation::User { .. } => "user",
            Operation::UpdateProfile { .. } => "updateProfile",
            Operation::DeleteAccount => "deleteAccount",
            Operation::Interests => "interests",
            Operation::Matches => "matches",
            Operation::CreateChat { .. } => "createChat",
            Operation::Chats => "chats",
            Operation::Chat { .. } => "chat",
            Operation::AddMember { .. } => "addMember",
            Operation::RemoveMember { .. } => "removeMember",
            Operation::DeleteChat { .. } => "deleteChat",
            Operation::Members { .. } => "members",
            Operation::PostMessage { .. } => "postMessage",
            Operation::MessageHistory { .. } => "messageHistory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_operations() {
        let op: Operation = serde_json::from_str(r#"{"op": "addMember", "chatId": "0b6c6ec4-b1a6-4d2c-a1e6-6a7dfc9c1d55", "userId": "4ec09097-45d5-43a0-bdea-614948bce47e"}"#).unwrap();
        assert!(matches!(op, Operation::AddMember { .. }));
        assert_eq!(op.name(), "addMember");

        let op: Operation = serde_json::from_str(r#"{"op": "me"}"#).unwrap();
        assert!(matches!(op, Operation::Me));

        let op: Operation = serde_json::from_str(r#"{"op": "createChat", "name": "Hiking"}"#).unwrap();
        assert!(matches!(op, Operation::CreateChat { member_ids: None, .. }));
    }

    #[test]
    fn rejects_unknown_operations() {
        assert!(serde_json::from_str::<Operation>(r#"{"op": "dropTables"}"#).is_err());
        assert!(serde_json::from_str::<Operation>(r#"{"op": "chat", "chatId": "not a uuid"}"#).is_err());
    }
}
