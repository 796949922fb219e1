use anyhow::Context;
use tokio::sync::mpsc;

use buddies_utils::log_internal_error;

use crate::authorization::AuthService;
use crate::chats::ChatAuthority;
use crate::data_access::DataAccess;
use crate::feed::ChatFeed;
use crate::gate::{Identity, SessionGate};
use crate::interests::InterestGraph;
use crate::matcher::{MatchStrategy, Matcher, PerUserOverlap};
use crate::messages::MessageStore;
use crate::{Chat, ChatDetails, ChatId, Error, Interest, Message, Result, UserId, UserProfile, UserSummary};

#[derive(Clone)]
pub struct Buddies<D, A, S = PerUserOverlap> {
    pub(crate) data_access: D,
    pub(crate) auth: A,
    gate: SessionGate<A>,
    pub(crate) interests: InterestGraph<D>,
    matcher: Matcher<D, S>,
    chats: ChatAuthority<D>,
    messages: MessageStore<D>,
    feed: ChatFeed,
}

impl<D: DataAccess, A: AuthService> Buddies<D, A> {
    pub fn new(data_access: D, auth: A) -> Self {
        Self::with_match_strategy(data_access, auth, PerUserOverlap)
    }
}

impl<D: DataAccess, A: AuthService, S: MatchStrategy> Buddies<D, A, S> {
    /// Must be called from within a tokio runtime.
    pub fn with_match_strategy(data_access: D, auth: A, strategy: S) -> Self {
        let feed = ChatFeed::new();
        let chats = ChatAuthority::new(data_access.clone());
        let messages = MessageStore::new(data_access.clone(), chats.clone(), feed.clone());
        Buddies {
            gate: SessionGate::new(auth.clone()),
            interests: InterestGraph::new(data_access.clone()),
            matcher: Matcher::new(data_access.clone(), strategy),
            chats,
            messages,
            feed,
            data_access,
            auth,
        }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity> {
        self.gate.authenticate(token).await
    }

    pub fn issue_csrf_token(&self) -> String {
        self.auth.issue_csrf_token()
    }

    pub async fn interest_catalog(&self) -> Result<Vec<Interest>> {
        self.interests.catalog().await
    }

    pub async fn matches(&self, identity: &Identity) -> Result<Vec<UserId>> {
        self.matcher.compute_matches(&identity.user_id()).await
    }

    pub async fn match_profiles(&self, identity: &Identity) -> Result<Vec<UserProfile>> {
        let mut res = vec![];
        for user_id in self.matches(identity).await? {
            match self.find_profile(&user_id).await? {
                Some(profile) => res.push(profile),
                None => continue,
            }
        }
        Ok(res)
    }

    pub async fn create_chat(&self, identity: &Identity, name: &str) -> Result<Chat> {
        self.chats.create_chat(&identity.user_id(), name).await
    }

    pub async fn start_chat(&self, identity: &Identity, name: &str, invitees: &[UserId]) -> Result<Chat> {
        self.chats.start_chat(&identity.user_id(), name, invitees).await
    }

    pub async fn chats(&self, identity: &Identity) -> Result<Vec<Chat>> {
        self.chats.list_chats(&identity.user_id()).await
    }

    pub async fn chat(&self, identity: &Identity, chat_id: &ChatId) -> Result<ChatDetails> {
        let members = self.chats.require_member(&identity.user_id(), chat_id).await?;
        let chat = self.chats.fetch_chat(chat_id).await?;
        Ok(ChatDetails { chat, members })
    }

    pub async fn add_member(&self, identity: &Identity, user_id: &UserId, chat_id: &ChatId) -> Result<()> {
        self.chats.add_member(&identity.user_id(), user_id, chat_id).await
    }

    pub async fn remove_member(&self, identity: &Identity, user_id: &UserId, chat_id: &ChatId) -> Result<()> {
        self.chats.remove_member(&identity.user_id(), user_id, chat_id).await
    }

    pub async fn delete_chat(&self, identity: &Identity, chat_id: &ChatId) -> Result<()> {
        self.chats.delete_chat(&identity.user_id(), chat_id).await?;
        if let Err(e) = self.feed.close(chat_id) {
            log_internal_error(e);
        }
        Ok(())
    }

    pub async fn members(&self, identity: &Identity, chat_id: &ChatId) -> Result<Vec<UserSummary>> {
        self.chats.require_member(&identity.user_id(), chat_id).await
    }

    pub async fn post_message(&self, identity: &Identity, chat_id: &ChatId, content: &str) -> Result<Message> {
        let author = self.data_access
            .fetch_user(&identity.user_id()).await
            .with_context(|| format!("Couldn't fetch author {}", identity.user_id()))?
            .ok_or(Error::AuthRequired)?;

        self.messages.post_message(&identity.user_id(), chat_id, content, &author.name).await
    }

    pub async fn message_history(&self, identity: &Identity, chat_id: &ChatId) -> Result<Vec<Message>> {
        self.messages.history_for(&identity.user_id(), chat_id).await
    }

    pub async fn subscribe(&self, identity: &Identity, chat_id: &ChatId) -> Result<mpsc::UnboundedReceiver<Message>> {
        self.messages.subscribe(&identity.user_id(), chat_id).await
    }

    pub fn chat_authority(&self) -> &ChatAuthority<D> {
        &self.chats
    }

    pub fn message_store(&self) -> &MessageStore<D> {
        &self.messages
    }
}
