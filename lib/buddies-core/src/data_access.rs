use buddies_utils::async_result;

use crate::{
    Chat, ChatId, Credentials, Interest, InterestId, MembershipChange, Message, NewMessage, NewUser,
    ProfileUpdate, User, UserId, UserSummary,
};

/// Every method is one storage round trip. Methods that touch several tables must apply all of
/// their changes or none of them.
pub trait DataAccess: 'static + Send + Sync + Clone {
    type Error: 'static + std::error::Error + Send + Sync;

    /// Inserts the user together with their interests. Returns `None` when the email is taken.
    fn create_user(&self, user: &NewUser, interests: &[InterestId]) -> async_result!(Option<UserId>);
    fn fetch_user(&self, user_id: &UserId) -> async_result!(Option<User>);
    fn fetch_user_ids(&self) -> async_result!(Vec<UserId>);
    fn fetch_credentials(&self, email: &str) -> async_result!(Option<Credentials>);
    /// Returns `false` when the user does not exist.
    fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate, interests: &[InterestId]) -> async_result!(bool);
    /// Removes the user's sessions, interests and memberships, then the user. Chats and messages
    /// stay, their creator and author ids may dangle afterwards. Returns the name the user had.
    fn delete_user(&self, user_id: &UserId) -> async_result!(Option<String>);

    fn fetch_interests(&self) -> async_result!(Vec<Interest>);
    fn fetch_user_interests(&self, user_id: &UserId) -> async_result!(Vec<Interest>);
    fn fetch_all_user_interests(&self) -> async_result!(Vec<(UserId, Vec<Interest>)>) {
        async move {
            let mut res = vec![];
            for user_id in self.fetch_user_ids().await? {
                let interests = self.fetch_user_interests(&user_id).await?;
                res.push((user_id, interests));
            }
            Ok(res)
        }
    }

    fn create_chat(&self, name: &str, creator_id: &UserId, members: &[UserId]) -> async_result!(Chat);
    fn fetch_chat(&self, chat_id: &ChatId) -> async_result!(Option<Chat>);
    fn fetch_users_chats(&self, user_id: &UserId) -> async_result!(Vec<Chat>);
    fn fetch_chat_members(&self, chat_id: &ChatId) -> async_result!(Vec<UserSummary>);
    /// Counting the members and inserting the new one must not interleave with another add.
    fn add_chat_member(&self, chat_id: &ChatId, user_id: &UserId, capacity: usize) -> async_result!(MembershipChange);
    fn remove_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> async_result!(bool);
    fn delete_chat(&self, chat_id: &ChatId) -> async_result!(bool);

    fn create_message(&self, message: &NewMessage) -> async_result!(Message);
    fn fetch_chat_messages(&self, chat_id: &ChatId) -> async_result!(Vec<Message>);
}
