use std::collections::HashSet;

use chrono::{Duration, Utc};
use uuid::uuid;

use buddies_auth::{AuthStorage, Session};
use buddies_core::data_access::DataAccess;
use buddies_core::{ChatId, MembershipChange, NewMessage, NewUser, ProfileUpdate, UserId};

#[macro_export]
macro_rules! data_access_tests {
    ($tester:ident) => {
        $tester!{it_creates_user}
        $tester!{rejects_duplicate_email}
        $tester!{doesnt_fetch_nonexistent_users}
        $tester!{replaces_profile_and_interests}
        $tester!{creates_chat_with_members}
        $tester!{respects_chat_capacity}
        $tester!{removes_members}
        $tester!{deletes_chat_with_messages}
        $tester!{orders_messages}
        $tester!{deletes_user_but_keeps_chats}
        $tester!{stores_sessions}
        $tester!{deletes_expired_sessions}
    };
}

fn new_user(tag: &str) -> NewUser {
    NewUser {
        name: format!("User {tag}"),
        avatar: "/duck.jpg".into(),
        bio: format!("Bio of {tag}"),
        // unique per call, so the tests can share one database
        email: format!("{}@t.st", &uuid::Uuid::new_v4().simple().to_string()[..20]),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo".into(),
    }
}

async fn create_user(db: &impl DataAccess, tag: &str, interests: &[i32]) -> UserId {
    db.create_user(&new_user(tag), interests).await.unwrap().unwrap()
}

async fn post(db: &impl DataAccess, chat_id: &ChatId, author_id: &UserId, content: &str) {
    db.create_message(&NewMessage {
        chat_id: *chat_id,
        author_id: *author_id,
        author_name: "Author".into(),
        content: content.into(),
    }).await.unwrap();
}

pub async fn it_creates_user<D: DataAccess + AuthStorage>(db: &D) {
    let user = new_user("Katharina");
    let user_id = db.create_user(&user, &[1, 2, 6]).await.unwrap().unwrap();

    let fetched = db.fetch_user(&user_id).await.unwrap().unwrap();
    assert_eq!(fetched.name, user.name);
    assert_eq!(fetched.email, user.email);

    let credentials = db.fetch_credentials(&user.email).await.unwrap().unwrap();
    assert_eq!(credentials.user_id, user_id);
    assert_eq!(credentials.password_hash, user.password_hash);

    let interests: Vec<i32> = db.fetch_user_interests(&user_id).await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(interests, vec![1, 2, 6]);
    assert!(db.fetch_user_ids().await.unwrap().contains(&user_id));
}

pub async fn rejects_duplicate_email<D: DataAccess + AuthStorage>(db: &D) {
    let user = new_user("Lena");
    assert!(db.create_user(&user, &[]).await.unwrap().is_some());
    assert!(db.create_user(&user, &[1]).await.unwrap().is_none());
}

pub async fn doesnt_fetch_nonexistent_users<D: DataAccess + AuthStorage>(db: &D) {
    let missing = uuid!("4ec09097-45d5-43a0-bdea-614948bce47e");
    assert!(db.fetch_user(&missing).await.unwrap().is_none());
    assert!(db.fetch_credentials("nobody@nowhere").await.unwrap().is_none());
    assert!(!db.update_profile(&missing, &ProfileUpdate { name: "x".into(), avatar: "/duck.jpg".into(), bio: "x".into() }, &[]).await.unwrap());
    assert!(db.delete_user(&missing).await.unwrap().is_none());
}

pub async fn replaces_profile_and_interests<D: DataAccess + AuthStorage>(db: &D) {
    let user_id = create_user(db, "Profile", &[1, 2, 3]).await;

    let update = ProfileUpdate { name: "Renamed".into(), avatar: "/kitten.jpg".into(), bio: "New bio".into() };
    assert!(db.update_profile(&user_id, &update, &[3, 4]).await.unwrap());
    assert!(db.update_profile(&user_id, &update, &[3, 4]).await.unwrap());

    let user = db.fetch_user(&user_id).await.unwrap().unwrap();
    assert_eq!((user.name.as_str(), user.avatar.as_str(), user.bio.as_str()), ("Renamed", "/kitten.jpg", "New bio"));

    let interests: Vec<i32> = db.fetch_user_interests(&user_id).await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(interests, vec![3, 4]);
}

pub async fn creates_chat_with_members<D: DataAccess + AuthStorage>(db: &D) {
    let creator = create_user(db, "Creator", &[]).await;
    let buddy = create_user(db, "Buddy", &[]).await;

    let chat = db.create_chat("Climbing on Sunday", &creator, &[buddy]).await.unwrap();
    assert_eq!(chat.creator_id, creator);
    assert_eq!(db.fetch_chat(&chat.id).await.unwrap().unwrap(), chat);

    let members: Vec<UserId> = db.fetch_chat_members(&chat.id).await.unwrap().into_iter().map(|m| m.id).collect();
    let mut expected = vec![creator, buddy];
    expected.sort();
    assert_eq!(members, expected);

    assert!(db.fetch_users_chats(&buddy).await.unwrap().contains(&chat));
}

pub async fn respects_chat_capacity<D: DataAccess + AuthStorage>(db: &D) {
    let creator = create_user(db, "Creator", &[]).await;
    let chat = db.create_chat("Full house", &creator, &[]).await.unwrap();

    let mut added = vec![];
    for i in 0..4 {
        let user = create_user(db, &format!("Member {i}"), &[]).await;
        assert_eq!(db.add_chat_member(&chat.id, &user, 5).await.unwrap(), MembershipChange::Added);
        added.push(user);
    }

    assert_eq!(db.add_chat_member(&chat.id, &added[0], 5).await.unwrap(), MembershipChange::AlreadyMember);

    let late = create_user(db, "Late", &[]).await;
    assert_eq!(db.add_chat_member(&chat.id, &late, 5).await.unwrap(), MembershipChange::ChatFull);
    assert_eq!(db.fetch_chat_members(&chat.id).await.unwrap().len(), 5);

    let missing_chat = uuid!("0b6c6ec4-b1a6-4d2c-a1e6-6a7dfc9c1d55");
    assert_eq!(db.add_chat_member(&missing_chat, &late, 5).await.unwrap(), MembershipChange::ChatNotFound);
}

pub async fn removes_members<D: DataAccess + AuthStorage>(db: &D) {
    let creator = create_user(db, "Creator", &[]).await;
    let buddy = create_user(db, "Buddy", &[]).await;
    let chat = db.create_chat("Pub quiz", &creator, &[buddy]).await.unwrap();

    assert!(db.remove_chat_member(&chat.id, &buddy).await.unwrap());
    assert!(!db.remove_chat_member(&chat.id, &buddy).await.unwrap());
    assert!(db.fetch_users_chats(&buddy).await.unwrap().is_empty());
}

pub async fn deletes_chat_with_messages<D: DataAccess + AuthStorage>(db: &D) {
    let creator = create_user(db, "Creator", &[]).await;
    let buddy = create_user(db, "Buddy", &[]).await;
    let chat = db.create_chat("Short lived", &creator, &[buddy]).await.unwrap();
    post(db, &chat.id, &buddy, "Hi").await;

    assert!(db.delete_chat(&chat.id).await.unwrap());
    assert!(!db.delete_chat(&chat.id).await.unwrap());

    assert!(db.fetch_chat(&chat.id).await.unwrap().is_none());
    assert!(db.fetch_chat_members(&chat.id).await.unwrap().is_empty());
    assert!(db.fetch_chat_messages(&chat.id).await.unwrap().is_empty());
}

pub async fn orders_messages<D: DataAccess + AuthStorage>(db: &D) {
    let creator = create_user(db, "Creator", &[]).await;
    let chat = db.create_chat("Ordered", &creator, &[]).await.unwrap();
    let other_chat = db.create_chat("Other", &creator, &[]).await.unwrap();

    for i in 1..=5 {
        post(db, &chat.id, &creator, &format!("Message {i}")).await;
        post(db, &other_chat.id, &creator, "Elsewhere").await;
    }

    let messages = db.fetch_chat_messages(&chat.id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Message 1", "Message 2", "Message 3", "Message 4", "Message 5"]);

    assert!(messages.windows(2).all(|pair| (pair[0].timestamp, pair[0].id) < (pair[1].timestamp, pair[1].id)));
    let ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 5);
}

pub async fn deletes_user_but_keeps_chats<D: DataAccess + AuthStorage>(db: &D) {
    let leaving = create_user(db, "Leaving", &[1, 2]).await;
    let staying = create_user(db, "Staying", &[1, 2]).await;

    let own_chat = db.create_chat("Own", &leaving, &[staying]).await.unwrap();
    let foreign_chat = db.create_chat("Foreign", &staying, &[leaving]).await.unwrap();
    post(db, &foreign_chat.id, &leaving, "Bye").await;
    post(db, &own_chat.id, &leaving, "Welcome").await;
    post(db, &own_chat.id, &staying, "Thanks").await;

    let now = Utc::now();
    db.create_session(&Session {
        token: format!("delete-user-{leaving}"),
        user_id: leaving,
        created_at: now,
        expires_at: now + Duration::minutes(10),
    }).await.unwrap();

    let name = db.delete_user(&leaving).await.unwrap().unwrap();
    assert_eq!(name, "User Leaving");

    assert!(db.fetch_user(&leaving).await.unwrap().is_none());
    assert!(db.fetch_user_interests(&leaving).await.unwrap().is_empty());
    assert!(db.fetch_session(&format!("delete-user-{leaving}")).await.unwrap().is_none());
    assert_eq!(db.fetch_chat(&own_chat.id).await.unwrap(), Some(own_chat.clone()));
    let own_chat_members: Vec<UserId> = db.fetch_chat_members(&own_chat.id).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(own_chat_members, vec![staying]);
    assert_eq!(db.fetch_chat_messages(&own_chat.id).await.unwrap().len(), 2);

    let members: Vec<UserId> = db.fetch_chat_members(&foreign_chat.id).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(members, vec![staying]);

    let messages = db.fetch_chat_messages(&foreign_chat.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].author_id, leaving);
}

pub async fn stores_sessions<D: DataAccess + AuthStorage>(db: &D) {
    let user_id = create_user(db, "Session", &[]).await;
    let now = Utc::now();
    let session = Session {
        token: format!("stores-sessions-{user_id}"),
        user_id,
        created_at: now,
        expires_at: now + Duration::minutes(10),
    };

    db.create_session(&session).await.unwrap();
    let fetched = db.fetch_session(&session.token).await.unwrap().unwrap();
    assert_eq!(fetched.user_id, user_id);

    assert!(db.delete_session(&session.token).await.unwrap());
    assert!(!db.delete_session(&session.token).await.unwrap());
    assert!(db.fetch_session(&session.token).await.unwrap().is_none());
}

pub async fn deletes_expired_sessions<D: DataAccess + AuthStorage>(db: &D) {
    let user_id = create_user(db, "Expiring", &[]).await;
    let now = Utc::now();

    let expired = Session {
        token: format!("expired-{user_id}"),
        user_id,
        created_at: now - Duration::minutes(20),
        expires_at: now - Duration::minutes(10),
    };
    let valid = Session {
        token: format!("valid-{user_id}"),
        user_id,
        created_at: now,
        expires_at: now + Duration::minutes(10),
    };
    db.create_session(&expired).await.unwrap();
    db.create_session(&valid).await.unwrap();

    assert!(db.delete_expired_sessions(now).await.unwrap() >= 1);
    assert!(db.fetch_session(&expired.token).await.unwrap().is_none());
    assert!(db.fetch_session(&valid.token).await.unwrap().is_some());
}
