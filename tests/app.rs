use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use buddies_auth::{spawn_session_sweeper, AuthConfig, AuthServiceImpl, AuthStorage, Session};
use buddies_core::accounts::{ProfileForm, Registration};
use buddies_core::data_access::DataAccess;
use buddies_core::matcher::{BulkOverlap, MatchStrategy, PerUserOverlap};
use buddies_core::validation::Avatar;
use buddies_core::{Buddies, Error, Identity, InterestId, UserId, UserProfile};

type App<S = PerUserOverlap> = Buddies<mock_db::Db, AuthServiceImpl<mock_db::Db>, S>;

fn test_app() -> (App, mock_db::Db) {
    test_app_with(PerUserOverlap)
}

fn test_app_with<S: MatchStrategy>(strategy: S) -> (App<S>, mock_db::Db) {
    let db = mock_db::Db::new();
    let auth = AuthServiceImpl::new(db.clone(), AuthConfig::default());
    (Buddies::with_match_strategy(db.clone(), auth, strategy), db)
}

async fn interest_ids<S: MatchStrategy>(app: &App<S>, titles: &[&str]) -> Vec<InterestId> {
    let catalog = app.interest_catalog().await.unwrap();
    titles.iter()
        .map(|title| catalog.iter().find(|interest| interest.title == *title).unwrap().id)
        .collect()
}

fn registration(name: &str, interests: Vec<InterestId>) -> Registration {
    Registration {
        name: name.into(),
        avatar: "/duck.jpg".into(),
        bio: format!("Hi, I am {name}"),
        email: format!("{}@buddies.test", name.to_lowercase()),
        password: format!("{name}-password"),
        interests,
    }
}

async fn register<S: MatchStrategy>(app: &App<S>, name: &str, interests: &[&str]) -> Identity {
    let interests = interest_ids(app, interests).await;
    let csrf_token = app.issue_csrf_token();
    let (_, session) = app.register(&csrf_token, registration(name, interests)).await.unwrap();
    app.authenticate(Some(&session.token)).await.unwrap()
}

fn names(profiles: Vec<UserProfile>) -> Vec<String> {
    profiles.into_iter().map(|profile| profile.name).collect()
}

fn ids(identities: &[&Identity]) -> Vec<UserId> {
    let mut res: Vec<UserId> = identities.iter().map(|identity| identity.user_id()).collect();
    res.sort();
    res
}

#[tokio::test]
async fn end_to_end_katharina_and_lena() {
    let (app, _) = test_app();

    let katharina = register(&app, "Katharina", &["Hiking", "Gym", "Cinema", "Climbing"]).await;
    let lena = register(&app, "Lena", &["Hiking", "Gym", "Theater"]).await;
    let outsider = register(&app, "Tom", &["Dancing"]).await;

    let matches = app.matches(&lena).await.unwrap();
    assert!(matches.contains(&katharina.user_id()));
    assert!(!matches.contains(&outsider.user_id()));

    let chat = app.create_chat(&lena, "test chat").await.unwrap();
    app.add_member(&lena, &katharina.user_id(), &chat.id).await.unwrap();

    let message = app.post_message(&katharina, &chat.id, "Hello Lena!").await.unwrap();
    assert_eq!(message.author_name, "Katharina");

    let history = app.message_history(&lena, &chat.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "Hello Lena!");
    assert_eq!(history[0].author_id, katharina.user_id());

    assert!(matches!(app.message_history(&outsider, &chat.id).await, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn matches_are_symmetric() {
    let (app, _) = test_app();

    let users = [
        register(&app, "Anna", &["Hiking", "Gym", "Cinema"]).await,
        register(&app, "Ben", &["Hiking", "Gym", "Theater"]).await,
        register(&app, "Clara", &["Cinema", "Theater", "Museums"]).await,
        register(&app, "David", &["Hiking"]).await,
        register(&app, "Emma", &[]).await,
    ];

    for a in &users {
        let matches_of_a = app.matches(a).await.unwrap();
        assert!(!matches_of_a.contains(&a.user_id()));
        assert!(matches_of_a.windows(2).all(|pair| pair[0] < pair[1]));

        for b in &users {
            let matches_of_b = app.matches(b).await.unwrap();
            assert_eq!(matches_of_a.contains(&b.user_id()), matches_of_b.contains(&a.user_id()));
        }
    }
}

#[tokio::test]
async fn matching_needs_two_shared_interests() {
    let (app, _) = test_app();

    let katharina = register(&app, "Katharina", &["Hiking", "Gym", "Cinema"]).await;
    let lena = register(&app, "Lena", &["Hiking", "Gym", "Theater"]).await;
    let tom = register(&app, "Tom", &["Hiking"]).await;
    let ana = register(&app, "Ana", &["Running", "Dancing"]).await;

    assert_eq!(app.matches(&katharina).await.unwrap(), vec![lena.user_id()]);
    assert_eq!(app.matches(&lena).await.unwrap(), vec![katharina.user_id()]);
    assert!(app.matches(&tom).await.unwrap().is_empty());
    assert!(app.matches(&ana).await.unwrap().is_empty());

    let profiles = app.match_profiles(&katharina).await.unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].name, "Lena");
}

#[tokio::test]
async fn match_strategies_agree() {
    let (per_user, _) = test_app();
    let (bulk, _) = test_app_with(BulkOverlap);

    let profiles: [(&str, &[&str]); 5] = [
        ("Anna", &["Hiking", "Gym", "Cinema"]),
        ("Ben", &["Hiking", "Gym", "Theater"]),
        ("Clara", &["Cinema", "Theater", "Gym"]),
        ("David", &["Hiking"]),
        ("Emma", &["Museums", "Running"]),
    ];

    for (name, interests) in profiles {
        let a = register(&per_user, name, interests).await;
        let b = register(&bulk, name, interests).await;
        let mut per_user_names = names(per_user.match_profiles(&a).await.unwrap());
        let mut bulk_names = names(bulk.match_profiles(&b).await.unwrap());
        per_user_names.sort();
        bulk_names.sort();
        assert_eq!(per_user_names, bulk_names);
    }
}

#[tokio::test]
async fn chats_hold_at_most_five_members() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let chat = app.create_chat(&creator, "Climbing crew").await.unwrap();

    let mut members = vec![];
    for name in ["Anna", "Ben", "Clara", "David"] {
        let member = register(&app, name, &[]).await;
        app.add_member(&creator, &member.user_id(), &chat.id).await.unwrap();
        members.push(member);
    }

    let sixth = register(&app, "Emma", &[]).await;
    assert!(matches!(app.add_member(&creator, &sixth.user_id(), &chat.id).await, Err(Error::CapacityExceeded(5))));
    assert_eq!(app.members(&creator, &chat.id).await.unwrap().len(), 5);

    let member_ids: Vec<UserId> = app.members(&creator, &chat.id).await.unwrap().into_iter().map(|m| m.id).collect();
    let mut expected: Vec<&Identity> = members.iter().collect();
    expected.push(&creator);
    assert_eq!(member_ids, ids(&expected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_respect_the_cap() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let chat_id = app.create_chat(&creator, "Popular").await.unwrap().id;

    let mut candidates = vec![];
    for i in 0..10 {
        candidates.push(register(&app, &format!("Candidate{i}"), &[]).await);
    }

    let mut handles = vec![];
    for candidate in candidates {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.add_member(&creator, &candidate.user_id(), &chat_id).await
        }));
    }

    let mut added = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => added += 1,
            Err(Error::CapacityExceeded(_)) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(added, 4);
    assert_eq!(rejected, 6);
    assert_eq!(app.members(&creator, &chat_id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn only_the_creator_adds_members() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let member = register(&app, "Member", &[]).await;
    let outsider = register(&app, "Outsider", &[]).await;

    let chat = app.start_chat(&creator, "Museums", &[member.user_id()]).await.unwrap();

    assert!(matches!(app.add_member(&member, &outsider.user_id(), &chat.id).await, Err(Error::Forbidden(_))));
    assert!(matches!(app.add_member(&creator, &member.user_id(), &chat.id).await, Err(Error::AlreadyMember)));
    assert!(matches!(app.add_member(&creator, &uuid::Uuid::new_v4(), &chat.id).await, Err(Error::NotFound(_))));
    assert!(matches!(app.add_member(&creator, &outsider.user_id(), &uuid::Uuid::new_v4()).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn starting_a_chat_needs_one_to_four_buddies() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let mut buddies = vec![];
    for name in ["Anna", "Ben", "Clara", "David", "Emma"] {
        buddies.push(register(&app, name, &[]).await.user_id());
    }

    assert!(matches!(app.start_chat(&creator, "Nobody", &[]).await, Err(Error::Validation(_))));
    assert!(matches!(app.start_chat(&creator, "Only me", &[creator.user_id()]).await, Err(Error::Validation(_))));
    assert!(matches!(app.start_chat(&creator, "Too many", &buddies).await, Err(Error::Validation(_))));
    assert!(matches!(app.start_chat(&creator, "", &buddies[..1]).await, Err(Error::Validation(_))));
    assert!(matches!(app.start_chat(&creator, "Ghost", &[uuid::Uuid::new_v4()]).await, Err(Error::NotFound(_))));

    let chat = app.start_chat(&creator, "Just right", &buddies[..4]).await.unwrap();
    assert_eq!(app.members(&creator, &chat.id).await.unwrap().len(), 5);
    assert_eq!(chat.creator_id, creator.user_id());
}

#[tokio::test]
async fn members_only_remove_themselves() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let anna = register(&app, "Anna", &[]).await;
    let ben = register(&app, "Ben", &[]).await;
    let chat = app.start_chat(&creator, "Pub quiz", &[anna.user_id(), ben.user_id()]).await.unwrap();

    assert!(matches!(app.remove_member(&anna, &ben.user_id(), &chat.id).await, Err(Error::Forbidden(_))));
    assert!(matches!(app.remove_member(&creator, &anna.user_id(), &chat.id).await, Err(Error::Forbidden(_))));
    assert!(matches!(app.remove_member(&creator, &creator.user_id(), &chat.id).await, Err(Error::Forbidden(_))));

    app.remove_member(&anna, &anna.user_id(), &chat.id).await.unwrap();
    assert!(matches!(app.remove_member(&anna, &anna.user_id(), &chat.id).await, Err(Error::NotFound(_))));
    assert!(matches!(app.members(&anna, &chat.id).await, Err(Error::Forbidden(_))));
    assert!(app.chats(&anna).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_the_creator_deletes_a_chat() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let member = register(&app, "Member", &[]).await;
    let chat = app.start_chat(&creator, "Doomed", &[member.user_id()]).await.unwrap();
    app.post_message(&member, &chat.id, "Hi there").await.unwrap();

    assert!(matches!(app.delete_chat(&member, &chat.id).await, Err(Error::Forbidden(_))));
    assert_eq!(app.message_history(&member, &chat.id).await.unwrap().len(), 1);

    app.delete_chat(&creator, &chat.id).await.unwrap();

    assert!(matches!(app.chat(&creator, &chat.id).await, Err(Error::NotFound(_))));
    assert!(matches!(app.message_history(&member, &chat.id).await, Err(Error::NotFound(_))));
    assert!(matches!(app.message_store().history(&chat.id).await, Err(Error::NotFound(_))));
    assert!(matches!(app.chat_authority().list_members(&chat.id).await, Err(Error::NotFound(_))));
    assert!(app.chats(&member).await.unwrap().is_empty());
    assert!(matches!(app.delete_chat(&creator, &chat.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn only_members_post_messages() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let newcomer = register(&app, "Newcomer", &[]).await;
    let chat = app.create_chat(&creator, "Running club").await.unwrap();

    assert!(matches!(app.post_message(&newcomer, &chat.id, "Can I join?").await, Err(Error::Forbidden(_))));
    assert!(matches!(app.message_history(&newcomer, &chat.id).await, Err(Error::Forbidden(_))));

    app.add_member(&creator, &newcomer.user_id(), &chat.id).await.unwrap();
    app.post_message(&newcomer, &chat.id, "Thanks for adding me").await.unwrap();

    app.remove_member(&newcomer, &newcomer.user_id(), &chat.id).await.unwrap();
    assert!(matches!(app.post_message(&newcomer, &chat.id, "Still here?").await, Err(Error::Forbidden(_))));

    let history = app.message_history(&creator, &chat.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].author_name, "Newcomer");
}

#[tokio::test]
async fn rejects_empty_and_long_messages() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let chat = app.create_chat(&creator, "Lectures").await.unwrap();

    assert!(matches!(app.post_message(&creator, &chat.id, "").await, Err(Error::Validation(_))));
    assert!(matches!(app.post_message(&creator, &chat.id, "   ").await, Err(Error::Validation(_))));
    assert!(matches!(app.post_message(&creator, &chat.id, &"ä".repeat(601)).await, Err(Error::Validation(_))));

    let message = app.post_message(&creator, &chat.id, &"ä".repeat(600)).await.unwrap();
    assert_eq!(message.content.chars().count(), 600);
    assert_eq!(app.message_history(&creator, &chat.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_is_ordered_and_keeps_author_names() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let chat = app.create_chat(&creator, "Cinema").await.unwrap();

    for i in 1..=3 {
        app.post_message(&creator, &chat.id, &format!("Message {i}")).await.unwrap();
    }

    let form = ProfileForm { name: "Renamed".into(), avatar: "/duck.jpg".into(), bio: "New me".into(), interests: vec![] };
    app.update_profile(&creator, form).await.unwrap();
    app.post_message(&creator, &chat.id, "Message 4").await.unwrap();

    let history = app.message_history(&creator, &chat.id).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Message 1", "Message 2", "Message 3", "Message 4"]);
    assert_eq!(history[0].author_name, "Creator");
    assert_eq!(history[3].author_name, "Renamed");
}

#[tokio::test]
async fn subscribers_receive_new_messages() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let member = register(&app, "Member", &[]).await;
    let outsider = register(&app, "Outsider", &[]).await;
    let chat = app.start_chat(&creator, "Live", &[member.user_id()]).await.unwrap();

    assert!(matches!(app.subscribe(&outsider, &chat.id).await, Err(Error::Forbidden(_))));

    let mut subscription = app.subscribe(&member, &chat.id).await.unwrap();
    let posted = app.post_message(&creator, &chat.id, "Anyone there?").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), subscription.recv()).await.unwrap().unwrap();
    assert_eq!(received, posted);

    app.delete_chat(&creator, &chat.id).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(1), subscription.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn expired_sessions_are_rejected() {
    let (app, db) = test_app();
    let katharina = register(&app, "Katharina", &[]).await;

    let now = Utc::now();
    db.create_session(&Session {
        token: "expired-token".into(),
        user_id: katharina.user_id(),
        created_at: now - chrono::Duration::minutes(20),
        expires_at: now - chrono::Duration::minutes(10),
    }).await.unwrap();

    assert!(db.fetch_session("expired-token").await.unwrap().is_some());
    assert!(matches!(app.authenticate(Some("expired-token")).await, Err(Error::AuthRequired)));
    assert!(db.fetch_session("expired-token").await.unwrap().is_none());

    assert!(matches!(app.authenticate(None).await, Err(Error::AuthRequired)));
    assert!(matches!(app.authenticate(Some("")).await, Err(Error::AuthRequired)));
    assert!(matches!(app.authenticate(Some("made-up")).await, Err(Error::AuthRequired)));
}

#[tokio::test]
async fn sweeper_removes_expired_sessions() {
    let db = mock_db::Db::new();
    let auth = AuthServiceImpl::new(db.clone(), AuthConfig::default());
    let app = Buddies::new(db.clone(), auth.clone());
    let user = register(&app, "Sleepy", &[]).await;

    let now = Utc::now();
    db.create_session(&Session {
        token: "stale".into(),
        user_id: user.user_id(),
        created_at: now - chrono::Duration::minutes(20),
        expires_at: now - chrono::Duration::minutes(10),
    }).await.unwrap();

    let cancellation_token = CancellationToken::new();
    let sweeper = spawn_session_sweeper(auth, Duration::from_millis(10), cancellation_token.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(db.fetch_session("stale").await.unwrap().is_none());

    cancellation_token.cancel();
    sweeper.await.unwrap();
}

#[tokio::test]
async fn sessions_last_as_configured() {
    let db = mock_db::Db::new();
    let config = AuthConfig { session_lifetime: chrono::Duration::minutes(3), ..AuthConfig::default() };
    let app = Buddies::new(db.clone(), AuthServiceImpl::new(db.clone(), config));

    let csrf_token = app.issue_csrf_token();
    let (account, session) = app.register(&csrf_token, registration("Lena", vec![])).await.unwrap();

    assert_eq!(session.cookie.max_age, chrono::Duration::minutes(3));
    assert!(session.cookie.http_only);

    let stored = db.fetch_session(&session.token).await.unwrap().unwrap();
    assert_eq!(stored.user_id, account.profile.id);
    assert_eq!(stored.expires_at - stored.created_at, chrono::Duration::minutes(3));
}

#[tokio::test]
async fn registration_and_login() {
    let (app, _) = test_app();
    let interests = interest_ids(&app, &["Hiking", "Gym"]).await;

    let csrf_token = app.issue_csrf_token();
    let (account, _) = app.register(&csrf_token, registration("Katharina", interests.clone())).await.unwrap();
    assert_eq!(account.profile.name, "Katharina");
    assert_eq!(account.email, "katharina@buddies.test");
    assert_eq!(account.profile.interests.iter().map(|i| i.id).collect::<Vec<_>>(), interests);

    let duplicate = app.register(&app.issue_csrf_token(), registration("Katharina", vec![])).await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));

    let (user_id, session) = app.login(&app.issue_csrf_token(), "katharina@buddies.test", "Katharina-password".into()).await.unwrap();
    assert_eq!(user_id, account.profile.id);
    assert_eq!(app.authenticate(Some(&session.token)).await.unwrap().user_id(), user_id);

    let wrong_password = app.login(&app.issue_csrf_token(), "katharina@buddies.test", "guess".into()).await;
    let wrong_email = app.login(&app.issue_csrf_token(), "nobody@buddies.test", "guess".into()).await;
    match (wrong_password, wrong_email) {
        (Err(Error::Validation(a)), Err(Error::Validation(b))) => assert_eq!(a, b),
        other => panic!("unexpected login results: {other:?}"),
    }
}

#[tokio::test]
async fn register_and_login_check_csrf_first() {
    let (app, _) = test_app();

    let res = app.register("", registration("Lena", vec![])).await;
    assert!(matches!(res, Err(Error::Validation(message)) if message == "CSRF token not provided"));

    let res = app.register("forged.token", registration("Lena", vec![])).await;
    assert!(matches!(res, Err(Error::Validation(message)) if message == "Invalid CSRF token"));

    let res = app.login("forged.token", "lena@buddies.test", "Lena-password".into()).await;
    assert!(matches!(res, Err(Error::Validation(message)) if message == "Invalid CSRF token"));
}

#[tokio::test]
async fn registration_validates_input() {
    let (app, _) = test_app();

    let mut long_name = registration("Lena", vec![]);
    long_name.name = "x".repeat(31);
    assert!(matches!(app.register(&app.issue_csrf_token(), long_name).await, Err(Error::Validation(_))));

    let mut bad_email = registration("Lena", vec![]);
    bad_email.email = "lena".into();
    assert!(matches!(app.register(&app.issue_csrf_token(), bad_email).await, Err(Error::Validation(_))));

    let mut unknown_interest = registration("Lena", vec![]);
    unknown_interest.interests = vec![1, 999];
    assert!(matches!(app.register(&app.issue_csrf_token(), unknown_interest).await, Err(Error::Validation(_))));

    let mut foreign_avatar = registration("Lena", vec![]);
    foreign_avatar.avatar = "https://evil.example/me.png".into();
    assert!(matches!(app.register(&app.issue_csrf_token(), foreign_avatar).await, Err(Error::Validation(_))));
}

#[tokio::test]
async fn gravatars_belong_to_the_account_email() {
    let (app, _) = test_app();

    let mut borrowed = registration("Lena", vec![]);
    borrowed.avatar = Avatar::gravatar("tom@buddies.test").to_string();
    assert!(matches!(app.register(&app.issue_csrf_token(), borrowed).await, Err(Error::Validation(_))));

    let mut own = registration("Lena", vec![]);
    own.avatar = Avatar::gravatar("lena@buddies.test").to_string();
    let (account, session) = app.register(&app.issue_csrf_token(), own).await.unwrap();
    assert_eq!(account.profile.avatar, Avatar::gravatar("lena@buddies.test").to_string());
    let lena = app.authenticate(Some(&session.token)).await.unwrap();

    let form = ProfileForm {
        name: "Lena".into(),
        avatar: Avatar::gravatar("tom@buddies.test").to_string(),
        bio: "Still me".into(),
        interests: vec![],
    };
    assert!(matches!(app.update_profile(&lena, form).await, Err(Error::Validation(_))));
    assert_eq!(app.account(&lena).await.unwrap(), account);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (app, _) = test_app();

    let csrf_token = app.issue_csrf_token();
    let (_, session) = app.register(&csrf_token, registration("Lena", vec![])).await.unwrap();
    app.authenticate(Some(&session.token)).await.unwrap();

    let cookie = app.logout(&session.token).await.unwrap();
    assert_eq!(cookie.max_age, chrono::Duration::zero());
    assert!(cookie.value.is_empty());
    assert!(matches!(app.authenticate(Some(&session.token)).await, Err(Error::AuthRequired)));
}

#[tokio::test]
async fn saving_the_same_profile_twice_is_idempotent() {
    let (app, _) = test_app();
    let lena = register(&app, "Lena", &["Hiking"]).await;
    let interests = interest_ids(&app, &["Gym", "Cinema", "Gym"]).await;

    let form = ProfileForm { name: "Lena B.".into(), avatar: "/kitten.jpg".into(), bio: "Likes movies".into(), interests };
    let first = app.update_profile(&lena, form.clone()).await.unwrap();
    let second = app.update_profile(&lena, form).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.profile.interests.len(), 2);
    assert_eq!(app.account(&lena).await.unwrap(), second);
}

#[tokio::test]
async fn deleting_an_account_cleans_up() {
    let (app, db) = test_app();

    let leaving = register(&app, "Leaving", &["Hiking", "Gym"]).await;
    let staying = register(&app, "Staying", &["Hiking", "Gym"]).await;

    let own_chat = app.start_chat(&leaving, "Own", &[staying.user_id()]).await.unwrap();
    let foreign_chat = app.start_chat(&staying, "Foreign", &[leaving.user_id()]).await.unwrap();
    app.post_message(&leaving, &foreign_chat.id, "Goodbye everyone").await.unwrap();
    app.post_message(&leaving, &own_chat.id, "Welcome to my chat").await.unwrap();
    app.post_message(&staying, &own_chat.id, "Glad to be here").await.unwrap();

    let (name, cookie) = app.delete_account(&leaving).await.unwrap();
    assert_eq!(name, "Leaving");
    assert_eq!(cookie.max_age, chrono::Duration::zero());

    assert!(matches!(app.account(&leaving).await, Err(Error::AuthRequired)));
    assert!(matches!(app.user_profile(&staying, &leaving.user_id()).await, Err(Error::NotFound(_))));
    assert!(app.matches(&staying).await.unwrap().is_empty());

    let details = app.chat(&staying, &own_chat.id).await.unwrap();
    assert_eq!(details.chat.creator_id, leaving.user_id());
    assert_eq!(details.members.iter().map(|m| m.id).collect::<Vec<_>>(), vec![staying.user_id()]);
    let own_history = app.message_history(&staying, &own_chat.id).await.unwrap();
    assert_eq!(own_history.len(), 2);
    assert_eq!(own_history[0].author_name, "Leaving");

    // nobody administers the chat anymore, but its members can still leave
    assert!(matches!(app.delete_chat(&staying, &own_chat.id).await, Err(Error::Forbidden(_))));
    app.remove_member(&staying, &staying.user_id(), &own_chat.id).await.unwrap();
    assert!(app.chats(&staying).await.unwrap().iter().all(|chat| chat.id != own_chat.id));

    let members: Vec<UserId> = app.members(&staying, &foreign_chat.id).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(members, vec![staying.user_id()]);

    let history = app.message_history(&staying, &foreign_chat.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].author_name, "Leaving");

    assert!(db.fetch_user(&leaving.user_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn chat_details_are_for_members() {
    let (app, _) = test_app();

    let creator = register(&app, "Creator", &[]).await;
    let member = register(&app, "Member", &[]).await;
    let outsider = register(&app, "Outsider", &[]).await;
    let chat = app.start_chat(&creator, "  Team Sports  ", &[member.user_id()]).await.unwrap();
    assert_eq!(chat.name, "Team Sports");

    let details = app.chat(&member, &chat.id).await.unwrap();
    assert_eq!(details.chat, chat);
    assert_eq!(details.members.iter().map(|m| m.id).collect::<Vec<_>>(), ids(&[&creator, &member]));

    assert!(matches!(app.chat(&outsider, &chat.id).await, Err(Error::Forbidden(_))));
    assert_eq!(app.chats(&member).await.unwrap(), vec![chat]);
}
