use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Extension;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use buddies_core::accounts::{ProfileForm, Registration};
use buddies_core::authorization::{AuthService, SessionCookie, SESSION_COOKIE};
use buddies_core::data_access::DataAccess;
use buddies_core::matcher::MatchStrategy;
use buddies_core::{Buddies, ChatId, Error, Identity};

use crate::error::ApiError;
use crate::operation::Operation;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub csrf_token: String,
}

pub async fn csrf_token<D: DataAccess, A: AuthService, S: MatchStrategy>(
    State(app): State<Buddies<D, A, S>>,
) -> Json<CsrfResponse> {
    Json(CsrfResponse { csrf_token: app.issue_csrf_token() })
}

/// `POST /api`: runs one operation and answers with `{"data": ...}`.
pub async fn dispatch<D: DataAccess, A: AuthService, S: MatchStrategy>(
    State(app): State<Buddies<D, A, S>>,
    jar: CookieJar,
    payload: Result<Json<Operation>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<Value>)> {
    let Json(operation) = payload.map_err(|rejection| Error::validation(rejection.body_text()))?;
    debug!(op = operation.name(), "api call");

    let token = session_token(&jar);
    let (jar, data) = run(&app, jar, token.as_deref(), operation).await?;
    Ok((jar, Json(json!({ "data": data }))))
}

async fn run<D: DataAccess, A: AuthService, S: MatchStrategy>(
    app: &Buddies<D, A, S>,
    jar: CookieJar,
    token: Option<&str>,
    operation: Operation,
) -> ApiResult<(CookieJar, Value)> {
    let res = match operation {
        Operation::Register { csrf_token, name, avatar, bio, email, password, interests } => {
            reject_logged_in(app, token).await?;
            let registration = Registration { name, avatar, bio, email, password, interests };
            let (account, session) = app.register(&csrf_token, registration).await?;
            return Ok((jar.add(to_cookie(session.cookie)?), to_value(account)?));
        },
        Operation::Login { csrf_token, email, password } => {
            reject_logged_in(app, token).await?;
            let (user_id, session) = app.login(&csrf_token, &email, password).await?;
            return Ok((jar.add(to_cookie(session.cookie)?), json!({ "userId": user_id })));
        },
        Operation::Logout => {
            let cookie = app.logout(token.unwrap_or_default()).await?;
            return Ok((jar.add(to_cookie(cookie)?), Value::Null));
        },
        Operation::Interests => to_value(app.interest_catalog().await?)?,
        operation => {
            let identity = app.authenticate(token).await?;
            return run_authenticated(app, jar, &identity, operation).await;
        },
    };
    Ok((jar, res))
}

async fn run_authenticated<D: DataAccess, A: AuthService, S: MatchStrategy>(
    app: &Buddies<D, A, S>,
    jar: CookieJar,
    identity: &Identity,
    operation: Operation,
) -> ApiResult<(CookieJar, Value)> {
    let res = match operation {
        Operation::Me => to_value(app.account(identity).await?)?,
        Operation::User { user_id } => to_value(app.user_profile(identity, &user_id).await?)?,
        Operation::UpdateProfile { name, avatar, bio, interests } => {
            let form = ProfileForm { name, avatar, bio, interests };
            to_value(app.update_profile(identity, form).await?)?
        },
        Operation::DeleteAccount => {
            let (name, cookie) = app.delete_account(identity).await?;
            return Ok((jar.add(to_cookie(cookie)?), json!({ "name": name })));
        },
        Operation::Matches => to_value(app.match_profiles(identity).await?)?,
        Operation::CreateChat { name, member_ids } => {
            let chat = match member_ids {
                Some(member_ids) => app.start_chat(identity, &name, &member_ids).await?,
                None => app.create_chat(identity, &name).await?,
            };
            to_value(chat)?
        },
        Operation::Chats => to_value(app.chats(identity).await?)?,
        Operation::Chat { chat_id } => to_value(app.chat(identity, &chat_id).await?)?,
        Operation::AddMember { chat_id, user_id } => {
            app.add_member(identity, &user_id, &chat_id).await?;
            Value::Null
        },
        Operation::RemoveMember { chat_id, user_id } => {
            app.remove_member(identity, &user_id, &chat_id).await?;
            Value::Null
        },
        Operation::DeleteChat { chat_id } => {
            app.delete_chat(identity, &chat_id).await?;
            Value::Null
        },
        Operation::Members { chat_id } => to_value(app.members(identity, &chat_id).await?)?,
        Operation::PostMessage { chat_id, content } => to_value(app.post_message(identity, &chat_id, &content).await?)?,
        Operation::MessageHistory { chat_id } => to_value(app.message_history(identity, &chat_id).await?)?,
        Operation::Register { .. } | Operation::Login { .. } | Operation::Logout | Operation::Interests => {
            return Err(Error::validation("Unsupported operation").into());
        },
    };
    Ok((jar, res))
}

/// `GET /api/chats/{chat_id}/events`: new messages of the chat as server-sent events.
pub async fn chat_events<D: DataAccess, A: AuthService, S: MatchStrategy>(
    State(app): State<Buddies<D, A, S>>,
    Extension(shutdown): Extension<CancellationToken>,
    jar: CookieJar,
    chat_id: Result<Path<ChatId>, PathRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Path(chat_id) = chat_id.map_err(|rejection| Error::validation(rejection.body_text()))?;

    let token = session_token(&jar);
    let identity = app.authenticate(token.as_deref()).await?;
    let subscription = app.subscribe(&identity, &chat_id).await?;

    let events = stream::unfold(subscription, |mut subscription| async move {
        subscription.recv().await.map(|message| (message, subscription))
    })
    .take_until(shutdown.cancelled_owned())
    .filter_map(|message| async move {
        match Event::default().id(message.id.to_string()).json_data(&message) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                buddies_utils::log_internal_error(e);
                None
            },
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned())
}

async fn reject_logged_in<D: DataAccess, A: AuthService, S: MatchStrategy>(app: &Buddies<D, A, S>, token: Option<&str>) -> ApiResult<()> {
    match app.authenticate(token).await {
        Ok(_) => Err(Error::Conflict("Already logged in".into()).into()),
        Err(Error::AuthRequired) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn to_cookie(cookie: SessionCookie) -> ApiResult<Cookie<'static>> {
    let cookie = Cookie::parse(cookie.to_header_value())
        .map_err(|e| anyhow::anyhow!("Couldn't build session cookie: {e}"))?;
    Ok(cookie)
}

fn to_value(value: impl Serialize) -> ApiResult<Value> {
    let value = serde_json::to_value(value).map_err(|e| anyhow::anyhow!("Couldn't serialize response: {e}"))?;
    Ok(value)
}
