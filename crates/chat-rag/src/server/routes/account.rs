//! Registration, login and logout

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, CurrentUser};
use crate::error::{Error, Result};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// POST /register - creates the account, its first session, and logs in
pub async fn register(State(state): State<AppState>, Json(credentials): Json<Credentials>) -> Result<Response> {
    let blocking_state = state.clone();
    let (user, session, token) = tokio::task::spawn_blocking(move || {
        let config = &blocking_state.config().auth;
        let username = credentials.username.trim();
        let (user, session) = auth::register(blocking_state.db(), config, username, &credentials.password)?;
        let token = blocking_state
            .db()
            .create_token(user.id, chrono::Duration::hours(config.session_ttl_hours))?;
        Ok::<_, Error>((user, session, token))
    })
    .await
    .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

    let cookie = auth::session_cookie(&state.config().auth, &token);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user": user, "session": session, "token": token })),
    )
        .into_response())
}

/// POST /login
pub async fn login(State(state): State<AppState>, Json(credentials): Json<Credentials>) -> Result<Response> {
    let blocking_state = state.clone();
    let (user, token) = tokio::task::spawn_blocking(move || {
        auth::login(
            blocking_state.db(),
            &blocking_state.config().auth,
            credentials.username.trim(),
            &credentials.password,
        )
    })
    .await
    .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

    let cookie = auth::session_cookie(&state.config().auth, &token);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user": user, "token": token })),
    )
        .into_response())
}

/// POST /logout - revokes the presented token
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<Response> {
    state.db().delete_token(&current.token)?;
    tracing::info!("User {} logged out", current.user.username);
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, auth::clear_session_cookie(&state.config().auth))],
    )
        .into_response())
}

/// GET /me - the logged-in user and their sessions
pub async fn me(State(state): State<AppState>, CurrentUser { user, .. }: CurrentUser) -> Result<Json<serde_json::Value>> {
    let sessions = state.db().list_sessions(user.id)?;
    Ok(Json(json!({ "user": user, "sessions": sessions })))
}
