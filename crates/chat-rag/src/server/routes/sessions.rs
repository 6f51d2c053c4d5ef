//! Chat session management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::ChatSession;

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

fn clean_name(name: Option<&str>) -> Result<Option<String>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if name.chars().count() > MAX_NAME_LEN => Err(Error::BadRequest(format!(
            "Session name is longer than {} characters",
            MAX_NAME_LEN
        ))),
        other => Ok(other.map(str::to_string)),
    }
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
) -> Result<Json<Vec<ChatSession>>> {
    Ok(Json(state.db().list_sessions(user.id)?))
}

/// POST /sessions - body optional, unnamed sessions are "New Chat"
pub async fn create_session(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    request: Option<Json<SessionRequest>>,
) -> Result<(StatusCode, Json<ChatSession>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let name = clean_name(request.name.as_deref())?;
    let session = state.db().create_session(user.id, name.as_deref())?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// PATCH /sessions/:id - rename
pub async fn rename_session(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<ChatSession>> {
    let name = clean_name(request.name.as_deref())?
        .ok_or_else(|| Error::BadRequest("Session name is empty".to_string()))?;

    let mut session = state.db().get_user_session(id, user.id)?;
    state.db().rename_session(session.id, &name)?;
    session.name = name;
    Ok(Json(session))
}

/// DELETE /sessions/:id - removes the session and its messages
pub async fn delete_session(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let session = state.db().get_user_session(id, user.id)?;
    state.db().delete_session(session.id)?;
    tracing::info!("Deleted chat session {} of user {}", session.id, user.username);
    Ok(StatusCode::NO_CONTENT)
}
