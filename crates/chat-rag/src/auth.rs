//! Accounts and login sessions
//!
//! Passwords are stored as argon2 PHC strings. A successful login issues an
//! opaque token that the browser keeps in an HttpOnly cookie; API clients may
//! send it as `Authorization: Bearer <token>` instead.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::storage::ChatDb;
use crate::types::{ChatSession, User};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Unreadable password hash: {}", e);
            false
        }
    }
}

/// Usernames are 3 to 150 characters of letters, digits, `_`, `.` and `-`
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=150).contains(&len) {
        return Err(Error::BadRequest(
            "Username must be between 3 and 150 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::BadRequest(
            "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Create an account and its first chat session
///
/// Blocking (argon2); call from `spawn_blocking` in async code.
pub fn register(
    db: &ChatDb,
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<(User, ChatSession)> {
    validate_username(username)?;
    if password.chars().count() < config.min_password_len {
        return Err(Error::BadRequest(format!(
            "Password must be at least {} characters",
            config.min_password_len
        )));
    }

    let user = db.create_user(username, &hash_password(password)?)?;
    let session = db.create_session(user.id, None)?;
    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok((user, session))
}

/// Check credentials and issue a login token
///
/// Blocking (argon2); call from `spawn_blocking` in async code.
pub fn login(db: &ChatDb, config: &AuthConfig, username: &str, password: &str) -> Result<(User, String)> {
    let user = db
        .get_user_by_name(username)?
        .filter(|user| verify_password(password, &user.password_hash))
        .ok_or_else(|| Error::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    let token = db.create_token(user.id, chrono::Duration::hours(config.session_ttl_hours))?;
    db.purge_expired_tokens()?;
    tracing::info!("User {} logged in", user.username);
    Ok((user, token))
}

/// `Set-Cookie` value carrying a login token
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name,
        token,
        config.session_ttl_hours * 3600
    )
}

/// `Set-Cookie` value that removes the login cookie
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", config.cookie_name)
}

/// Token from `Authorization: Bearer`, else from the named cookie
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookies| parse_cookie(cookies, cookie_name))
}

fn parse_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// The logged-in user of a request
///
/// Rejects with 401 when no valid token is presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = token_from_headers(&parts.headers, &state.config().auth.cookie_name)
            .ok_or_else(|| Error::Unauthorized("Login required".to_string()))?;

        let user = state
            .db()
            .user_for_token(&token)?
            .ok_or_else(|| Error::Unauthorized("Session expired, please log in again".to_string()))?;

        Ok(CurrentUser { user, token })
    }
}
