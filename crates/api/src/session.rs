use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use chrono::{Duration, Utc};
use safarai_core::{Role, Session, User};
use safarai_storage::{SessionRepository, UserRepository};

use crate::config::CookieSettings;
use crate::credentials::generate_urlsafe_token;
use crate::response::ApiError;
use crate::ApiState;

const SESSION_TOKEN_BYTES: usize = 32;

pub(crate) fn read_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw_cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    raw_cookie.split(';').find_map(|part| {
        let mut split = part.trim().splitn(2, '=');
        let key = split.next()?.trim();
        let value = split.next()?.trim();
        if key == cookie_name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Bearer token first, then the session cookie.
pub(crate) fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer_token(headers).or_else(|| read_cookie_value(headers, cookie_name))
}

pub(crate) async fn current_user(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<Option<User>, ApiError> {
    let Some(token) = session_token(headers, &state.config.cookie.name) else {
        return Ok(None);
    };
    let Some(session) = state.store.load_session(&token).await? else {
        return Ok(None);
    };
    if session.is_expired(Utc::now()) {
        state.store.delete_session(&token).await?;
        return Ok(None);
    }

    Ok(state.store.find_user_by_id(&session.user_id).await?)
}

pub(crate) async fn require_user(state: &ApiState, headers: &HeaderMap) -> Result<User, ApiError> {
    current_user(state, headers)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Please login first"))
}

/// Resolves the caller and checks it may act on `user_id`: the same user or
/// an admin.
pub(crate) async fn authorize_user_access(
    state: &ApiState,
    headers: &HeaderMap,
    user_id: &str,
) -> Result<User, ApiError> {
    let caller = require_user(state, headers).await?;
    if caller.id != user_id && caller.role != Role::Admin {
        tracing::warn!(caller = %caller.id, target = %user_id, "cross-user access denied");
        return Err(ApiError::forbidden(
            "You are not allowed to access this resource",
        ));
    }
    Ok(caller)
}

pub(crate) async fn issue_session(state: &ApiState, user: &User) -> Result<Session, ApiError> {
    let now = Utc::now();
    let ttl = Duration::seconds(state.config.session_ttl.as_secs() as i64);
    let session = Session {
        token: generate_urlsafe_token(SESSION_TOKEN_BYTES),
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + ttl,
    };
    state.store.insert_session(&session).await?;
    Ok(session)
}

fn cookie_same_site_attr(value: &str) -> &'static str {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" => "None",
        "lax" => "Lax",
        _ => "Strict",
    }
}

pub(crate) fn build_session_cookie(
    settings: &CookieSettings,
    token: &str,
    max_age_seconds: u64,
) -> String {
    let mut segments = vec![
        format!("{}={token}", settings.name),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        format!("SameSite={}", cookie_same_site_attr(&settings.same_site)),
        format!("Max-Age={max_age_seconds}"),
    ];
    if settings.secure {
        segments.push("Secure".to_string());
    }
    if let Some(domain) = settings.domain.as_deref() {
        segments.push(format!("Domain={domain}"));
    }
    segments.join("; ")
}

pub(crate) fn build_clear_cookie(settings: &CookieSettings) -> String {
    let mut segments = vec![
        format!("{}=", settings.name),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        format!("SameSite={}", cookie_same_site_attr(&settings.same_site)),
        "Max-Age=0".to_string(),
        "Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
    ];
    if settings.secure {
        segments.push("Secure".to_string());
    }
    if let Some(domain) = settings.domain.as_deref() {
        segments.push(format!("Domain={domain}"));
    }
    segments.join("; ")
}

pub(crate) fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(header_value) = HeaderValue::from_str(cookie) {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, header_value);
    }
    response
}
