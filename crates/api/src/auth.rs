use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use safarai_core::validation::{
    default_username, normalize_email, normalize_username, validate_email, validate_password,
};
use safarai_core::{Role, User};
use safarai_storage::{SessionRepository, StorageError, UserRepository};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::GoogleOAuthConfig;
use crate::credentials::{
    constant_time_eq, generate_otp, generate_reset_token, generate_urlsafe_token, hash_password,
    pkce_challenge, sha256_hex, verify_password, OTP_TTL_MINUTES, RESET_TOKEN_TTL_MINUTES,
};
use crate::emails::{password_reset_email, verification_email};
use crate::mailer::OutgoingEmail;
use crate::response::{envelope, json_body, message_only, ApiError, ApiResult};
use crate::session::{
    build_clear_cookie, build_session_cookie, issue_session, require_user, session_token,
    with_cookie,
};
use crate::ApiState;

const USER_EXISTS: &str = "User already exists, please login";
const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const OAUTH_STATE_TTL_MINUTES: i64 = 12;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyEmailRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    otp: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForgotPasswordRequest {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordRequest {
    #[serde(default)]
    reset_token: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user: safarai_core::PublicUser,
    session_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleOAuthStartQuery {
    return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleOAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct OAuthStateRecord {
    code_verifier: String,
    return_to: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfoResponse {
    email: String,
    verified_email: Option<bool>,
    name: Option<String>,
}

/// Accepts the code as a JSON string or number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(value)) => Ok(value),
        Some(Value::Number(value)) => Ok(value.to_string()),
        Some(_) => Err(D::Error::custom("expected a string or number")),
    }
}

async fn deliver(state: &ApiState, email: OutgoingEmail) -> Result<(), ApiError> {
    match state.mailer.send(email).await {
        Ok(()) => {
            state.metrics.inc_email_sent();
            Ok(())
        }
        Err(error) => {
            state.metrics.inc_email_failure();
            tracing::error!(error = %format!("{error:#}"), transport = state.mailer.transport(), "email delivery failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send email, please try again",
            ))
        }
    }
}

fn issue_otp(user: &mut User, now: DateTime<Utc>) -> String {
    let otp = generate_otp();
    user.verification_code = Some(otp.clone());
    user.verification_code_expiry = Some(now + Duration::minutes(OTP_TTL_MINUTES));
    user.updated_at = now;
    otp
}

pub(crate) async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult {
    let input = json_body(payload)?;
    let email = normalize_email(&input.email);
    validate_email(&email)?;
    validate_password(&input.password)?;

    let username = match input.username.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => normalize_username(value)?,
        _ => default_username(&email),
    };

    let now = Utc::now();
    if let Some(mut existing) = state.store.find_user_by_email(&email).await? {
        if existing.is_verified {
            return Err(ApiError::bad_request(USER_EXISTS));
        }

        let otp = issue_otp(&mut existing, now);
        state.store.update_user(&existing).await?;
        deliver(
            &state,
            verification_email(&state.config.app_name, &existing.email, &otp),
        )
        .await?;

        tracing::info!(user_id = %existing.id, "verification code re-sent");
        return Ok(envelope(
            StatusCode::OK,
            "Verification email resent, please check your inbox",
            existing.id,
        ));
    }

    let password_hash = hash_password(input.password, state.config.bcrypt_cost)
        .await
        .map_err(|error| ApiError::internal("password hashing failed", format!("{error:#}")))?;

    let mut user = User {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        password_hash,
        gender: None,
        dob: None,
        role: Role::User,
        is_verified: false,
        verification_code: None,
        verification_code_expiry: None,
        reset_password_token: None,
        reset_password_expiry: None,
        created_at: now,
        updated_at: now,
    };
    let otp = issue_otp(&mut user, now);

    match state.store.insert_user(&user).await {
        Ok(()) => {}
        Err(StorageError::DuplicateEmail) => return Err(ApiError::bad_request(USER_EXISTS)),
        Err(error) => return Err(error.into()),
    }
    deliver(
        &state,
        verification_email(&state.config.app_name, &user.email, &otp),
    )
    .await?;

    state.metrics.inc_registration();
    tracing::info!(user_id = %user.id, "user registered");
    Ok(envelope(
        StatusCode::CREATED,
        "User registered successfully, please verify your email",
        user.id,
    ))
}

pub(crate) async fn verify_email(
    State(state): State<ApiState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> ApiResult {
    let input = json_body(payload)?;
    let otp = input.otp.trim();
    let user_id = input.user_id.trim();
    if otp.is_empty() || user_id.is_empty() {
        return Err(ApiError::bad_request("OTP and User ID are required"));
    }

    let Some(mut user) = state.store.find_user_by_id(user_id).await? else {
        return Err(ApiError::not_found("Invalid request"));
    };
    if user.is_verified {
        return Err(ApiError::bad_request("Email already verified"));
    }

    let (Some(code), Some(expiry)) = (
        user.verification_code.as_deref(),
        user.verification_code_expiry,
    ) else {
        return Err(ApiError::bad_request(
            "No verification code found, please register again",
        ));
    };

    let now = Utc::now();
    if expiry < now {
        return Err(ApiError::bad_request(
            "Otp is expired please request a new one by filling the registration form again",
        ));
    }
    if !constant_time_eq(code.as_bytes(), otp.as_bytes()) {
        return Err(ApiError::bad_request("Incorrect Otp"));
    }

    user.is_verified = true;
    user.verification_code = None;
    user.verification_code_expiry = None;
    user.updated_at = now;
    state.store.update_user(&user).await?;

    tracing::info!(user_id = %user.id, "email verified");
    Ok(message_only(StatusCode::OK, "Email verified successfully"))
}

pub(crate) async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let input = json_body(payload)?;
    let email = normalize_email(&input.email);
    if email.is_empty() || input.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        return Err(ApiError::unauthorized("No user found with this email"));
    };
    if !user.is_verified {
        return Err(ApiError::forbidden("Please verify you account first"));
    }

    let valid = verify_password(input.password, user.password_hash.clone())
        .await
        .map_err(|error| ApiError::internal("password verification failed", format!("{error:#}")))?;
    if !valid {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let session = issue_session(&state, &user).await?;
    state.metrics.inc_login();
    tracing::info!(user_id = %user.id, "user logged in");

    let cookie = build_session_cookie(
        &state.config.cookie,
        &session.token,
        state.config.session_ttl.as_secs(),
    );
    let response = envelope(
        StatusCode::OK,
        "Logged in successfully",
        LoginResponse {
            token: session.token,
            user: user.to_public(),
            session_expires_at: session.expires_at,
        },
    );
    Ok(with_cookie(response, &cookie))
}

pub(crate) async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult {
    if let Some(token) = session_token(&headers, &state.config.cookie.name) {
        state.store.delete_session(&token).await?;
    }

    let response = message_only(StatusCode::OK, "Logged out successfully");
    Ok(with_cookie(
        response,
        &build_clear_cookie(&state.config.cookie),
    ))
}

pub(crate) async fn me(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult {
    let user = require_user(&state, &headers).await?;
    Ok(envelope(StatusCode::OK, "Current user", user.to_public()))
}

pub(crate) async fn forgot_password(
    State(state): State<ApiState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult {
    let input = json_body(payload)?;
    let email = normalize_email(&input.email);
    if email.is_empty() {
        return Err(ApiError::bad_request("Please enter your email"));
    }

    let Some(mut user) = state.store.find_user_by_email(&email).await? else {
        return Err(ApiError::bad_request("User not found with this email"));
    };

    let now = Utc::now();
    let reset_token = generate_reset_token();
    user.reset_password_token = Some(sha256_hex(&reset_token));
    user.reset_password_expiry = Some(now + Duration::minutes(RESET_TOKEN_TTL_MINUTES));
    user.updated_at = now;
    state.store.update_user(&user).await?;

    let reset_link = format!(
        "{}/reset-password/{}",
        state.config.public_base_url.trim_end_matches('/'),
        reset_token
    );
    deliver(
        &state,
        password_reset_email(
            &state.config.app_name,
            &user.email,
            &reset_link,
            RESET_TOKEN_TTL_MINUTES,
        ),
    )
    .await?;

    tracing::info!(user_id = %user.id, "password reset requested");
    Ok(message_only(
        StatusCode::OK,
        "Password reset email sent, please check your inbox",
    ))
}

pub(crate) async fn reset_password(
    State(state): State<ApiState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> ApiResult {
    let input = json_body(payload)?;
    let reset_token = input.reset_token.trim();
    if reset_token.is_empty() {
        return Err(ApiError::bad_request("Unauthorized request"));
    }
    if input.new_password.is_empty() {
        return Err(ApiError::bad_request("New password field is required"));
    }

    let Some(mut user) = state
        .store
        .find_user_by_reset_token(&sha256_hex(reset_token))
        .await?
    else {
        return Err(ApiError::bad_request("Unauthorized request"));
    };

    let now = Utc::now();
    match user.reset_password_expiry {
        Some(expiry) if expiry >= now => {}
        _ => return Err(ApiError::bad_request("Invalid or expired token")),
    }
    validate_password(&input.new_password)?;

    user.password_hash = hash_password(input.new_password, state.config.bcrypt_cost)
        .await
        .map_err(|error| ApiError::internal("password hashing failed", format!("{error:#}")))?;
    user.reset_password_token = None;
    user.reset_password_expiry = None;
    user.updated_at = now;
    state.store.update_user(&user).await?;

    let revoked = state.store.delete_sessions_for_user(&user.id).await?;
    tracing::info!(user_id = %user.id, revoked_sessions = revoked, "password reset");
    Ok(message_only(StatusCode::OK, "Password reset successfully"))
}

pub(crate) async fn google_start(
    State(state): State<ApiState>,
    Query(query): Query<GoogleOAuthStartQuery>,
) -> ApiResult {
    let Some(config) = state.config.google_oauth.as_ref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Google sign-in is not configured",
        ));
    };

    let state_token = generate_urlsafe_token(24);
    let code_verifier = generate_urlsafe_token(64);
    let code_challenge = pkce_challenge(&code_verifier);
    let return_to = sanitize_return_to(query.return_to.as_deref().unwrap_or("/"));

    let now = Utc::now();
    {
        let mut pending = state.oauth_states.write();
        pending.retain(|_, record| record.expires_at > now);
        pending.insert(
            state_token.clone(),
            OAuthStateRecord {
                code_verifier,
                return_to,
                expires_at: now + Duration::minutes(OAUTH_STATE_TTL_MINUTES),
            },
        );
    }

    let authorize_url = format!(
        "{GOOGLE_AUTHORIZE_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&prompt=select_account",
        pct_encode(config.client_id.as_str()),
        pct_encode(config.redirect_uri.as_str()),
        pct_encode("openid email profile"),
        pct_encode(state_token.as_str()),
        pct_encode(code_challenge.as_str()),
    );

    Ok(envelope(
        StatusCode::OK,
        "Continue with Google",
        json!({ "authorizeUrl": authorize_url }),
    ))
}

fn auth_failure_redirect(config: &GoogleOAuthConfig, return_to: &str, reason: &str) -> Response {
    tracing::warn!(reason = %reason, "google sign-in failed");
    let target = format!(
        "{}{}?auth=error&reason={}",
        config.frontend_origin.trim_end_matches('/'),
        return_to,
        pct_encode(reason)
    );
    Redirect::to(target.as_str()).into_response()
}

pub(crate) async fn google_callback(
    State(state): State<ApiState>,
    Query(query): Query<GoogleOAuthCallbackQuery>,
) -> Response {
    let Some(config) = state.config.google_oauth.as_ref() else {
        return Redirect::to("/").into_response();
    };

    if let Some(error) = query.error.as_deref() {
        let reason = query.error_description.as_deref().unwrap_or(error);
        return auth_failure_redirect(config, "/", reason);
    }
    let Some(state_token) = query.state.as_deref() else {
        return auth_failure_redirect(config, "/", "missing_state");
    };
    let Some(pending) = state.oauth_states.write().remove(state_token) else {
        return auth_failure_redirect(config, "/", "invalid_state");
    };
    if pending.expires_at <= Utc::now() {
        return auth_failure_redirect(config, "/", "state_expired");
    }
    let return_to = pending.return_to.as_str();
    let Some(code) = query.code.as_deref() else {
        return auth_failure_redirect(config, return_to, "missing_code");
    };

    let token = match state
        .http_client
        .post(config.token_url.as_str())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
        ])
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            match response.json::<GoogleTokenResponse>().await {
                Ok(payload) => payload,
                Err(_) => return auth_failure_redirect(config, return_to, "token_parse_failed"),
            }
        }
        Ok(response) => {
            let reason = format!("token_exchange_failed_{}", response.status().as_u16());
            return auth_failure_redirect(config, return_to, &reason);
        }
        Err(_) => return auth_failure_redirect(config, return_to, "token_exchange_network_failed"),
    };

    let userinfo = match state
        .http_client
        .get(config.userinfo_url.as_str())
        .bearer_auth(token.access_token)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            match response.json::<GoogleUserInfoResponse>().await {
                Ok(payload) => payload,
                Err(_) => return auth_failure_redirect(config, return_to, "userinfo_parse_failed"),
            }
        }
        _ => return auth_failure_redirect(config, return_to, "userinfo_failed"),
    };
    if !userinfo.verified_email.unwrap_or(true) {
        return auth_failure_redirect(config, return_to, "email_not_verified");
    }

    let user = match find_or_create_google_user(&state, &userinfo).await {
        Ok(user) => user,
        Err(error) if error.status() == StatusCode::BAD_REQUEST => {
            return auth_failure_redirect(config, return_to, "invalid_email")
        }
        Err(_) => return auth_failure_redirect(config, return_to, "user_lookup_failed"),
    };
    let session = match issue_session(&state, &user).await {
        Ok(session) => session,
        Err(_) => return auth_failure_redirect(config, return_to, "session_issue_failed"),
    };
    state.metrics.inc_login();
    tracing::info!(user_id = %user.id, "google sign-in completed");

    let target = format!(
        "{}{}?auth=success",
        config.frontend_origin.trim_end_matches('/'),
        return_to
    );
    let cookie = build_session_cookie(
        &state.config.cookie,
        &session.token,
        state.config.session_ttl.as_secs(),
    );
    with_cookie(Redirect::to(target.as_str()).into_response(), &cookie)
}

/// Google accounts arrive verified. New ones get a random password so the
/// credentials login stays closed until a reset.
async fn find_or_create_google_user(
    state: &ApiState,
    userinfo: &GoogleUserInfoResponse,
) -> Result<User, ApiError> {
    let email = normalize_email(&userinfo.email);
    validate_email(&email)?;
    let now = Utc::now();

    if let Some(mut existing) = state.store.find_user_by_email(&email).await? {
        if !existing.is_verified {
            existing.is_verified = true;
            existing.verification_code = None;
            existing.verification_code_expiry = None;
            existing.updated_at = now;
            state.store.update_user(&existing).await?;
        }
        return Ok(existing);
    }

    let username = userinfo
        .name
        .as_deref()
        .and_then(|name| normalize_username(name).ok())
        .unwrap_or_else(|| default_username(&email));
    let password_hash = hash_password(generate_urlsafe_token(16), state.config.bcrypt_cost)
        .await
        .map_err(|error| ApiError::internal("password hashing failed", format!("{error:#}")))?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        password_hash,
        gender: None,
        dob: None,
        role: Role::User,
        is_verified: true,
        verification_code: None,
        verification_code_expiry: None,
        reset_password_token: None,
        reset_password_expiry: None,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_user(&user).await?;
    state.metrics.inc_registration();
    Ok(user)
}

fn sanitize_return_to(value: &str) -> String {
    let cleaned = value.trim();
    if cleaned.starts_with('/') && !cleaned.starts_with("//") {
        return cleaned.to_string();
    }
    "/".to_string()
}

fn pct_encode(input: &str) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            output.push(byte as char);
        } else {
            output.push('%');
            output.push_str(&format!("{:02X}", byte));
        }
    }
    output
}
