use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use safarai_core::validation::{normalize_username, parse_dob, parse_gender, today_utc};
use safarai_core::{ProfileUpdate, User};
use safarai_storage::UserRepository;

use crate::response::{envelope, json_body, ApiError, ApiResult};
use crate::session::authorize_user_access;
use crate::ApiState;

pub(crate) async fn get_profile(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult {
    authorize_user_access(&state, &headers, &user_id).await?;

    let Some(user) = state.store.find_user_by_id(&user_id).await? else {
        return Err(ApiError::not_found("User not found"));
    };
    Ok(envelope(
        StatusCode::OK,
        "User get successfully",
        user.to_profile(),
    ))
}

pub(crate) async fn update_profile(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult {
    authorize_user_access(&state, &headers, &user_id).await?;
    let update = json_body(payload)?;

    let Some(mut user) = state.store.find_user_by_id(&user_id).await? else {
        return Err(ApiError::not_found("User not found"));
    };
    apply_profile_update(&mut user, &update)?;
    user.updated_at = Utc::now();
    state.store.update_user(&user).await?;

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(envelope(
        StatusCode::OK,
        "User updated successfully",
        user.to_public(),
    ))
}

/// Only `username`, `gender` and `dob` are writable here. Anything else in the
/// body is ignored.
fn apply_profile_update(user: &mut User, update: &ProfileUpdate) -> Result<(), ApiError> {
    let username = update.username.as_deref().map(normalize_username).transpose()?;
    let gender = update.gender.as_deref().map(parse_gender).transpose()?;
    let dob = update
        .dob
        .as_deref()
        .map(|value| parse_dob(value, today_utc()))
        .transpose()?;

    if let Some(username) = username {
        user.username = username;
    }
    if gender.is_some() {
        user.gender = gender;
    }
    if dob.is_some() {
        user.dob = dob;
    }
    Ok(())
}
