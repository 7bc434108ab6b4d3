use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use safarai_core::TripRequest;
use safarai_planner::PlannerError;
use safarai_storage::UserRepository;

use crate::response::{envelope, json_body, ApiError, ApiResult};
use crate::session::authorize_user_access;
use crate::ApiState;

const GENERATION_FAILED: &str = "Failed to generate itinerary. Something went wrong";

pub(crate) async fn list_trips(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult {
    authorize_user_access(&state, &headers, &user_id).await?;

    let trips = state
        .planner
        .list_trips(&user_id)
        .await
        .map_err(planner_error)?;
    Ok(envelope(StatusCode::OK, "Trips get successfully", trips))
}

pub(crate) async fn generate_trip(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> ApiResult {
    authorize_user_access(&state, &headers, &user_id).await?;
    let request = json_body(payload)?;

    if state.store.find_user_by_id(&user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let trip = state
        .planner
        .generate_trip(&user_id, &request)
        .await
        .map_err(planner_error)?;
    Ok(envelope(
        StatusCode::CREATED,
        "Itinerary generated successfully",
        trip,
    ))
}

fn planner_error(error: PlannerError) -> ApiError {
    match error {
        PlannerError::Validation(error) => error.into(),
        PlannerError::Unavailable => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Itinerary generation is not configured",
        ),
        PlannerError::Generation(_) | PlannerError::Itinerary(_) => {
            ApiError::new(StatusCode::BAD_GATEWAY, GENERATION_FAILED)
        }
        PlannerError::Storage(error) => error.into(),
    }
}
