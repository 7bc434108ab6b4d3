mod auth;
pub mod config;
mod credentials;
mod emails;
pub mod mailer;
mod middleware;
mod profile;
pub mod rate_limit;
mod response;
mod session;
mod trips;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use parking_lot::RwLock;
use reqwest::Client;
use safarai_observability::{AppMetrics, MetricsSnapshot};
use safarai_planner::{GenerativeClient, TripPlanner};
use safarai_storage::Store;
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use crate::config::ApiConfig;
use crate::auth::OAuthStateRecord;
use crate::mailer::Mailer;
use crate::rate_limit::SlidingWindowLimiter;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<Store>,
    pub planner: Arc<TripPlanner<Store>>,
    pub mailer: Mailer,
    pub metrics: Arc<AppMetrics>,
    pub limiter: SlidingWindowLimiter,
    pub auth_limiter: SlidingWindowLimiter,
    pub http_client: Client,
    pub(crate) oauth_states: Arc<RwLock<HashMap<String, OAuthStateRecord>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    storage: &'static str,
    mail_transport: &'static str,
    metrics: MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthCapabilities {
    google_oauth: bool,
    itinerary_generation: bool,
}

pub async fn build_state(config: ApiConfig) -> Result<ApiState> {
    let metrics = AppMetrics::shared();

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url)
            .await
            .context("failed to open SQLite store")?,
        None => Store::memory(),
    };
    let store = Arc::new(store);

    let http_client = Client::builder()
        .connect_timeout(Duration::from_secs(6))
        .timeout(Duration::from_secs(20))
        .build()
        .context("failed to build HTTP client")?;

    let generator = match config.gemini.clone() {
        Some(gemini) => {
            let client = Client::builder()
                .connect_timeout(Duration::from_secs(6))
                .timeout(Duration::from_secs(60))
                .build()
                .context("failed to build generation HTTP client")?;
            Some(GenerativeClient::new(client, gemini))
        }
        None => None,
    };
    let planner = Arc::new(TripPlanner::new(store.clone(), generator, metrics.clone()));

    let mailer = match config.mail_api.clone() {
        Some(mail_api) => Mailer::http(http_client.clone(), mail_api, config.mail_from.clone()),
        None => Mailer::log(),
    };

    tracing::info!(
        storage = store.backend(),
        mail_transport = mailer.transport(),
        itinerary_generation = planner.generation_enabled(),
        google_oauth = config.google_oauth.is_some(),
        "api state initialised"
    );

    Ok(ApiState {
        limiter: SlidingWindowLimiter::from_settings(&config.api_rate_limit),
        auth_limiter: SlidingWindowLimiter::from_settings(&config.auth_rate_limit),
        config: Arc::new(config),
        store,
        planner,
        mailer,
        metrics,
        http_client,
        oauth_states: Arc::new(RwLock::new(HashMap::new())),
    })
}

pub fn build_router(state: ApiState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/verify-email", post(auth::verify_email))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/google/start", get(auth::google_start))
        .route("/google/callback", get(auth::google_callback));

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_routes)
        .route(
            "/api/profile/{user_id}",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .route("/api/trips/{user_id}", get(trips::list_trips))
        .route("/api/trips/generate/{user_id}", post(trips::generate_trip))
        .layer(middleware::build_cors_layer(&state.config.allowed_origins))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_origin_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        storage: state.store.backend(),
        mail_transport: state.mailer.transport(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            google_oauth: state.config.google_oauth.is_some(),
            itinerary_generation: state.planner.generation_enabled(),
        },
    };
    (StatusCode::OK, Json(payload))
}
