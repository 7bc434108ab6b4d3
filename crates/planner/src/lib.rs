pub mod generator;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use safarai_core::{
    build_itinerary_prompt, parse_itinerary, validate_trip_request, ItineraryError, Trip,
    TripRequest, ValidationError,
};
use safarai_observability::AppMetrics;
use safarai_storage::{StorageError, TripRepository};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use generator::{GenerativeClient, GenerativeConfig};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("itinerary generation is not configured")]
    Unavailable,
    #[error("generative API call failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("could not read itinerary from generated text: {0}")]
    Itinerary(#[from] ItineraryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct TripPlanner<S>
where
    S: TripRepository,
{
    store: Arc<S>,
    generator: Option<GenerativeClient>,
    metrics: Arc<AppMetrics>,
}

impl<S> TripPlanner<S>
where
    S: TripRepository,
{
    pub fn new(
        store: Arc<S>,
        generator: Option<GenerativeClient>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            store,
            generator,
            metrics,
        }
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Validates the request, asks the model for an itinerary, extracts the
    /// schedule and stores the resulting trip.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn generate_trip(
        &self,
        user_id: &str,
        request: &TripRequest,
    ) -> Result<Trip, PlannerError> {
        let started = Instant::now();
        let valid = validate_trip_request(request)?;
        let generator = self.generator.as_ref().ok_or(PlannerError::Unavailable)?;

        let prompt = build_itinerary_prompt(&valid);
        let raw = match generator.generate_text(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                self.metrics.inc_generation_failure();
                warn!(error = %format!("{error:#}"), model = generator.model(), "itinerary generation failed");
                return Err(PlannerError::Generation(error));
            }
        };

        let itinerary = match parse_itinerary(&raw) {
            Ok(itinerary) => itinerary,
            Err(error) => {
                self.metrics.inc_generation_failure();
                warn!(error = %error, response_chars = raw.chars().count(), "generated itinerary unreadable");
                return Err(error.into());
            }
        };

        let trip = Trip::from_generated(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            valid,
            itinerary,
            Utc::now(),
        );
        self.store.insert_trip(&trip).await?;

        self.metrics.inc_itinerary_generated();
        info!(
            trip_id = %trip.id,
            days = trip.ai_suggestions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "itinerary generated"
        );

        Ok(trip)
    }

    pub async fn list_trips(&self, user_id: &str) -> Result<Vec<Trip>, PlannerError> {
        Ok(self.store.list_trips_for_user(user_id).await?)
    }
}
