pub mod itinerary;
pub mod models;
pub mod prompt;
pub mod validation;

pub use itinerary::{parse_itinerary, ItineraryError, ParsedItinerary};
pub use models::*;
pub use prompt::build_itinerary_prompt;
pub use validation::{validate_trip_request, ValidationError};
