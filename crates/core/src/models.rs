use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// Stored account. Secrets live here and must never be serialized into a
/// response; use [`PublicUser`] for that.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub gender: Option<Gender>,
    pub dob: Option<NaiveDate>,
    pub role: Role,
    pub is_verified: bool,
    pub verification_code: Option<String>,
    pub verification_code_expiry: Option<DateTime<Utc>>,
    pub reset_password_token: Option<String>,
    pub reset_password_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            gender: self.gender,
            dob: self.dob,
            role: self.role,
            is_verified: self.is_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn to_profile(&self) -> ProfileView {
        ProfileView {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            gender: self.gender,
            dob: self.dob,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub gender: Option<Gender>,
    pub dob: Option<NaiveDate>,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub gender: Option<Gender>,
    pub dob: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    #[serde(rename = "Morning Activity")]
    Morning,
    #[serde(rename = "Afternoon Activity")]
    Afternoon,
    #[serde(rename = "Evening Activity")]
    Evening,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 3] = [Self::Morning, Self::Afternoon, Self::Evening];

    pub fn label(self) -> &'static str {
        match self {
            Self::Morning => "Morning Activity",
            Self::Afternoon => "Afternoon Activity",
            Self::Evening => "Evening Activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub time_of_day: TimeOfDay,
    pub title: String,
    pub budget: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySuggestion {
    /// Full heading as written by the model, e.g. `Day 1: 2025-11-05 (Kaghan)`.
    pub day: String,
    pub activities: Vec<Activity>,
}

/// Trip preferences as submitted by the client. Dates stay strings here and
/// are parsed by [`crate::validation::validate_trip_request`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripRequest {
    pub name: String,
    pub destinations: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub duration: u32,
    pub budget: f64,
    pub trip_type: String,
    pub transportation: String,
    pub accommodation: String,
    pub trip_pace: String,
    pub special_occasion: String,
    pub interests: Vec<String>,
    pub dining_preferences: Vec<String>,
    pub dietary_restrictions: Vec<String>,
}

/// A request that passed validation, with trimmed text and parsed dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidTripRequest {
    pub name: String,
    pub destinations: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: u32,
    pub budget: f64,
    pub trip_type: String,
    pub transportation: String,
    pub accommodation: String,
    pub trip_pace: String,
    pub special_occasion: String,
    pub interests: Vec<String>,
    pub dining_preferences: Vec<String>,
    pub dietary_restrictions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub destinations: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: u32,
    pub budget: f64,
    pub trip_type: String,
    pub transportation: String,
    pub accommodation: String,
    pub trip_pace: String,
    pub special_occasion: String,
    pub interests: Vec<String>,
    pub dining_preferences: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    pub ai_suggestions: Vec<DaySuggestion>,
    pub ai_suggested_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn from_generated(
        id: String,
        user_id: String,
        request: ValidTripRequest,
        itinerary: crate::itinerary::ParsedItinerary,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            name: request.name,
            destinations: request.destinations,
            start_date: request.start_date,
            end_date: request.end_date,
            duration: request.duration,
            budget: request.budget,
            trip_type: request.trip_type,
            transportation: request.transportation,
            accommodation: request.accommodation,
            trip_pace: request.trip_pace,
            special_occasion: request.special_occasion,
            interests: request.interests,
            dining_preferences: request.dining_preferences,
            dietary_restrictions: request.dietary_restrictions,
            ai_suggestions: itinerary.days,
            ai_suggested_notes: itinerary.notes,
            created_at: now,
            updated_at: now,
        }
    }
}
