use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::{Gender, TripRequest, ValidTripRequest};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_TRIP_DAYS: u32 = 7;
pub const MIN_USERNAME_LEN: usize = 2;
pub const MAX_USERNAME_LEN: usize = 64;
const MAX_TEXT_FIELD_LEN: usize = 200;
const MAX_LIST_ITEMS: usize = 20;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("email regex"));

/// Rejection of client input. The display text is sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("Please enter at least one destination")]
    MissingDestination,
    #[error("Please enter correct duration")]
    InvalidDuration,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0} must be a date in YYYY-MM-DD format")]
    InvalidDate(&'static str),
    #[error("End date must not be before start date")]
    DateOrder,
    #[error("Budget must be a positive amount")]
    InvalidBudget,
    #[error("Username must be between 2 and 64 characters")]
    InvalidUsername,
    #[error("Gender must be either male or female")]
    InvalidGender,
    #[error("Date of birth must be a past date in YYYY-MM-DD format")]
    InvalidDob,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn normalize_username(value: &str) -> Result<String, ValidationError> {
    let username = value.trim().to_lowercase();
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(username)
}

/// Username used when registration does not supply one: the local part of
/// the address.
pub fn default_username(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

pub fn parse_gender(value: &str) -> Result<Gender, ValidationError> {
    Gender::parse(value).ok_or(ValidationError::InvalidGender)
}

pub fn parse_dob(value: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let dob = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDob)?;
    if dob >= today {
        return Err(ValidationError::InvalidDob);
    }
    Ok(dob)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (date part is kept).
pub fn parse_trip_date(value: &str, field: &'static str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|parsed| parsed.date_naive()))
        .map_err(|_| ValidationError::InvalidDate(field))
}

pub fn validate_trip_request(request: &TripRequest) -> Result<ValidTripRequest, ValidationError> {
    let destinations = clean_list(&request.destinations);
    if destinations.is_empty() {
        return Err(ValidationError::MissingDestination);
    }
    if request.duration == 0 || request.duration > MAX_TRIP_DAYS {
        return Err(ValidationError::InvalidDuration);
    }

    let name = required_text(&request.name, "Trip name")?;
    let start_date = parse_trip_date(&request.start_date, "Start date")?;
    let end_date = parse_trip_date(&request.end_date, "End date")?;
    if end_date < start_date {
        return Err(ValidationError::DateOrder);
    }
    if !request.budget.is_finite() || request.budget <= 0.0 {
        return Err(ValidationError::InvalidBudget);
    }

    Ok(ValidTripRequest {
        name,
        destinations,
        start_date,
        end_date,
        duration: request.duration,
        budget: request.budget,
        trip_type: required_text(&request.trip_type, "Trip type")?,
        transportation: required_text(&request.transportation, "Transportation")?,
        accommodation: required_text(&request.accommodation, "Accommodation")?,
        trip_pace: required_text(&request.trip_pace, "Trip pace")?,
        special_occasion: required_text(&request.special_occasion, "Special occasion")?,
        interests: clean_list(&request.interests),
        dining_preferences: clean_list(&request.dining_preferences),
        dietary_restrictions: clean_list(&request.dietary_restrictions),
    })
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

fn required_text(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = limit_chars(value.trim(), MAX_TEXT_FIELD_LEN);
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed)
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| limit_chars(value.trim(), MAX_TEXT_FIELD_LEN))
        .filter(|value| !value.is_empty())
        .take(MAX_LIST_ITEMS)
        .collect()
}

fn limit_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
