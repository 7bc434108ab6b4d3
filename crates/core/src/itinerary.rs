//! Extraction of a day/activity schedule from free-form model output.
//!
//! The model is asked to answer in a fixed layout (`Day N:` headings, then
//! `Morning Activity:` / `Afternoon Activity:` / `Evening Activity:` blocks
//! each carrying `Title:`, `Budget:` and `Description:` lines). Anything that
//! does not fit that layout is skipped rather than repaired.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Activity, DaySuggestion, TimeOfDay};

static NOTES_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Notes:|Important Considerations:)").expect("notes marker regex")
});
static DAY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Day\s+\d+:").expect("day marker regex"));
static ACTIVITY_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(Morning|Afternoon|Evening) Activity:").expect("activity marker regex")
});
static TITLE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Title:\s*(.*)").expect("title field regex"));
static BUDGET_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Budget:\s*(.*)").expect("budget field regex"));
static DESCRIPTION_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)Description:\s*(.*)").expect("description field regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ItineraryError {
    #[error("generated text is empty")]
    EmptyResponse,
    #[error("no `Day N:` sections found in generated text")]
    NoDays,
    #[error("no activities found in any day section")]
    NoActivities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedItinerary {
    pub days: Vec<DaySuggestion>,
    pub notes: String,
}

pub fn parse_itinerary(raw: &str) -> Result<ParsedItinerary, ItineraryError> {
    let cleaned = raw.replace('*', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ItineraryError::EmptyResponse);
    }

    let (main_text, notes) = split_notes(cleaned);

    let blocks = day_blocks(main_text);
    if blocks.is_empty() {
        return Err(ItineraryError::NoDays);
    }

    let days = blocks
        .into_iter()
        .filter_map(|block| {
            let activities = extract_activities(block);
            if activities.is_empty() {
                return None;
            }
            Some(DaySuggestion {
                day: day_title(block),
                activities,
            })
        })
        .collect::<Vec<_>>();

    if days.is_empty() {
        return Err(ItineraryError::NoActivities);
    }

    Ok(ParsedItinerary {
        days,
        notes: notes.to_string(),
    })
}

/// Splits off the trailing notes section. Returns `(main, notes)`, both trimmed.
fn split_notes(text: &str) -> (&str, &str) {
    match NOTES_MARKER.find(text) {
        Some(found) => (text[..found.start()].trim(), text[found.end()..].trim()),
        None => (text, ""),
    }
}

fn day_blocks(text: &str) -> Vec<&str> {
    let starts = DAY_MARKER
        .find_iter(text)
        .map(|found| found.start())
        .collect::<Vec<_>>();

    starts
        .iter()
        .enumerate()
        .map(|(index, start)| {
            let end = starts.get(index + 1).copied().unwrap_or(text.len());
            &text[*start..end]
        })
        .collect()
}

fn day_title(block: &str) -> String {
    block.lines().next().unwrap_or_default().trim().to_string()
}

fn extract_activities(block: &str) -> Vec<Activity> {
    TimeOfDay::ALL
        .iter()
        .filter_map(|time_of_day| {
            let body = activity_body(block, *time_of_day)?;
            Some(Activity {
                time_of_day: *time_of_day,
                title: capture_field(&TITLE_FIELD, body),
                budget: capture_field(&BUDGET_FIELD, body),
                description: capture_field(&DESCRIPTION_FIELD, body),
            })
        })
        .collect()
}

/// Text after the first `<label>:` up to the next activity label of any kind.
fn activity_body(block: &str, time_of_day: TimeOfDay) -> Option<&str> {
    let wanted = time_of_day.label().split(' ').next().unwrap_or_default();
    let marker = ACTIVITY_MARKER.captures_iter(block).find(|captures| {
        captures
            .get(1)
            .is_some_and(|word| word.as_str().eq_ignore_ascii_case(wanted))
    })?;
    let body_start = marker.get(0)?.end();
    let body_end = ACTIVITY_MARKER
        .find_at(block, body_start)
        .map(|next| next.start())
        .unwrap_or(block.len());

    Some(block[body_start..body_end].trim())
}

fn capture_field(pattern: &Regex, body: &str) -> String {
    pattern
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .unwrap_or_default()
}
