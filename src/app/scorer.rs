//! Compatibility scoring between one lost report and one found report.
//!
//! Scores are a pure function of the two reports: no clock, no randomness,
//! no store access. Re-scoring the same pair always yields the same value.

use serde::Serialize;
use std::collections::HashSet;
use time::Date;

use crate::config::matching::{
    ATTRIBUTE_WEIGHT, DATE_SLACK_DAYS, DATE_WEIGHT, DATE_WINDOW_DAYS, LOCATION_WEIGHT,
};
use crate::domain::report::{FoundReport, LostReport};

/// Per-signal contributions, in points, that sum to the final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub species_match: bool,
    pub date: f64,
    pub location: f64,
    pub attributes: f64,
    pub total: u8,
}

impl ScoreBreakdown {
    fn rejected() -> Self {
        Self {
            species_match: false,
            date: 0.0,
            location: 0.0,
            attributes: 0.0,
            total: 0,
        }
    }
}

pub fn score(lost: &LostReport, found: &FoundReport) -> u8 {
    breakdown(lost, found).total
}

pub fn breakdown(lost: &LostReport, found: &FoundReport) -> ScoreBreakdown {
    if lost.pet_type != found.pet_type {
        return ScoreBreakdown::rejected();
    }

    let date = date_score(lost.last_seen_date, found.found_date);
    let location = location_score(&lost.last_seen_location, &found.found_location);
    let attributes = attribute_score(lost, found);

    let total = (date + location + attributes).round().clamp(0.0, 100.0) as u8;

    ScoreBreakdown {
        species_match: true,
        date,
        location,
        attributes,
        total,
    }
}

/// Linear decay over the date window. A pet found well before it went
/// missing scores nothing.
pub fn date_score(last_seen: Date, found: Date) -> f64 {
    let offset_days = (found - last_seen).whole_days();
    if offset_days < -DATE_SLACK_DAYS {
        return 0.0;
    }

    let delta = offset_days.unsigned_abs() as f64;
    DATE_WEIGHT * (1.0 - delta / DATE_WINDOW_DAYS).max(0.0)
}

/// Token Jaccard similarity of two free-text locations. Stands in for a
/// geocoded distance until one is available.
pub fn location_score(lost_location: &str, found_location: &str) -> f64 {
    let lost_tokens = location_tokens(lost_location);
    let found_tokens = location_tokens(found_location);

    if lost_tokens.is_empty() || found_tokens.is_empty() {
        return 0.0;
    }

    let shared = lost_tokens.intersection(&found_tokens).count();
    let union = lost_tokens.union(&found_tokens).count();

    LOCATION_WEIGHT * shared as f64 / union as f64
}

pub fn location_tokens(location: &str) -> HashSet<String> {
    let normalized: String = location
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect();

    normalized
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Equal share of the attribute weight per comparison both sides can make.
/// With nothing to compare the sub-score sits at half the weight, so sparse
/// reports are neither rewarded nor punished.
pub fn attribute_score(lost: &LostReport, found: &FoundReport) -> f64 {
    let comparisons = [
        compare(lost.breed.as_deref(), found.breed.as_deref(), same_breed),
        compare(lost.color.as_deref(), found.color.as_deref(), similar_color),
        compare(
            Some(lost.pet_name.as_str()),
            found.pet_name.as_deref(),
            same_name,
        ),
    ];

    let available: Vec<bool> = comparisons.into_iter().flatten().collect();
    if available.is_empty() {
        return ATTRIBUTE_WEIGHT / 2.0;
    }

    let hits = available.iter().filter(|hit| **hit).count();
    ATTRIBUTE_WEIGHT * hits as f64 / available.len() as f64
}

fn compare(
    lost: Option<&str>,
    found: Option<&str>,
    matches: fn(&str, &str) -> bool,
) -> Option<bool> {
    let lost = present(lost)?;
    let found = present(found)?;
    Some(matches(&lost, &found))
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn same_breed(lost: &str, found: &str) -> bool {
    lost == found
}

fn similar_color(lost: &str, found: &str) -> bool {
    lost.contains(found) || found.contains(lost)
}

fn same_name(lost: &str, found: &str) -> bool {
    lost == found
}
