// Pure rate model: what one minute of an actor's work bills for.
//
// Purpose
// - Convert base rate, seniority tier, expertise count, and language count
//   into a billable rate in minor currency units per minute.
//
// Boundaries
// - No input or output. The resulting rate is snapshotted onto each entry
//   when a session starts; later profile changes never rewrite old entries.

use serde::{Deserialize, Serialize};

/// Only the first areas/languages raise the rate; beyond these caps more
/// breadth does not bill higher.
const EXPERTISE_BONUS_PER_AREA: f64 = 0.02;
const EXPERTISE_AREAS_COUNTED: u32 = 10;
const LANGUAGE_BONUS_PER_LANGUAGE: f64 = 0.01;
const LANGUAGES_COUNTED: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeniorityTier {
    Junior,
    Intermediate,
    Senior,
    Expert,
}

impl SeniorityTier {
    pub fn multiplier(self) -> f64 {
        match self {
            SeniorityTier::Junior => 1.0,
            SeniorityTier::Intermediate => 1.25,
            SeniorityTier::Senior => 1.5,
            SeniorityTier::Expert => 2.0,
        }
    }
}

impl std::str::FromStr for SeniorityTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "junior" => Ok(SeniorityTier::Junior),
            "intermediate" => Ok(SeniorityTier::Intermediate),
            "senior" => Ok(SeniorityTier::Senior),
            "expert" => Ok(SeniorityTier::Expert),
            other => Err(format!("unknown seniority tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateProfile {
    pub base_rate_per_minute: i64,
    pub tier: SeniorityTier,
    pub expertise_count: u32,
    pub language_count: u32,
}

/// Billable rate in minor units per minute, rounded to the nearest unit.
pub fn billable_rate(profile: &RateProfile) -> i64 {
    let breadth_bonus = 1.0
        + EXPERTISE_BONUS_PER_AREA * f64::from(profile.expertise_count.min(EXPERTISE_AREAS_COUNTED))
        + LANGUAGE_BONUS_PER_LANGUAGE * f64::from(profile.language_count.min(LANGUAGES_COUNTED));
    (profile.base_rate_per_minute as f64 * profile.tier.multiplier() * breadth_bonus).round() as i64
}
