// Environment-driven configuration for the shell.
//
// The engine itself takes plain values; only this composition layer reads
// the environment. `.env` files are honored in development through dotenvy
// (tests only); production sets real variables.

use crate::application::session::DEFAULT_AUTOSAVE_INTERVAL;
use crate::core::billing::DEFAULT_TAX_RATE;
use crate::core::rates::{billable_rate, RateProfile, SeniorityTier};
use anyhow::Context;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub actor_id: String,
    pub rate_profile: RateProfile,
    pub autosave_interval: Duration,
    pub tax_rate: f64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let actor_id = std::env::var("TRACKING_ACTOR_ID")
            .context("TRACKING_ACTOR_ID must be set; the engine needs a current actor")?;

        let rate_profile = RateProfile {
            base_rate_per_minute: env_or("TRACKING_BASE_RATE_PER_MINUTE", 60)?,
            tier: env_or("TRACKING_SENIORITY_TIER", SeniorityTier::Intermediate)?,
            expertise_count: env_or("TRACKING_EXPERTISE_COUNT", 0)?,
            language_count: env_or("TRACKING_LANGUAGE_COUNT", 0)?,
        };

        Ok(Self {
            bind_addr: env_or("TRACKING_BIND_ADDR", "0.0.0.0:8080".to_string())?,
            actor_id,
            rate_profile,
            autosave_interval: Duration::from_secs(env_or(
                "TRACKING_AUTOSAVE_INTERVAL_SECS",
                DEFAULT_AUTOSAVE_INTERVAL.as_secs(),
            )?),
            tax_rate: env_or("TRACKING_TAX_RATE", DEFAULT_TAX_RATE)?,
        })
    }

    /// The billable rate snapshotted onto new entries.
    pub fn rate_per_minute(&self) -> i64 {
        billable_rate(&self.rate_profile)
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {name}: {err}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(anyhow::anyhow!("could not read {name}: {err}")),
    }
}
