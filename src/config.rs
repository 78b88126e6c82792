//! Planner configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PlannerError, Result};
use crate::optimizer::MAX_EXACT_WAYPOINTS_LIMIT;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    /// Per-call deadline.
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Bounded retry for provider calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub announce_interval_secs: u64,
    pub proximity_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            announce_interval_secs: 5,
            proximity_interval_secs: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }

    pub fn proximity_interval(&self) -> Duration {
        Duration::from_secs(self.proximity_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Driver-to-pickup distance that triggers a proximity notification.
    pub proximity_radius_m: f64,
    /// Farthest a driver may be from a pickup when marking it visited.
    pub arrival_radius_m: f64,
    /// Largest waypoint count solved by exhaustive search.
    pub max_exact_waypoints: usize,
    /// Assumed speed for the straight-line fallback provider.
    pub fallback_speed_kmh: f64,
    pub osrm: OsrmConfig,
    pub retry: RetryPolicy,
    pub scheduler: SchedulerConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            proximity_radius_m: 100.0,
            arrival_radius_m: 1_000.0,
            max_exact_waypoints: 8,
            fallback_speed_kmh: 40.0,
            osrm: OsrmConfig::default(),
            retry: RetryPolicy::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: PlannerConfig = toml::from_str(source)
            .map_err(|err| PlannerError::validation(format!("config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| {
            PlannerError::validation(format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if !(self.proximity_radius_m > 0.0) || !(self.arrival_radius_m > 0.0) {
            return Err(PlannerError::validation("radii must be positive"));
        }
        if self.max_exact_waypoints == 0 || self.max_exact_waypoints > MAX_EXACT_WAYPOINTS_LIMIT {
            return Err(PlannerError::validation(format!(
                "max_exact_waypoints must be between 1 and {}",
                MAX_EXACT_WAYPOINTS_LIMIT
            )));
        }
        if !(self.fallback_speed_kmh > 0.0) {
            return Err(PlannerError::validation("fallback_speed_kmh must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(PlannerError::validation("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}
