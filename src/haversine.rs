//! Great-circle distance, and a straight-line routing provider for when no
//! road router is available.

use crate::config::PlannerConfig;
use crate::error::ProviderError;
use crate::model::{Coordinates, PathSegment};
use crate::traits::RoutingProvider;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();

    // Rounding can push `a` just past 1 for antipodal points.
    let a = ((delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in metres.
pub fn haversine_m(from: Coordinates, to: Coordinates) -> f64 {
    haversine_km(from, to) * 1000.0
}

/// Routes along the straight line between the endpoints.
///
/// Less accurate than a road router but always available. Travel time is
/// estimated from an assumed speed.
#[derive(Debug, Clone)]
pub struct HaversineProvider {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineProvider {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineProvider {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Provider driving at `fallback_speed_kmh`.
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.fallback_speed_kmh)
    }

    fn km_to_seconds(&self, km: f64) -> f64 {
        (km / self.speed_kmh * 3600.0).round()
    }
}

impl RoutingProvider for HaversineProvider {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        if !(self.speed_kmh > 0.0) {
            return Err(ProviderError::Malformed(format!(
                "fallback speed must be positive, got {}",
                self.speed_kmh
            )));
        }

        let km = haversine_km(start, end);
        let seconds = self.km_to_seconds(km);

        Ok(vec![PathSegment {
            geometry: vec![start, end],
            cost: km,
            time_cost: seconds,
            cumulative_cost: km,
            cumulative_time_cost: seconds,
        }])
    }
}
