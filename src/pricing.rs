//! Suggested passenger compensation.

use serde::Serialize;

use crate::error::{PlannerError, Result};
use crate::haversine::haversine_km;
use crate::model::Coordinates;

pub const BASE_FARE: f64 = 2.0;
pub const PRICE_PER_KM: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompensationEstimate {
    pub distance_km: f64,
    pub estimated_compensation: f64,
}

/// Base fare plus a per-kilometre rate on the straight-line distance.
/// Both figures are rounded to two decimals.
pub fn estimate_compensation(start: Coordinates, end: Coordinates) -> Result<CompensationEstimate> {
    if !start.is_valid() || !end.is_valid() {
        return Err(PlannerError::validation("start and end must be valid coordinates"));
    }
    let distance_km = haversine_km(start, end);
    let fare = BASE_FARE + distance_km * PRICE_PER_KM;
    Ok(CompensationEstimate {
        distance_km: round_cents(distance_km),
        estimated_compensation: round_cents(fare),
    })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_costs_base_fare() {
        let here = Coordinates::new(-37.9105, 145.1362);
        let estimate = estimate_compensation(here, here).unwrap();
        assert_eq!(estimate.distance_km, 0.0);
        assert_eq!(estimate.estimated_compensation, BASE_FARE);
    }

    #[test]
    fn rate_is_applied_per_kilometre() {
        // one degree of latitude is ~111.19 km
        let estimate =
            estimate_compensation(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0)).unwrap();
        assert_eq!(estimate.distance_km, 111.19);
        assert_eq!(estimate.estimated_compensation, 29.8);
    }

    #[test]
    fn invalid_coordinates_are_rejected() {
        let result = estimate_compensation(Coordinates::new(95.0, 0.0), Coordinates::new(0.0, 0.0));
        assert!(matches!(result, Err(PlannerError::Validation(_))));
    }
}
