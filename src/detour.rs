//! Detour cost of picking up a request on the way to a destination.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PlannerError, Result};
use crate::model::{Coordinates, Request, RequestId, Route};
use crate::route::RouteComposer;
use crate::traits::RoutingProvider;

/// Extra distance and time of a route with one pickup over the direct route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detour {
    pub distance_km: f64,
    pub duration_s: i64,
    /// The route through the pickup.
    pub route: Route,
}

impl Detour {
    pub fn distance_m(&self) -> f64 {
        self.distance_km * 1000.0
    }
}

/// Driver-supplied ceilings. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetourLimits {
    pub max_distance_m: Option<f64>,
    pub max_duration_s: Option<i64>,
}

impl DetourLimits {
    pub fn admits(&self, detour: &Detour) -> bool {
        let within_distance = self
            .max_distance_m
            .is_none_or(|limit| detour.distance_m() <= limit);
        let within_time = self
            .max_duration_s
            .is_none_or(|limit| detour.duration_s <= limit);
        within_distance && within_time
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub request: Request,
    pub detour: Detour,
}

#[derive(Debug)]
pub struct CandidateFailure {
    pub request_id: RequestId,
    pub error: PlannerError,
}

/// Requests a driver could take, ranked by added distance.
#[derive(Debug)]
pub struct CandidateListing {
    /// The driver's own route without pickups.
    pub baseline: Route,
    pub candidates: Vec<Candidate>,
    /// Requests whose detour could not be computed.
    pub failures: Vec<CandidateFailure>,
}

#[derive(Debug)]
pub struct DetourEvaluator<'a, P> {
    composer: &'a RouteComposer<P>,
}

impl<'a, P: RoutingProvider> DetourEvaluator<'a, P> {
    pub fn new(composer: &'a RouteComposer<P>) -> Self {
        Self { composer }
    }

    pub fn evaluate(
        &self,
        driver: Coordinates,
        destination: Coordinates,
        pickup: Coordinates,
    ) -> Result<Detour> {
        let baseline = self.composer.direct_route(driver, destination)?;
        self.against_baseline(&baseline, driver, destination, pickup)
    }

    fn against_baseline(
        &self,
        baseline: &Route,
        driver: Coordinates,
        destination: Coordinates,
        pickup: Coordinates,
    ) -> Result<Detour> {
        let with_stop = self.composer.multistop_route(driver, &[pickup], destination)?;
        Ok(Detour {
            distance_km: with_stop.distance_km - baseline.distance_km,
            duration_s: with_stop.duration_s - baseline.duration_s,
            route: with_stop,
        })
    }

    /// Evaluates every request against one baseline and keeps those within limits.
    ///
    /// A failing baseline aborts the listing. A failure for one request is
    /// recorded and the rest are still evaluated.
    pub fn rank_candidates(
        &self,
        driver: Coordinates,
        destination: Coordinates,
        requests: Vec<Request>,
        limits: DetourLimits,
    ) -> Result<CandidateListing> {
        let baseline = self.composer.direct_route(driver, destination)?;

        let outcomes: Vec<(Request, Result<Detour>)> = requests
            .into_par_iter()
            .map(|request| {
                let detour =
                    self.against_baseline(&baseline, driver, destination, request.pickup.position);
                (request, detour)
            })
            .collect();

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for (request, outcome) in outcomes {
            match outcome {
                Ok(detour) if limits.admits(&detour) => candidates.push(Candidate { request, detour }),
                Ok(detour) => {
                    debug!(
                        request_id = %request.id,
                        detour_m = detour.distance_m(),
                        detour_s = detour.duration_s,
                        "candidate exceeds detour limits"
                    );
                }
                Err(error) => {
                    warn!(request_id = %request.id, %error, "detour evaluation failed");
                    failures.push(CandidateFailure {
                        request_id: request.id,
                        error,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| a.detour.distance_km.total_cmp(&b.detour.distance_km));

        Ok(CandidateListing {
            baseline,
            candidates,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detour(distance_km: f64, duration_s: i64) -> Detour {
        Detour {
            distance_km,
            duration_s,
            route: Route {
                start: Coordinates::new(0.0, 0.0),
                end: Coordinates::new(0.0, 0.0),
                distance_km: 0.0,
                duration_s: 0,
                polyline: String::new(),
            },
        }
    }

    #[test]
    fn unbounded_limits_admit_everything() {
        assert!(DetourLimits::default().admits(&detour(500.0, 36_000)));
    }

    #[test]
    fn either_limit_excludes() {
        let limits = DetourLimits {
            max_distance_m: Some(2_000.0),
            max_duration_s: Some(300),
        };
        assert!(limits.admits(&detour(2.0, 300)));
        assert!(!limits.admits(&detour(2.1, 100)));
        assert!(!limits.admits(&detour(1.0, 301)));
    }
}
