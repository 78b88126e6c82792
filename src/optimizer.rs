//! Pickup ordering with fixed start and destination.
//!
//! Small sets are solved exactly by trying every ordering against the
//! routing provider. Past the cap, orderings are chosen on great-circle
//! distances (nearest neighbour, then 2-opt) and only the winner is routed.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::haversine::haversine_km;
use crate::model::{Coordinates, Route};
use crate::route::RouteComposer;
use crate::traits::RoutingProvider;

pub const DEFAULT_MAX_EXACT_WAYPOINTS: usize = 8;

/// Ceiling on the exhaustive search. Nine waypoints would already be
/// 362 880 routed orderings.
pub const MAX_EXACT_WAYPOINTS_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedRoute {
    pub route: Route,
    /// Visiting order as indices into the input waypoints.
    pub order: Vec<usize>,
    pub exact: bool,
}

#[derive(Debug)]
pub struct WaypointOptimizer<'a, P> {
    composer: &'a RouteComposer<P>,
    max_exact: usize,
}

impl<'a, P: RoutingProvider> WaypointOptimizer<'a, P> {
    pub fn new(composer: &'a RouteComposer<P>) -> Self {
        Self {
            composer,
            max_exact: DEFAULT_MAX_EXACT_WAYPOINTS,
        }
    }

    /// Clamped to `1..=MAX_EXACT_WAYPOINTS_LIMIT`.
    pub fn with_max_exact(mut self, max_exact: usize) -> Self {
        self.max_exact = max_exact.clamp(1, MAX_EXACT_WAYPOINTS_LIMIT);
        self
    }

    pub fn with_config(self, config: &PlannerConfig) -> Self {
        self.with_max_exact(config.max_exact_waypoints)
    }

    /// Shortest route visiting every waypoint between `start` and `dest`.
    ///
    /// Among orderings of equal distance the first enumerated wins; the
    /// enumeration starts from the input order.
    pub fn best_order(
        &self,
        start: Coordinates,
        waypoints: &[Coordinates],
        dest: Coordinates,
    ) -> Result<OptimizedRoute> {
        if waypoints.is_empty() {
            return Ok(OptimizedRoute {
                route: self.composer.direct_route(start, dest)?,
                order: Vec::new(),
                exact: true,
            });
        }

        if waypoints.len() > self.max_exact {
            return self.heuristic_order(start, waypoints, dest);
        }

        let orders = permutations(waypoints.len());
        debug!(waypoints = waypoints.len(), orderings = orders.len(), "exhaustive waypoint search");

        let routes = orders
            .par_iter()
            .map(|order| {
                let stops: Vec<Coordinates> = order.iter().map(|&i| waypoints[i]).collect();
                self.composer.multistop_route(start, &stops, dest)
            })
            .collect::<Result<Vec<Route>>>()?;

        let mut best: Option<(usize, Route)> = None;
        for (index, route) in routes.into_iter().enumerate() {
            let better = match &best {
                Some((_, current)) => route.distance_km < current.distance_km,
                None => true,
            };
            if better {
                best = Some((index, route));
            }
        }

        let (index, route) =
            best.ok_or_else(|| PlannerError::validation("no waypoint ordering to evaluate"))?;

        Ok(OptimizedRoute {
            route,
            order: orders[index].clone(),
            exact: true,
        })
    }

    fn heuristic_order(
        &self,
        start: Coordinates,
        waypoints: &[Coordinates],
        dest: Coordinates,
    ) -> Result<OptimizedRoute> {
        info!(
            waypoints = waypoints.len(),
            max_exact = self.max_exact,
            "waypoint count above exact cap, using nearest neighbour with 2-opt"
        );

        let mut order = nearest_neighbour(start, waypoints);
        while two_opt_improve(&mut order, start, waypoints, dest) {}

        let stops: Vec<Coordinates> = order.iter().map(|&i| waypoints[i]).collect();
        Ok(OptimizedRoute {
            route: self.composer.multistop_route(start, &stops, dest)?,
            order,
            exact: false,
        })
    }
}

/// Every ordering of `0..n`, lexicographic, starting with the identity.
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut current: Vec<usize> = (0..n).collect();
    let mut all = vec![current.clone()];

    loop {
        // Rightmost ascent.
        let Some(i) = (1..current.len()).rev().find(|&i| current[i - 1] < current[i]) else {
            return all;
        };
        let pivot = i - 1;
        let Some(j) = (i..current.len()).rev().find(|&j| current[j] > current[pivot]) else {
            return all;
        };
        current.swap(pivot, j);
        current[i..].reverse();
        all.push(current.clone());
    }
}

fn nearest_neighbour(start: Coordinates, waypoints: &[Coordinates]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..waypoints.len()).collect();
    let mut order = Vec::with_capacity(waypoints.len());
    let mut position = start;

    while !remaining.is_empty() {
        let mut best = 0;
        for k in 1..remaining.len() {
            if haversine_km(position, waypoints[remaining[k]])
                < haversine_km(position, waypoints[remaining[best]])
            {
                best = k;
            }
        }
        let next = remaining.remove(best);
        position = waypoints[next];
        order.push(next);
    }

    order
}

fn path_length(order: &[usize], start: Coordinates, waypoints: &[Coordinates], dest: Coordinates) -> f64 {
    let mut total = 0.0;
    let mut previous = start;
    for &i in order {
        total += haversine_km(previous, waypoints[i]);
        previous = waypoints[i];
    }
    total + haversine_km(previous, dest)
}

/// Reverses the first segment that shortens the path. Returns true if one was found.
fn two_opt_improve(
    order: &mut [usize],
    start: Coordinates,
    waypoints: &[Coordinates],
    dest: Coordinates,
) -> bool {
    let n = order.len();
    if n < 2 {
        return false;
    }

    let current = path_length(order, start, waypoints, dest);
    for i in 0..n - 1 {
        for j in i + 1..n {
            order[i..=j].reverse();
            // Require a real gain so float noise cannot cycle.
            if path_length(order, start, waypoints, dest) + 1e-9 < current {
                return true;
            }
            order[i..=j].reverse();
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haversine::HaversineProvider;

    #[test]
    fn permutation_counts() {
        assert_eq!(permutations(1), vec![vec![0]]);
        assert_eq!(permutations(2), vec![vec![0, 1], vec![1, 0]]);
        assert_eq!(permutations(3).len(), 6);
        assert_eq!(permutations(5).len(), 120);
        assert_eq!(permutations(3)[0], vec![0, 1, 2]);
    }

    #[test]
    fn permutations_are_distinct() {
        let mut all = permutations(4);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 24);
    }

    #[test]
    fn two_opt_untangles_crossed_path() {
        let start = Coordinates::new(0.0, 0.0);
        let dest = Coordinates::new(0.0, 0.05);
        let waypoints = [
            Coordinates::new(0.0, 0.04),
            Coordinates::new(0.0, 0.01),
            Coordinates::new(0.0, 0.02),
            Coordinates::new(0.0, 0.03),
        ];
        let mut order = vec![0, 1, 2, 3];
        while two_opt_improve(&mut order, start, &waypoints, dest) {}
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn exact_search_cannot_be_raised_past_the_limit() {
        let composer = RouteComposer::new(HaversineProvider::default());
        let optimizer = WaypointOptimizer::new(&composer).with_max_exact(20);
        let start = Coordinates::new(0.0, 0.0);
        let dest = Coordinates::new(0.0, 0.1);
        let waypoints: Vec<Coordinates> = (1..=MAX_EXACT_WAYPOINTS_LIMIT + 1)
            .map(|i| Coordinates::new(0.001 * i as f64, 0.01 * i as f64))
            .collect();

        let best = optimizer.best_order(start, &waypoints, dest).unwrap();
        assert!(!best.exact);
        assert_eq!(best.order.len(), waypoints.len());
    }

    #[test]
    fn config_sets_the_exact_cap() {
        let composer = RouteComposer::new(HaversineProvider::default());
        let config = PlannerConfig {
            max_exact_waypoints: 2,
            ..PlannerConfig::default()
        };
        let optimizer = WaypointOptimizer::new(&composer).with_config(&config);
        let start = Coordinates::new(0.0, 0.0);
        let dest = Coordinates::new(0.0, 0.05);
        let two = [Coordinates::new(0.0, 0.02), Coordinates::new(0.0, 0.01)];
        let three = [two[0], two[1], Coordinates::new(0.0, 0.03)];

        let exact = optimizer.best_order(start, &two, dest).unwrap();
        assert!(exact.exact);
        assert_eq!(exact.order, vec![1, 0]);
        assert!(!optimizer.best_order(start, &three, dest).unwrap().exact);
    }

    #[test]
    fn nearest_neighbour_walks_outwards() {
        let start = Coordinates::new(0.0, 0.0);
        let waypoints = [
            Coordinates::new(0.0, 0.03),
            Coordinates::new(0.0, 0.01),
            Coordinates::new(0.0, 0.02),
        ];
        assert_eq!(nearest_neighbour(start, &waypoints), vec![1, 2, 0]);
    }
}
