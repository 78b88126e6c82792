//! Route composition: stitching provider segments and chaining legs.

use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::model::{Coordinates, PathSegment, Route};
use crate::polyline::{self, Polyline};
use crate::traits::RoutingProvider;

/// Builds encoded routes on top of a routing provider.
#[derive(Debug, Clone)]
pub struct RouteComposer<P> {
    provider: P,
}

impl<P: RoutingProvider> RouteComposer<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Single point-to-point route.
    ///
    /// Totals come from the provider's cumulative cost on the last segment.
    pub fn direct_route(&self, start: Coordinates, dest: Coordinates) -> Result<Route> {
        let segments = self.provider.route(start, dest)?;
        let Some(last) = segments.last() else {
            return Err(no_route(start, dest).into());
        };
        let (distance_km, duration) = (last.cumulative_cost, last.cumulative_time_cost);

        let path = stitch_segments(&segments);
        if path.is_empty() {
            return Err(no_route(start, dest).into());
        }
        let end = path.last().copied().unwrap_or(dest);

        debug!(
            segments = segments.len(),
            points = path.len(),
            distance_km,
            "composed direct route"
        );

        Ok(Route {
            start,
            end,
            distance_km,
            duration_s: duration as i64,
            polyline: Polyline::new(path).encode(),
        })
    }

    /// Route through `waypoints` in the given order.
    pub fn multistop_route(
        &self,
        start: Coordinates,
        waypoints: &[Coordinates],
        dest: Coordinates,
    ) -> Result<Route> {
        if waypoints.is_empty() {
            return self.direct_route(start, dest);
        }

        let mut stops = Vec::with_capacity(waypoints.len() + 2);
        stops.push(start);
        stops.extend_from_slice(waypoints);
        stops.push(dest);

        let mut polylines = Vec::with_capacity(stops.len() - 1);
        let mut distance_km = 0.0;
        let mut duration_s = 0;

        for leg in stops.windows(2) {
            let route = self.direct_route(leg[0], leg[1])?;
            distance_km += route.distance_km;
            duration_s += route.duration_s;
            polylines.push(route.polyline);
        }

        Ok(Route {
            start,
            end: dest,
            distance_km,
            duration_s,
            polyline: polyline::combine(&polylines)?,
        })
    }
}

/// Joins raw segments into one continuous path.
///
/// A segment continues the path when its first point equals the current
/// tail; when its last point does instead, it is walked backwards. Either
/// way the shared point is kept once.
pub fn stitch_segments(segments: &[PathSegment]) -> Vec<Coordinates> {
    let mut path: Vec<Coordinates> = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        let geometry = &segment.geometry;
        let (Some(first), Some(last)) = (geometry.first(), geometry.last()) else {
            continue;
        };

        let Some(tail) = path.last().copied() else {
            path.extend_from_slice(geometry);
            continue;
        };

        if *first == tail {
            path.extend_from_slice(&geometry[1..]);
        } else if *last == tail {
            path.extend(geometry[..geometry.len() - 1].iter().rev());
        } else {
            warn!(
                segment = index,
                tail_lat = tail.lat,
                tail_lon = tail.lon,
                "segment does not touch the path tail, appending as-is"
            );
            path.extend_from_slice(geometry);
        }
    }

    path
}

fn no_route(start: Coordinates, dest: Coordinates) -> ProviderError {
    ProviderError::NoRoute {
        from: format!("{:.6},{:.6}", start.lat, start.lon),
        to: format!("{:.6},{:.6}", dest.lat, dest.lon),
    }
}
