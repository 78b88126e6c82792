//! OSRM HTTP adapter for point-to-point routes.
//!
//! Each route step becomes one path segment; cumulative costs are running
//! sums over the steps, converted to kilometres and seconds.

use serde::Deserialize;
use tracing::debug;

use crate::config::{OsrmConfig, PlannerConfig};
use crate::error::ProviderError;
use crate::model::{Coordinates, PathSegment};
use crate::retry::RetryingProvider;
use crate::traits::RoutingProvider;

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Client for `config.osrm` behind the configured retry policy.
    pub fn with_retry(config: &PlannerConfig) -> Result<RetryingProvider<Self>, ProviderError> {
        let client = Self::new(config.osrm.clone())?;
        Ok(RetryingProvider::new(client, config.retry.clone()))
    }

    fn route_url(&self, start: Coordinates, end: Coordinates) -> String {
        format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}?overview=false&steps=true&geometries=geojson",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            start.lon,
            start.lat,
            end.lon,
            end.lat
        )
    }
}

impl RoutingProvider for OsrmClient {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        let url = self.route_url(start, end);
        debug!(%url, "requesting OSRM route");

        let response = self.client.get(url).send()?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ProviderError::Status(status.as_u16()));
        }

        // OSRM answers routing failures with a 400 and a JSON body carrying the code.
        let body = response.json::<OsrmRouteResponse>()?;
        segments_from_response(body, start, end)
    }
}

fn segments_from_response(
    body: OsrmRouteResponse,
    start: Coordinates,
    end: Coordinates,
) -> Result<Vec<PathSegment>, ProviderError> {
    match body.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => {
            return Err(ProviderError::NoRoute {
                from: format!("{:.6},{:.6}", start.lat, start.lon),
                to: format!("{:.6},{:.6}", end.lat, end.lon),
            });
        }
        other => {
            return Err(ProviderError::Malformed(format!(
                "{}: {}",
                other,
                body.message.unwrap_or_default()
            )));
        }
    }

    let route = body
        .routes
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("response holds no routes".to_string()))?;

    let mut segments = Vec::new();
    let mut cumulative_m = 0.0;
    let mut cumulative_s = 0.0;

    for step in route.legs.into_iter().flat_map(|leg| leg.steps) {
        cumulative_m += step.distance;
        cumulative_s += step.duration;

        let geometry = step
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinates::new(lat, lon))
            .collect();

        segments.push(PathSegment {
            geometry,
            cost: step.distance / 1000.0,
            time_cost: step.duration,
            cumulative_cost: cumulative_m / 1000.0,
            cumulative_time_cost: cumulative_s,
        });
    }

    Ok(segments)
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}
