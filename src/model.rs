//! Domain records for ride matching and routing.
//!
//! Entities reference each other by id only. Relations (Request to Ride,
//! Proposal to Ride) are resolved through the store, never held as
//! in-memory object graphs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a passenger or driver account.
    AccountId
);
id_type!(RequestId);
id_type!(RideId);
id_type!(ProposalId);

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<(f64, f64)> for Coordinates {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

/// A named place: pickup or dropoff of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub label: String,
    pub position: Coordinates,
}

impl Place {
    pub fn new(label: impl Into<String>, position: Coordinates) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }
}

/// A passenger's posted trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub pickup: Place,
    pub dropoff: Place,
    pub compensation: f64,
    pub passenger_id: AccountId,
    /// `None` while the request is open and discoverable.
    pub ride_id: Option<RideId>,
    pub visited: bool,
    pub notifications_created: bool,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn is_open(&self) -> bool {
        self.ride_id.is_none()
    }
}

/// Input for posting a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub pickup: Place,
    pub dropoff: Place,
    pub compensation: f64,
    pub passenger_id: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    InProgress,
    Rejected,
    Completed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::InProgress => "in_progress",
            RideStatus::Rejected => "rejected",
            RideStatus::Completed => "completed",
        }
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        matches!(
            (self, next),
            (RideStatus::Pending, RideStatus::InProgress)
                | (RideStatus::Pending, RideStatus::Rejected)
                | (RideStatus::InProgress, RideStatus::Completed)
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregate trip a driver runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub status: RideStatus,
    pub destination: Coordinates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One driver's offer against one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub request_id: RequestId,
    pub ride_id: RideId,
    pub driver_id: AccountId,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A passenger's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn outcome(&self) -> ProposalStatus {
        match self {
            Decision::Accept => ProposalStatus::Accepted,
            Decision::Reject => ProposalStatus::Rejected,
        }
    }
}

/// Ride together with every proposal grouped under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideWithProposals {
    pub ride: Ride,
    pub proposals: Vec<Proposal>,
}

impl RideWithProposals {
    pub fn driver_id(&self) -> Option<AccountId> {
        self.proposals.first().map(|proposal| proposal.driver_id)
    }

    pub fn count(&self, status: ProposalStatus) -> usize {
        self.proposals
            .iter()
            .filter(|proposal| proposal.status == status)
            .count()
    }
}

/// One raw piece of path returned by a routing provider.
///
/// Geometry may arrive in either orientation relative to the travel
/// direction; the composer fixes that while stitching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub geometry: Vec<Coordinates>,
    /// Incremental distance in kilometres.
    pub cost: f64,
    /// Incremental travel time in seconds.
    pub time_cost: f64,
    /// Distance in kilometres from the start of the route to the end of this segment.
    pub cumulative_cost: f64,
    /// Seconds from the start of the route to the end of this segment.
    pub cumulative_time_cost: f64,
}

/// A composed route with its encoded path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub start: Coordinates,
    pub end: Coordinates,
    pub distance_km: f64,
    pub duration_s: i64,
    pub polyline: String,
}
