//! carpool-planner
//!
//! Ride matching and route composition for a carpooling service: passengers
//! post requests, drivers draft rides that propose to pick several of them
//! up, passengers accept or reject, and routes through the accepted pickups
//! are composed from road-routing segments.
//!
//! Persistence, notification delivery and road routing sit behind traits so
//! applications plug in their own infrastructure.

pub mod config;
pub mod coordinator;
pub mod detour;
pub mod error;
pub mod haversine;
pub mod model;
pub mod notify;
pub mod optimizer;
pub mod osrm;
pub mod polyline;
pub mod pricing;
pub mod proximity;
pub mod retry;
pub mod route;
pub mod scheduler;
pub mod store;
pub mod traits;

pub use error::{PlannerError, ProviderError, Result};
