//! Test fixtures for carpool-planner.
//!
//! Provides:
//! - Real Melbourne locations (from OpenStreetMap)
//! - Mock routing providers, clock and publishers
//! - A coordinator harness over the in-memory store

#![allow(dead_code)]

pub mod melbourne_locations;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

use carpool_planner::coordinator::ProposalCoordinator;
use carpool_planner::error::{PlannerError, ProviderError};
use carpool_planner::haversine::HaversineProvider;
use carpool_planner::model::{AccountId, Coordinates, NewRequest, PathSegment, Request};
use carpool_planner::notify::{MemoryOutbox, Notification, NotificationId};
use carpool_planner::store::MemoryStore;
use carpool_planner::traits::{Clock, NotificationPublisher, RoutingProvider};

pub use melbourne_locations::*;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Clock pinned to one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_noon() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Straight-line provider that counts every call.
#[derive(Default)]
pub struct CountingProvider {
    inner: HaversineProvider,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for CountingProvider {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.route(start, end)
    }
}

/// Straight-line provider that refuses any leg touching one coordinate.
pub struct Unreachable {
    pub blocked: Coordinates,
    inner: HaversineProvider,
}

impl Unreachable {
    pub fn at(blocked: Coordinates) -> Self {
        Self {
            blocked,
            inner: HaversineProvider::default(),
        }
    }
}

impl RoutingProvider for Unreachable {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        if start == self.blocked || end == self.blocked {
            return Err(ProviderError::NoRoute {
                from: format!("{},{}", start.lat, start.lon),
                to: format!("{},{}", end.lat, end.lon),
            });
        }
        self.inner.route(start, end)
    }
}

/// Publisher whose every call fails.
#[derive(Default)]
pub struct BrokenPublisher {
    pub attempts: Mutex<Vec<Notification>>,
}

impl NotificationPublisher for BrokenPublisher {
    fn publish(&self, notification: Notification) -> Result<NotificationId, PlannerError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(notification);
        }
        Err(PlannerError::Store("queue unavailable".to_string()))
    }
}

/// Publisher that stalls before delivering into an outbox.
pub struct SlowPublisher {
    pub outbox: Arc<MemoryOutbox>,
    delay: Duration,
    entered: AtomicUsize,
}

impl SlowPublisher {
    pub fn new(outbox: Arc<MemoryOutbox>, delay: Duration) -> Self {
        Self {
            outbox,
            delay,
            entered: AtomicUsize::new(0),
        }
    }

    /// Blocks until some caller is inside `publish`.
    pub fn wait_until_publishing(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.entered.load(Ordering::SeqCst) == 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl NotificationPublisher for SlowPublisher {
    fn publish(&self, notification: Notification) -> Result<NotificationId, PlannerError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.outbox.publish(notification)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<MemoryOutbox>,
    pub coordinator: ProposalCoordinator<MemoryStore, MemoryOutbox>,
}

pub fn harness() -> Harness {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(MemoryOutbox::new());
    let coordinator = ProposalCoordinator::new(Arc::clone(&store), Arc::clone(&outbox))
        .with_clock(Arc::new(FixedClock::at_noon()));
    Harness {
        store,
        outbox,
        coordinator,
    }
}

pub fn new_request(passenger: i64, pickup: &Location, dropoff: &Location, compensation: f64) -> NewRequest {
    NewRequest {
        pickup: pickup.place(),
        dropoff: dropoff.place(),
        compensation,
        passenger_id: AccountId(passenger),
    }
}

impl Harness {
    pub fn post(&self, passenger: i64, pickup: &Location, dropoff: &Location) -> Request {
        self.coordinator
            .create_request(new_request(passenger, pickup, dropoff, 12.5))
            .expect("create request")
    }
}
