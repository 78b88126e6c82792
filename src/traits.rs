//! Collaborator seams.
//!
//! The core never talks to a concrete router, message queue or wall clock.
//! Applications implement these for their own infrastructure.

use chrono::{DateTime, Utc};

use crate::error::{PlannerError, ProviderError};
use crate::model::{Coordinates, PathSegment};
use crate::notify::{Notification, NotificationId};

/// Produces a point-to-point path as an ordered list of raw segments.
///
/// Segment geometry may be in either orientation. Cumulative costs on the
/// last segment are the totals for the whole path.
pub trait RoutingProvider: Send + Sync {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError>;
}

impl<P: RoutingProvider + ?Sized> RoutingProvider for &P {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        (**self).route(start, end)
    }
}

/// Durable notification queue. Delivery happens elsewhere.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<NotificationId, PlannerError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
