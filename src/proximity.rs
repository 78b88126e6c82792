//! Driver-to-pickup distance checks.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::haversine::haversine_m;
use crate::model::{AccountId, Coordinates, ProposalStatus, RequestId, RideId, RideStatus};
use crate::notify::Notification;
use crate::store::{RideStore, RideTx};
use crate::traits::NotificationPublisher;

/// Distance at which the passenger is told the driver is close.
pub const PROXIMITY_RADIUS_M: f64 = 100.0;

/// Farthest a driver may be from a pickup when reporting arrival.
pub const ARRIVAL_RADIUS_M: f64 = 1_000.0;

/// A pickup belonging to an accepted proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct PickupStop {
    pub request_id: RequestId,
    pub passenger_id: AccountId,
    pub position: Coordinates,
    pub visited: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityHit {
    pub request_id: RequestId,
    pub passenger_id: AccountId,
    pub distance_m: f64,
}

/// Pickups of every accepted proposal under the ride.
pub fn accepted_pickups<T: RideTx>(tx: &T, ride_id: RideId) -> Result<Vec<PickupStop>> {
    tx.proposals_for_ride(ride_id)?
        .into_iter()
        .filter(|proposal| proposal.status == ProposalStatus::Accepted)
        .map(|proposal| {
            let request = tx.get_request(proposal.request_id)?;
            Ok(PickupStop {
                request_id: request.id,
                passenger_id: request.passenger_id,
                position: request.pickup.position,
                visited: request.visited,
            })
        })
        .collect()
}

/// Closest unvisited pickup and its distance in metres.
pub fn nearest_unvisited(driver: Coordinates, pickups: &[PickupStop]) -> Option<(&PickupStop, f64)> {
    pickups
        .iter()
        .filter(|pickup| !pickup.visited)
        .map(|pickup| (pickup, haversine_m(driver, pickup.position)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[derive(Debug, Clone)]
pub struct ProximityMonitor {
    radius_m: f64,
}

impl Default for ProximityMonitor {
    fn default() -> Self {
        Self::new(PROXIMITY_RADIUS_M)
    }
}

impl ProximityMonitor {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    /// Unvisited pickups within the proximity radius of the driver.
    pub fn check(&self, driver: Coordinates, pickups: &[PickupStop]) -> Vec<ProximityHit> {
        pickups
            .iter()
            .filter(|pickup| !pickup.visited)
            .filter_map(|pickup| {
                let distance_m = haversine_m(driver, pickup.position);
                (distance_m <= self.radius_m).then_some(ProximityHit {
                    request_id: pickup.request_id,
                    passenger_id: pickup.passenger_id,
                    distance_m,
                })
            })
            .collect()
    }

    /// One pass over every in-progress ride.
    ///
    /// At most one notification is ever published per (ride, driver,
    /// passenger). Alerts are marked and committed before anything is
    /// published, so the store is not locked while the publisher runs. A
    /// failed publish clears its mark again and is retried next pass.
    /// Returns the number published by this pass.
    pub fn scan<S, N>(&self, store: &S, publisher: &N) -> Result<usize>
    where
        S: RideStore,
        N: NotificationPublisher,
    {
        let alerts = self.claim_alerts(store)?;

        let mut published = 0;
        for alert in alerts {
            let notification = Notification::proximity(
                alert.hit.passenger_id,
                format!(
                    "Driver {} for ride {} is nearby! They are approximately {:.0} meters away.",
                    alert.driver_id, alert.ride_id, alert.hit.distance_m
                ),
            );
            match publisher.publish(notification) {
                Ok(notification_id) => {
                    published += 1;
                    info!(
                        notification_id = notification_id.0,
                        ride_id = %alert.ride_id,
                        driver_id = %alert.driver_id,
                        passenger_id = %alert.hit.passenger_id,
                        distance_m = alert.hit.distance_m,
                        "proximity notification created"
                    );
                }
                Err(error) => {
                    warn!(ride_id = %alert.ride_id, passenger_id = %alert.hit.passenger_id, %error, "failed to publish proximity notification");
                    let mut tx = store.begin()?;
                    tx.clear_proximity_alert(alert.ride_id, alert.driver_id, alert.hit.passenger_id)?;
                    tx.commit()?;
                }
            }
        }

        Ok(published)
    }

    /// Finds new hits and records them as sent in one transaction.
    fn claim_alerts<S: RideStore>(&self, store: &S) -> Result<Vec<PendingAlert>> {
        let mut tx = store.begin()?;
        let rides = tx.rides_with_status(RideStatus::InProgress)?;
        debug!(rides = rides.len(), "proximity scan");

        let mut alerts = Vec::new();
        for ride in rides {
            let Some(driver_id) = tx.proposals_for_ride(ride.id)?.first().map(|p| p.driver_id) else {
                continue;
            };
            let Some(driver) = tx.driver_position(driver_id)? else {
                debug!(ride_id = %ride.id, driver_id = %driver_id, "driver location not available");
                continue;
            };

            let pickups = accepted_pickups(&tx, ride.id)?;
            for hit in self.check(driver, &pickups) {
                if tx.proximity_alert_sent(ride.id, driver_id, hit.passenger_id)? {
                    continue;
                }
                tx.record_proximity_alert(ride.id, driver_id, hit.passenger_id)?;
                alerts.push(PendingAlert {
                    ride_id: ride.id,
                    driver_id,
                    hit,
                });
            }
        }

        tx.commit()?;
        Ok(alerts)
    }
}

struct PendingAlert {
    ride_id: RideId,
    driver_id: AccountId,
    hit: ProximityHit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: i64, lat: f64, lon: f64, visited: bool) -> PickupStop {
        PickupStop {
            request_id: RequestId(id),
            passenger_id: AccountId(100 + id),
            position: Coordinates::new(lat, lon),
            visited,
        }
    }

    const DRIVER: Coordinates = Coordinates::new(-37.9105, 145.1362);

    #[test]
    fn only_close_unvisited_pickups_hit() {
        let pickups = [
            // ~55 m north
            stop(1, -37.9100, 145.1362, false),
            // same spot, already collected
            stop(2, -37.9105, 145.1362, true),
            // ~1.1 km away
            stop(3, -37.9005, 145.1362, false),
        ];
        let hits = ProximityMonitor::default().check(DRIVER, &pickups);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].request_id, RequestId(1));
        assert!(hits[0].distance_m > 50.0 && hits[0].distance_m < 60.0);
    }

    #[test]
    fn nearest_ignores_visited() {
        let pickups = [
            stop(1, -37.9105, 145.1362, true),
            stop(2, -37.9005, 145.1362, false),
            stop(3, -37.9050, 145.1362, false),
        ];
        let (nearest, distance) = nearest_unvisited(DRIVER, &pickups).unwrap();
        assert_eq!(nearest.request_id, RequestId(3));
        assert!(distance < ARRIVAL_RADIUS_M);
    }

    #[test]
    fn nearest_of_all_visited_is_none() {
        assert!(nearest_unvisited(DRIVER, &[stop(1, 0.0, 0.0, true)]).is_none());
    }
}
