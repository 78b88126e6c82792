//! Request, Proposal and Ride lifecycle.
//!
//! Each operation runs in one store transaction, so a Ride is created
//! together with all of its Proposals, and the Ride status recompute that
//! follows a confirmation observes and writes a consistent set of
//! Proposals. Notifications go out after commit and never fail the
//! operation.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::detour::{CandidateListing, DetourEvaluator, DetourLimits};
use crate::error::{PlannerError, Result};
use crate::model::{
    AccountId, Coordinates, Decision, NewRequest, Proposal, ProposalId, ProposalStatus, Request,
    RequestId, Ride, RideId, RideStatus, RideWithProposals,
};
use crate::notify::{Notification, RideEvent};
use crate::optimizer::{OptimizedRoute, WaypointOptimizer};
use crate::proximity::{ARRIVAL_RADIUS_M, accepted_pickups, nearest_unvisited};
use crate::store::{RequestFilter, RideStore, RideTx};
use crate::traits::{Clock, NotificationPublisher, RoutingProvider, SystemClock};

/// Result of a passenger's decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub proposal: Proposal,
    /// The ride after the recompute.
    pub ride: Ride,
}

/// Drives Requests, Rides and Proposals through their lifecycle against a
/// [`RideStore`], publishing notifications through `N`.
pub struct ProposalCoordinator<S, N> {
    store: Arc<S>,
    publisher: Arc<N>,
    clock: Arc<dyn Clock>,
    arrival_radius_m: f64,
}

impl<S: RideStore, N: NotificationPublisher> ProposalCoordinator<S, N> {
    /// Uses the system clock and the default arrival radius.
    pub fn new(store: Arc<S>, publisher: Arc<N>) -> Self {
        Self {
            store,
            publisher,
            clock: Arc::new(SystemClock),
            arrival_radius_m: ARRIVAL_RADIUS_M,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: &PlannerConfig) -> Self {
        self.arrival_radius_m = config.arrival_radius_m;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validates and stores a new open Request. Compensation must be
    /// positive, both places valid, and the dropoff labelled.
    pub fn create_request(&self, new: NewRequest) -> Result<Request> {
        if !new.compensation.is_finite() || new.compensation <= 0.0 {
            return Err(PlannerError::validation("compensation must be greater than zero"));
        }
        if !new.pickup.position.is_valid() || !new.dropoff.position.is_valid() {
            return Err(PlannerError::validation("pickup and dropoff must be valid coordinates"));
        }
        if new.dropoff.label.trim().is_empty() {
            return Err(PlannerError::validation("dropoff label is required"));
        }

        let mut tx = self.store.begin()?;
        let request = tx.insert_request(new, self.clock.now())?;
        tx.commit()?;

        info!(request_id = %request.id, passenger_id = %request.passenger_id, "ride request created");
        Ok(request)
    }

    /// Requests not yet attached to a Ride that match `filter`.
    pub fn open_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>> {
        self.store.begin()?.open_requests(filter)
    }

    /// Missing ids are [`PlannerError::NotFound`], as for the lookups below.
    pub fn request(&self, id: RequestId) -> Result<Request> {
        self.store.begin()?.get_request(id)
    }

    pub fn ride(&self, id: RideId) -> Result<Ride> {
        self.store.begin()?.get_ride(id)
    }

    pub fn proposal(&self, id: ProposalId) -> Result<Proposal> {
        self.store.begin()?.get_proposal(id)
    }

    /// A Ride together with every Proposal under it, read in one transaction.
    pub fn ride_with_proposals(&self, id: RideId) -> Result<RideWithProposals> {
        let tx = self.store.begin()?;
        Ok(RideWithProposals {
            ride: tx.get_ride(id)?,
            proposals: tx.proposals_for_ride(id)?,
        })
    }

    /// Creates a pending Ride with one pending Proposal per request.
    pub fn draft_ride(
        &self,
        request_ids: &[RequestId],
        driver_id: AccountId,
        destination: Coordinates,
    ) -> Result<RideWithProposals> {
        if request_ids.is_empty() {
            return Err(PlannerError::validation("at least one request is required"));
        }
        let mut seen = HashSet::with_capacity(request_ids.len());
        if let Some(duplicate) = request_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(PlannerError::validation(format!("request {} listed twice", duplicate)));
        }
        if !destination.is_valid() {
            return Err(PlannerError::validation("destination must be valid coordinates"));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin()?;

        let mut requests = Vec::with_capacity(request_ids.len());
        for &id in request_ids {
            let request = tx.get_request(id)?;
            if request.ride_id.is_some() {
                return Err(PlannerError::conflict(format!(
                    "request {} already belongs to a ride",
                    id
                )));
            }
            let blocked = tx
                .rides_for_request(id)?
                .iter()
                .any(|ride| matches!(ride.status, RideStatus::InProgress | RideStatus::Completed));
            if blocked {
                return Err(PlannerError::conflict(format!(
                    "a ride is already in progress or completed for request {}",
                    id
                )));
            }
            requests.push(request);
        }

        let ride = tx.insert_ride(destination, now)?;
        let mut proposals = Vec::with_capacity(requests.len());
        for request in &requests {
            proposals.push(tx.insert_proposal(request.id, ride.id, driver_id, now)?);
        }
        tx.commit()?;

        info!(ride_id = %ride.id, driver_id = %driver_id, proposals = proposals.len(), "ride drafted");

        for (request, proposal) in requests.iter().zip(&proposals) {
            self.notify(Notification::ride_update(
                request.passenger_id,
                format!(
                    "New ride proposal from driver {} for your request: {} to {}",
                    driver_id, request.pickup.label, request.dropoff.label
                ),
                RideEvent::RideCreated {
                    proposal_id: proposal.id,
                },
            ));
        }

        Ok(RideWithProposals { ride, proposals })
    }

    /// Records a passenger's decision and recomputes the Ride.
    ///
    /// Once no Proposal under the Ride is pending the Ride becomes
    /// `rejected` when none was accepted, otherwise `in_progress` with every
    /// accepted Request linked to it.
    pub fn confirm_proposal(&self, proposal_id: ProposalId, decision: Decision) -> Result<Confirmation> {
        let now = self.clock.now();
        let mut tx = self.store.begin()?;

        let mut proposal = tx.get_proposal(proposal_id)?;
        if proposal.status != ProposalStatus::Pending {
            return Err(PlannerError::state(format!(
                "proposal {} is {}, not pending",
                proposal.id, proposal.status
            )));
        }
        let mut ride = tx.get_ride(proposal.ride_id)?;
        if ride.status != RideStatus::Pending {
            return Err(PlannerError::state(format!(
                "ride {} is {}, proposals can no longer change",
                ride.id, ride.status
            )));
        }

        if decision == Decision::Accept {
            let request = tx.get_request(proposal.request_id)?;
            if request.ride_id.is_some() {
                return Err(PlannerError::conflict(format!(
                    "request {} already belongs to a ride",
                    request.id
                )));
            }
            let accepted_elsewhere = tx
                .proposals_for_request(request.id)?
                .iter()
                .any(|other| other.id != proposal.id && other.status == ProposalStatus::Accepted);
            if accepted_elsewhere {
                return Err(PlannerError::conflict(format!(
                    "request {} has already accepted another proposal",
                    request.id
                )));
            }
        }

        proposal.status = decision.outcome();
        proposal.updated_at = now;
        tx.update_proposal(&proposal)?;

        let siblings = tx.proposals_for_ride(ride.id)?;
        let pending = siblings
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .count();

        let mut accepted_passengers = Vec::new();
        if pending == 0 {
            let accepted: Vec<&Proposal> = siblings
                .iter()
                .filter(|p| p.status == ProposalStatus::Accepted)
                .collect();

            let next = if accepted.is_empty() {
                RideStatus::Rejected
            } else {
                RideStatus::InProgress
            };
            if !ride.status.can_transition_to(next) {
                return Err(PlannerError::state(format!(
                    "ride {} cannot move from {} to {}",
                    ride.id, ride.status, next
                )));
            }

            for accepted_proposal in accepted {
                let mut request = tx.get_request(accepted_proposal.request_id)?;
                request.ride_id = Some(ride.id);
                tx.update_request(&request)?;
                accepted_passengers.push(request.passenger_id);
            }

            ride.status = next;
            ride.updated_at = now;
            tx.update_ride(&ride)?;
        }

        tx.commit()?;

        debug!(
            proposal_id = %proposal.id,
            ride_id = %ride.id,
            decision = ?decision,
            pending,
            "proposal confirmed"
        );

        match ride.status {
            RideStatus::InProgress => {
                info!(ride_id = %ride.id, passengers = accepted_passengers.len(), "ride in progress");
                let event = RideEvent::RideFinalized { ride_id: ride.id };
                self.notify(Notification::ride_update(
                    proposal.driver_id,
                    "Your ride trip has been accepted!",
                    event.clone(),
                ));
                for passenger in accepted_passengers {
                    self.notify(Notification::ride_update(
                        passenger,
                        format!(
                            "Your ride has been confirmed! Driver {} will be picking you up.",
                            proposal.driver_id
                        ),
                        event.clone(),
                    ));
                }
            }
            RideStatus::Rejected => {
                info!(ride_id = %ride.id, "ride rejected by every passenger");
                self.notify(Notification::ride_update(
                    proposal.driver_id,
                    "Your planned ride has been rejected.",
                    RideEvent::RideFinalized { ride_id: ride.id },
                ));
            }
            RideStatus::Pending | RideStatus::Completed => {}
        }

        Ok(Confirmation { proposal, ride })
    }

    /// Moves an in-progress Ride to completed. Any other status is a state error.
    pub fn complete_ride(&self, ride_id: RideId) -> Result<Ride> {
        let mut tx = self.store.begin()?;
        let mut ride = tx.get_ride(ride_id)?;
        if ride.status != RideStatus::InProgress {
            return Err(PlannerError::state(format!(
                "ride {} is {}, not in_progress",
                ride.id, ride.status
            )));
        }

        ride.status = RideStatus::Completed;
        ride.updated_at = self.clock.now();
        tx.update_ride(&ride)?;
        let passengers: Vec<AccountId> = accepted_pickups(&tx, ride.id)?
            .into_iter()
            .map(|pickup| pickup.passenger_id)
            .collect();
        tx.commit()?;

        info!(ride_id = %ride.id, "ride completed");
        for passenger in passengers {
            self.notify(Notification::ride_update(
                passenger,
                "Your ride has been completed! We hope you had a great experience.",
                RideEvent::RideCompleted { ride_id: ride.id },
            ));
        }

        Ok(ride)
    }

    /// Marks the accepted, unvisited pickup nearest the driver as visited.
    pub fn mark_request_visited(&self, ride_id: RideId, driver: Coordinates) -> Result<Request> {
        if !driver.is_valid() {
            return Err(PlannerError::validation("driver position must be valid coordinates"));
        }

        let mut tx = self.store.begin()?;
        let ride = tx.get_ride(ride_id)?;
        if ride.status != RideStatus::InProgress {
            return Err(PlannerError::state(format!(
                "ride {} is {}, not in_progress",
                ride.id, ride.status
            )));
        }

        let pickups = accepted_pickups(&tx, ride.id)?;
        let Some((nearest, distance_m)) = nearest_unvisited(driver, &pickups) else {
            return Err(PlannerError::validation(format!(
                "no unvisited requests for ride {}",
                ride.id
            )));
        };
        if distance_m > self.arrival_radius_m {
            return Err(PlannerError::conflict(format!(
                "too far from the nearest pickup location ({:.2} meters)",
                distance_m
            )));
        }

        let mut request = tx.get_request(nearest.request_id)?;
        request.visited = true;
        tx.update_request(&request)?;
        tx.commit()?;

        info!(ride_id = %ride.id, request_id = %request.id, distance_m, "pickup visited");
        Ok(request)
    }

    /// Route for an in-progress Ride from the driver through every pickup
    /// still to collect, in the best order, to the Ride destination.
    pub fn live_route<P: RoutingProvider>(
        &self,
        ride_id: RideId,
        driver: Coordinates,
        optimizer: &WaypointOptimizer<'_, P>,
    ) -> Result<OptimizedRoute> {
        let (destination, waypoints) = {
            let tx = self.store.begin()?;
            let ride = tx.get_ride(ride_id)?;
            if ride.status != RideStatus::InProgress {
                return Err(PlannerError::state(format!(
                    "ride {} is {}, not in_progress",
                    ride.id, ride.status
                )));
            }
            let waypoints: Vec<Coordinates> = accepted_pickups(&tx, ride.id)?
                .into_iter()
                .filter(|pickup| !pickup.visited)
                .map(|pickup| pickup.position)
                .collect();
            (ride.destination, waypoints)
        };

        optimizer.best_order(driver, &waypoints, destination)
    }

    /// Preview shown to a passenger: the driver's route through every
    /// pickup not yet rejected, ending at this proposal's dropoff.
    pub fn proposal_route<P: RoutingProvider>(
        &self,
        proposal_id: ProposalId,
        driver: Coordinates,
        optimizer: &WaypointOptimizer<'_, P>,
    ) -> Result<OptimizedRoute> {
        let (dropoff, waypoints) = {
            let tx = self.store.begin()?;
            let proposal = tx.get_proposal(proposal_id)?;
            let request = tx.get_request(proposal.request_id)?;
            let mut waypoints = Vec::new();
            for sibling in tx.proposals_for_ride(proposal.ride_id)? {
                if sibling.status == ProposalStatus::Rejected {
                    continue;
                }
                waypoints.push(tx.get_request(sibling.request_id)?.pickup.position);
            }
            (request.dropoff.position, waypoints)
        };

        optimizer.best_order(driver, &waypoints, dropoff)
    }

    /// Open requests a driver could pick up within the given detour limits.
    pub fn candidates_for_driver<P: RoutingProvider>(
        &self,
        driver: Coordinates,
        destination: Coordinates,
        filter: &RequestFilter,
        limits: DetourLimits,
        evaluator: &DetourEvaluator<'_, P>,
    ) -> Result<CandidateListing> {
        if !driver.is_valid() || !destination.is_valid() {
            return Err(PlannerError::validation("driver position and destination must be valid"));
        }
        let requests = self.open_requests(filter)?;
        evaluator.rank_candidates(driver, destination, requests, limits)
    }

    fn notify(&self, notification: Notification) {
        let account_id = notification.account_id;
        if let Err(error) = self.publisher.publish(notification) {
            warn!(account_id = %account_id, %error, "failed to publish notification");
        }
    }
}
