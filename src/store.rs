//! Transactional persistence seam and an in-memory arena store.
//!
//! Every read and write happens inside a transaction. A transaction that is
//! dropped without `commit` leaves no trace. Implementations must make
//! transactions serializable with respect to each other; the coordinator
//! relies on that for its read-count-transition sequences.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{PlannerError, Result};
use crate::model::{
    AccountId, Coordinates, NewRequest, Proposal, ProposalId, ProposalStatus, Request, RequestId,
    Ride, RideId, RideStatus,
};

/// Filter for the open-request pool. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    pub ids: Option<Vec<RequestId>>,
    /// Compensation ceiling; negative values are ignored.
    pub max_compensation: Option<f64>,
    pub passenger_id: Option<AccountId>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        if !request.is_open() {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.is_empty() && !ids.contains(&request.id) {
                return false;
            }
        }
        if let Some(ceiling) = self.max_compensation {
            if ceiling >= 0.0 && request.compensation > ceiling {
                return false;
            }
        }
        if let Some(passenger) = self.passenger_id {
            if request.passenger_id != passenger {
                return false;
            }
        }
        true
    }
}

pub trait RideStore: Send + Sync {
    type Tx<'a>: RideTx
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>>;
}

pub trait RideTx {
    fn insert_request(&mut self, new: NewRequest, now: DateTime<Utc>) -> Result<Request>;
    fn request(&self, id: RequestId) -> Result<Option<Request>>;
    fn update_request(&mut self, request: &Request) -> Result<()>;
    /// Requests with no ride link that match the filter, oldest first.
    fn open_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>>;
    /// Open requests no driver has been told about yet.
    fn unannounced_requests(&self) -> Result<Vec<Request>>;

    fn insert_ride(&mut self, destination: Coordinates, now: DateTime<Utc>) -> Result<Ride>;
    fn ride(&self, id: RideId) -> Result<Option<Ride>>;
    fn update_ride(&mut self, ride: &Ride) -> Result<()>;
    /// Rides holding a proposal for the request.
    fn rides_for_request(&self, id: RequestId) -> Result<Vec<Ride>>;
    fn rides_with_status(&self, status: RideStatus) -> Result<Vec<Ride>>;

    fn insert_proposal(
        &mut self,
        request_id: RequestId,
        ride_id: RideId,
        driver_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Proposal>;
    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>>;
    fn update_proposal(&mut self, proposal: &Proposal) -> Result<()>;
    fn proposals_for_ride(&self, id: RideId) -> Result<Vec<Proposal>>;
    fn proposals_for_request(&self, id: RequestId) -> Result<Vec<Proposal>>;

    fn driver_ids(&self) -> Result<Vec<AccountId>>;
    fn driver_position(&self, driver_id: AccountId) -> Result<Option<Coordinates>>;

    fn proximity_alert_sent(&self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<bool>;
    fn record_proximity_alert(&mut self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<()>;
    /// Forgets a recorded alert so the next scan sends it again.
    fn clear_proximity_alert(&mut self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<()>;

    fn commit(self) -> Result<()>;

    fn get_request(&self, id: RequestId) -> Result<Request> {
        self.request(id)?
            .ok_or_else(|| PlannerError::not_found("request", id.0))
    }

    fn get_ride(&self, id: RideId) -> Result<Ride> {
        self.ride(id)?.ok_or_else(|| PlannerError::not_found("ride", id.0))
    }

    fn get_proposal(&self, id: ProposalId) -> Result<Proposal> {
        self.proposal(id)?
            .ok_or_else(|| PlannerError::not_found("proposal", id.0))
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    requests: Vec<Request>,
    rides: Vec<Ride>,
    proposals: Vec<Proposal>,
    drivers: BTreeMap<AccountId, Option<Coordinates>>,
    proximity_alerts: HashSet<(RideId, AccountId, AccountId)>,
}

/// Position `id` in an arena whose ids start at 1.
fn slot(id: i64) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

/// Arena-backed store. Records live in vectors indexed by id; one mutex
/// serialises transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| PlannerError::Store("store lock poisoned".to_string()))
    }

    pub fn register_driver(&self, driver_id: AccountId) -> Result<()> {
        self.lock()?.drivers.entry(driver_id).or_insert(None);
        Ok(())
    }

    pub fn set_driver_position(&self, driver_id: AccountId, position: Coordinates) -> Result<()> {
        self.lock()?.drivers.insert(driver_id, Some(position));
        Ok(())
    }
}

impl RideStore for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>> {
        let guard = self.lock()?;
        let working = Tables::clone(&guard);
        Ok(MemoryTx { guard, working })
    }
}

/// Holds the store lock for its whole life and works on a private copy.
pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
}

impl MemoryTx<'_> {
    fn request_mut(&mut self, id: RequestId) -> Result<&mut Request> {
        slot(id.0)
            .and_then(|i| self.working.requests.get_mut(i))
            .ok_or_else(|| PlannerError::not_found("request", id.0))
    }

    fn ride_mut(&mut self, id: RideId) -> Result<&mut Ride> {
        slot(id.0)
            .and_then(|i| self.working.rides.get_mut(i))
            .ok_or_else(|| PlannerError::not_found("ride", id.0))
    }

    fn proposal_mut(&mut self, id: ProposalId) -> Result<&mut Proposal> {
        slot(id.0)
            .and_then(|i| self.working.proposals.get_mut(i))
            .ok_or_else(|| PlannerError::not_found("proposal", id.0))
    }
}

impl RideTx for MemoryTx<'_> {
    fn insert_request(&mut self, new: NewRequest, now: DateTime<Utc>) -> Result<Request> {
        let request = Request {
            id: RequestId(self.working.requests.len() as i64 + 1),
            pickup: new.pickup,
            dropoff: new.dropoff,
            compensation: new.compensation,
            passenger_id: new.passenger_id,
            ride_id: None,
            visited: false,
            notifications_created: false,
            created_at: now,
        };
        self.working.requests.push(request.clone());
        Ok(request)
    }

    fn request(&self, id: RequestId) -> Result<Option<Request>> {
        Ok(slot(id.0).and_then(|i| self.working.requests.get(i)).cloned())
    }

    fn update_request(&mut self, request: &Request) -> Result<()> {
        *self.request_mut(request.id)? = request.clone();
        Ok(())
    }

    fn open_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>> {
        Ok(self
            .working
            .requests
            .iter()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect())
    }

    fn unannounced_requests(&self) -> Result<Vec<Request>> {
        Ok(self
            .working
            .requests
            .iter()
            .filter(|request| request.is_open() && !request.notifications_created)
            .cloned()
            .collect())
    }

    fn insert_ride(&mut self, destination: Coordinates, now: DateTime<Utc>) -> Result<Ride> {
        let ride = Ride {
            id: RideId(self.working.rides.len() as i64 + 1),
            status: RideStatus::Pending,
            destination,
            created_at: now,
            updated_at: now,
        };
        self.working.rides.push(ride.clone());
        Ok(ride)
    }

    fn ride(&self, id: RideId) -> Result<Option<Ride>> {
        Ok(slot(id.0).and_then(|i| self.working.rides.get(i)).cloned())
    }

    fn update_ride(&mut self, ride: &Ride) -> Result<()> {
        *self.ride_mut(ride.id)? = ride.clone();
        Ok(())
    }

    fn rides_for_request(&self, id: RequestId) -> Result<Vec<Ride>> {
        let mut ride_ids: Vec<RideId> = self
            .working
            .proposals
            .iter()
            .filter(|proposal| proposal.request_id == id)
            .map(|proposal| proposal.ride_id)
            .collect();
        ride_ids.sort();
        ride_ids.dedup();

        ride_ids.into_iter().map(|ride_id| self.get_ride(ride_id)).collect()
    }

    fn rides_with_status(&self, status: RideStatus) -> Result<Vec<Ride>> {
        Ok(self
            .working
            .rides
            .iter()
            .filter(|ride| ride.status == status)
            .cloned()
            .collect())
    }

    fn insert_proposal(
        &mut self,
        request_id: RequestId,
        ride_id: RideId,
        driver_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        // Foreign keys.
        self.get_request(request_id)?;
        self.get_ride(ride_id)?;

        let proposal = Proposal {
            id: ProposalId(self.working.proposals.len() as i64 + 1),
            request_id,
            ride_id,
            driver_id,
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.working.proposals.push(proposal.clone());
        Ok(proposal)
    }

    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        Ok(slot(id.0).and_then(|i| self.working.proposals.get(i)).cloned())
    }

    fn update_proposal(&mut self, proposal: &Proposal) -> Result<()> {
        *self.proposal_mut(proposal.id)? = proposal.clone();
        Ok(())
    }

    fn proposals_for_ride(&self, id: RideId) -> Result<Vec<Proposal>> {
        Ok(self
            .working
            .proposals
            .iter()
            .filter(|proposal| proposal.ride_id == id)
            .cloned()
            .collect())
    }

    fn proposals_for_request(&self, id: RequestId) -> Result<Vec<Proposal>> {
        Ok(self
            .working
            .proposals
            .iter()
            .filter(|proposal| proposal.request_id == id)
            .cloned()
            .collect())
    }

    fn driver_ids(&self) -> Result<Vec<AccountId>> {
        Ok(self.working.drivers.keys().copied().collect())
    }

    fn driver_position(&self, driver_id: AccountId) -> Result<Option<Coordinates>> {
        Ok(self.working.drivers.get(&driver_id).copied().flatten())
    }

    fn proximity_alert_sent(&self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<bool> {
        Ok(self.working.proximity_alerts.contains(&(ride, driver, passenger)))
    }

    fn record_proximity_alert(&mut self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<()> {
        self.working.proximity_alerts.insert((ride, driver, passenger));
        Ok(())
    }

    fn clear_proximity_alert(&mut self, ride: RideId, driver: AccountId, passenger: AccountId) -> Result<()> {
        self.working.proximity_alerts.remove(&(ride, driver, passenger));
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Place;

    fn new_request(passenger: i64, compensation: f64) -> NewRequest {
        NewRequest {
            pickup: Place::new("pickup", Coordinates::new(-37.91, 145.13)),
            dropoff: Place::new("dropoff", Coordinates::new(-37.81, 144.96)),
            compensation,
            passenger_id: AccountId(passenger),
        }
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert_request(new_request(1, 10.0), Utc::now()).unwrap();
        }
        let tx = store.begin().unwrap();
        assert_eq!(tx.request(RequestId(1)).unwrap(), None);
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let request = tx.insert_request(new_request(1, 10.0), Utc::now()).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        assert_eq!(tx.get_request(request.id).unwrap(), request);
    }

    #[test]
    fn filter_combines_ceiling_and_passenger() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert_request(new_request(1, 10.0), Utc::now()).unwrap();
        tx.insert_request(new_request(1, 30.0), Utc::now()).unwrap();
        tx.insert_request(new_request(2, 5.0), Utc::now()).unwrap();

        let cheap = tx
            .open_requests(&RequestFilter {
                max_compensation: Some(15.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cheap.len(), 2);

        let mine = tx
            .open_requests(&RequestFilter {
                passenger_id: Some(AccountId(1)),
                max_compensation: Some(-1.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[test]
    fn proposal_requires_existing_request() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let ride = tx.insert_ride(Coordinates::new(0.0, 0.0), Utc::now()).unwrap();
        let err = tx
            .insert_proposal(RequestId(99), ride.id, AccountId(1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PlannerError::NotFound { entity: "request", id: 99 }));
    }

    #[test]
    fn cleared_alert_can_be_recorded_again() {
        let store = MemoryStore::new();
        let key = (RideId(1), AccountId(50), AccountId(1));

        let mut tx = store.begin().unwrap();
        tx.record_proximity_alert(key.0, key.1, key.2).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert!(tx.proximity_alert_sent(key.0, key.1, key.2).unwrap());
        tx.clear_proximity_alert(key.0, key.1, key.2).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        assert!(!tx.proximity_alert_sent(key.0, key.1, key.2).unwrap());
    }

    #[test]
    fn non_positive_ids_are_not_found() {
        let store = MemoryStore::new();
        let tx = store.begin().unwrap();
        assert_eq!(tx.ride(RideId(0)).unwrap(), None);
        assert_eq!(tx.ride(RideId(-3)).unwrap(), None);
    }
}
