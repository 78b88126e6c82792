//! Periodic background jobs.
//!
//! Each job gets a ticker thread. A tick hands the run to the rayon pool
//! unless the previous run of the same job still holds its single-flight
//! guard, in which case the tick is dropped.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::notify::{Notification, RideEvent};
use crate::proximity::ProximityMonitor;
use crate::store::{RideStore, RideTx};
use crate::traits::NotificationPublisher;

/// Allows at most one holder at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

/// Releases the flight when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `None` while another guard is alive.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flight: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One pass. Returns how many items were handled.
    fn run(&self) -> Result<usize>;
}

/// Runs `job` under `flight`, or returns `None` if a run is already active.
pub fn run_guarded<J: Job + ?Sized>(flight: &Arc<SingleFlight>, job: &J) -> Option<Result<usize>> {
    let Some(_guard) = flight.try_acquire() else {
        warn!(job = job.name(), "previous run still active, skipping");
        return None;
    };
    Some(job.run())
}

fn log_outcome(name: &'static str, outcome: Result<usize>) {
    match outcome {
        Ok(0) => debug!(job = name, "nothing to do"),
        Ok(handled) => info!(job = name, handled, "job run finished"),
        Err(err) => error!(job = name, error = %err, "job run failed"),
    }
}

/// Publishes every unannounced open request to every known driver.
///
/// Requests are flagged as announced and committed before publishing, so
/// the store is not locked while the publisher runs. A request that no
/// driver received is unflagged again and retried next time, as is every
/// request while no driver is registered.
pub fn announce_new_requests<S, N>(store: &S, publisher: &N) -> Result<usize>
where
    S: RideStore,
    N: NotificationPublisher,
{
    let (requests, drivers) = {
        let mut tx = store.begin()?;
        let requests = tx.unannounced_requests()?;
        if requests.is_empty() {
            return Ok(0);
        }
        let drivers = tx.driver_ids()?;
        if drivers.is_empty() {
            debug!(requests = requests.len(), "no drivers to announce to");
            return Ok(0);
        }
        for request in &requests {
            let mut claimed = request.clone();
            claimed.notifications_created = true;
            tx.update_request(&claimed)?;
        }
        tx.commit()?;
        (requests, drivers)
    };
    debug!(requests = requests.len(), drivers = drivers.len(), "announcing new requests");

    let mut announced = 0;
    let mut undelivered = Vec::new();
    for request in &requests {
        let message = format!(
            "New ride request: {} to {} (Compensation: ${:.2})",
            request.pickup.label, request.dropoff.label, request.compensation
        );

        let mut delivered = 0;
        for &driver_id in &drivers {
            let notification =
                Notification::ride_update(driver_id, message.clone(), RideEvent::RequestCreated);
            match publisher.publish(notification) {
                Ok(_) => delivered += 1,
                Err(err) => {
                    warn!(request_id = %request.id, driver_id = %driver_id, error = %err, "failed to announce request");
                }
            }
        }

        if delivered > 0 {
            announced += 1;
        } else {
            undelivered.push(request.id);
        }
    }

    if !undelivered.is_empty() {
        let mut tx = store.begin()?;
        for id in undelivered {
            let Some(mut request) = tx.request(id)? else {
                continue;
            };
            request.notifications_created = false;
            tx.update_request(&request)?;
        }
        tx.commit()?;
    }

    Ok(announced)
}

pub struct AnnounceJob<S, N> {
    store: Arc<S>,
    publisher: Arc<N>,
}

impl<S, N> AnnounceJob<S, N> {
    pub fn new(store: Arc<S>, publisher: Arc<N>) -> Self {
        Self { store, publisher }
    }
}

impl<S, N> Job for AnnounceJob<S, N>
where
    S: RideStore + 'static,
    N: NotificationPublisher + 'static,
{
    fn name(&self) -> &'static str {
        "announce_new_requests"
    }

    fn run(&self) -> Result<usize> {
        announce_new_requests(self.store.as_ref(), self.publisher.as_ref())
    }
}

pub struct ProximityJob<S, N> {
    monitor: ProximityMonitor,
    store: Arc<S>,
    publisher: Arc<N>,
}

impl<S, N> ProximityJob<S, N> {
    pub fn new(monitor: ProximityMonitor, store: Arc<S>, publisher: Arc<N>) -> Self {
        Self {
            monitor,
            store,
            publisher,
        }
    }
}

impl<S, N> Job for ProximityJob<S, N>
where
    S: RideStore + 'static,
    N: NotificationPublisher + 'static,
{
    fn name(&self) -> &'static str {
        "proximity_scan"
    }

    fn run(&self) -> Result<usize> {
        self.monitor.scan(self.store.as_ref(), self.publisher.as_ref())
    }
}

/// Owns the ticker threads. Dropping it stops the tickers without waiting.
#[derive(Default)]
pub struct Scheduler {
    stops: Vec<Sender<()>>,
    tickers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the announcement and proximity jobs at their configured intervals.
    pub fn start<S, N>(config: &PlannerConfig, store: Arc<S>, publisher: Arc<N>) -> io::Result<Self>
    where
        S: RideStore + 'static,
        N: NotificationPublisher + 'static,
    {
        let mut scheduler = Self::new();
        scheduler.every(
            config.scheduler.announce_interval(),
            AnnounceJob::new(Arc::clone(&store), Arc::clone(&publisher)),
        )?;
        scheduler.every(
            config.scheduler.proximity_interval(),
            ProximityJob::new(
                ProximityMonitor::new(config.proximity_radius_m),
                store,
                publisher,
            ),
        )?;
        Ok(scheduler)
    }

    pub fn every<J: Job>(&mut self, interval: Duration, job: J) -> io::Result<()> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let name = job.name();
        let job = Arc::new(job);
        let flight = SingleFlight::new();

        let ticker = thread::Builder::new()
            .name(format!("tick-{}", name))
            .spawn(move || {
                info!(job = name, interval_ms = interval.as_millis() as u64, "job scheduled");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let Some(guard) = flight.try_acquire() else {
                        warn!(job = name, "previous run still active, skipping tick");
                        continue;
                    };
                    let job = Arc::clone(&job);
                    rayon::spawn(move || {
                        let _guard = guard;
                        log_outcome(name, job.run());
                    });
                }
                debug!(job = name, "ticker stopped");
            })?;

        self.stops.push(stop_tx);
        self.tickers.push(ticker);
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.tickers.len()
    }

    /// Stops every ticker and waits for the threads to exit. Runs already
    /// handed to the pool finish on their own.
    pub fn shutdown(mut self) {
        for stop in self.stops.drain(..) {
            let _ = stop.send(());
        }
        for ticker in self.tickers.drain(..) {
            if ticker.join().is_err() {
                error!("scheduler ticker panicked");
            }
        }
    }
}
