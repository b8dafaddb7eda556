//! Poll orchestration
//!
//! The Poller is responsible for:
//! - Resolving the station list and the credential for each poll
//! - Running the concurrent fetch into one snapshot
//! - Running trip detection against the persisted states
//! - Writing trips, then persisting the new states
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌────────────────────┐
//! │ StationDirectory │   │ CredentialProvider │
//! └──────────────────┘   └────────────────────┘
//!          │ stations              │ credential
//!          └───────────┬───────────┘
//!                      ▼
//!             ┌──────────────────┐        ┌─────────────┐
//!             │ InventoryFetcher │        │ StateStore  │
//!             └──────────────────┘        │ (load)      │
//!                      │ snapshot         └─────────────┘
//!                      ▼                         │ previous
//!             ┌──────────────────┐◀──────────────┘
//!             │     detect()     │
//!             └──────────────────┘
//!                      │
//!         ┌────────────┼──────────────┬──────────────┐
//!         ▼            ▼              ▼              ▼
//!   ┌──────────┐ ┌────────────┐ ┌───────────┐ ┌──────────┐
//!   │ TripSink │ │ StateStore │ │ Publisher │ │  Events  │
//!   │ (append) │ │ (save)     │ │           │ │ (notify) │
//!   └──────────┘ └────────────┘ └───────────┘ └──────────┘
//! ```
//!
//! ## Failure policy
//!
//! 1. Directory error, empty directory or credential error abort the poll
//!    before any state is loaded. A credential refused by the inventory
//!    endpoint aborts the poll after the fetch, before detection.
//! 2. Per-station failures are absorbed by the fetcher and only counted.
//! 3. Trips are appended before states are saved: a failed append aborts
//!    the poll with the previous states intact, so the same trips are
//!    detected again on the next poll.
//! 4. Publishing is best-effort and never fails a poll.

pub mod detector;
pub mod fetcher;

pub use detector::{Detection, detect, duration_minutes};
pub use fetcher::{FetchOutcome, InventoryFetcher, StationFailure};

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::model::{BikeStatus, StationId, TripRecord};
use crate::traits::{CredentialProvider, Publisher, StateStore, StationDirectory, TripSink};

/// Events emitted by the Poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A poll started
    PollStarted { scan_time: DateTime<Utc> },

    /// A station contributed no data to the current poll
    StationFailed {
        station_id: StationId,
        station_name: String,
        error: String,
        attempts: usize,
    },

    /// A trip was inferred and written
    TripCompleted { trip: TripRecord },

    /// A poll finished and its states were saved
    PollCompleted {
        scan_time: DateTime<Utc>,
        stations_total: usize,
        stations_failed: usize,
        bikes_seen: usize,
        trips: usize,
    },

    /// A poll stopped before saving any state
    PollAborted {
        scan_time: DateTime<Utc>,
        reason: String,
    },

    /// The poll loop stopped
    Stopped { reason: String },
}

/// Summary of one completed poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub scan_time: DateTime<Utc>,
    /// Stations listed by the directory
    pub stations_total: usize,
    /// Stations that contributed no data
    pub stations_failed: usize,
    /// Distinct bikes docked during this poll
    pub bikes_seen: usize,
    /// Bike rows dropped for lack of a bike id
    pub dropped_records: usize,
    /// Bike ids reported by more than one station
    pub duplicate_bikes: usize,
    /// Bikes tracked after this poll
    pub states_total: usize,
    /// Tracked bikes currently considered rented
    pub rented: usize,
    /// Trips completed by this poll
    pub trips: Vec<TripRecord>,
}

/// Poll orchestrator
///
/// Owns every collaborator of a poll and runs them in a fixed order.
/// Nothing is kept in memory between polls: the previous states always come
/// from the [`StateStore`].
///
/// ## Lifecycle
///
/// 1. Create with [`Poller::new()`]
/// 2. Either call [`Poller::poll_once()`] yourself, or
/// 3. Start the periodic loop with [`Poller::run()`]
pub struct Poller {
    /// Station list source
    directory: Box<dyn StationDirectory>,

    /// Credential source, asked once per poll
    credentials: Box<dyn CredentialProvider>,

    /// Concurrent per-station fetch
    fetcher: InventoryFetcher,

    /// Persisted bike states
    state_store: Box<dyn StateStore>,

    /// Trip output
    trip_sink: Box<dyn TripSink>,

    /// Artifact publication after trips were written
    publisher: Box<dyn Publisher>,

    /// Interval between polls in the periodic loop
    interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<PollEvent>,
}

impl Poller {
    /// Create a new poller
    ///
    /// # Returns
    ///
    /// A tuple of (poller, event_receiver) where event_receiver yields poll events
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Box<dyn StationDirectory>,
        credentials: Box<dyn CredentialProvider>,
        fetcher: InventoryFetcher,
        state_store: Box<dyn StateStore>,
        trip_sink: Box<dyn TripSink>,
        publisher: Box<dyn Publisher>,
        config: &PollConfig,
    ) -> Result<(Self, mpsc::Receiver<PollEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let poller = Self {
            directory,
            credentials,
            fetcher,
            state_store,
            trip_sink,
            publisher,
            interval: config.interval(),
            event_tx: tx,
        };

        Ok((poller, rx))
    }

    /// Run one complete poll stamped with `scan_time`.
    ///
    /// # Returns
    ///
    /// - `Ok(report)`: States were saved (station failures may be nonzero)
    /// - `Err(Error)`: The poll was abandoned; see the module docs for what
    ///   was persisted
    pub async fn poll_once(&self, scan_time: DateTime<Utc>) -> Result<PollReport> {
        self.emit_event(PollEvent::PollStarted { scan_time });
        info!("Starting poll at {}", scan_time.to_rfc3339());

        let stations = match self.directory.stations().await {
            Ok(stations) if stations.is_empty() => {
                return Err(self.abort(scan_time, Error::NoStations));
            }
            Ok(stations) => stations,
            Err(e) => return Err(self.abort(scan_time, e)),
        };
        info!(
            "Directory {} listed {} stations",
            self.directory.directory_name(),
            stations.len()
        );

        let credential = match self.credentials.credential().await {
            Ok(credential) if credential.is_empty() => {
                return Err(self.abort(scan_time, Error::credential("empty credential")));
            }
            Ok(credential) => credential,
            Err(e) => return Err(self.abort(scan_time, e)),
        };

        let previous = match self.state_store.load().await {
            Ok(states) => states,
            Err(e) => return Err(self.abort(scan_time, e)),
        };
        debug!("Loaded {} bike states", previous.len());

        let outcome = self.fetcher.fetch(&stations, &credential).await;
        for failure in &outcome.failures {
            self.emit_event(PollEvent::StationFailed {
                station_id: failure.station.id,
                station_name: failure.station.name.clone(),
                error: failure.error.clone(),
                attempts: failure.attempts,
            });
        }
        // A refused credential is fatal even when only some stations report it
        let rejected = outcome.rejected_count();
        if rejected > 0 {
            return Err(self.abort(
                scan_time,
                Error::auth(format!(
                    "inventory endpoint refused the credential at {} of {} stations",
                    rejected,
                    stations.len()
                )),
            ));
        }

        if outcome.failed_count() == stations.len() {
            warn!(
                "Every station failed; all {} tracked docked bikes will be marked rented",
                previous
                    .values()
                    .filter(|state| state.status() == BikeStatus::Available)
                    .count()
            );
        }
        info!(
            "Fetched {} bikes from {}/{} stations ({} failed)",
            outcome.snapshot.len(),
            outcome.processed.saturating_sub(outcome.failed_count()),
            stations.len(),
            outcome.failed_count()
        );

        let detection = detect(&outcome.snapshot, &previous, scan_time);

        if !detection.trips.is_empty() {
            if let Err(e) = self.trip_sink.append(&detection.trips).await {
                return Err(self.abort(scan_time, e));
            }
            for trip in &detection.trips {
                self.emit_event(PollEvent::TripCompleted { trip: trip.clone() });
            }
        }

        if let Err(e) = self.state_store.save(&detection.states).await {
            return Err(self.abort(scan_time, e));
        }

        let report = PollReport {
            scan_time,
            stations_total: stations.len(),
            stations_failed: outcome.failed_count(),
            bikes_seen: outcome.snapshot.len(),
            dropped_records: outcome.dropped_records,
            duplicate_bikes: outcome.duplicate_bikes,
            states_total: detection.states.len(),
            rented: detection
                .states
                .values()
                .filter(|state| state.status() == BikeStatus::Rented)
                .count(),
            trips: detection.trips,
        };

        if !report.trips.is_empty() {
            if let Err(e) = self.publisher.publish(&report).await {
                warn!("Failed to publish trips: {}", e);
            }
        }

        info!(
            "Poll complete: {} trips, {} bikes tracked ({} rented), {} station(s) failed",
            report.trips.len(),
            report.states_total,
            report.rented,
            report.stations_failed
        );
        self.emit_event(PollEvent::PollCompleted {
            scan_time,
            stations_total: report.stations_total,
            stations_failed: report.stations_failed,
            bikes_seen: report.bikes_seen,
            trips: report.trips.len(),
        });

        Ok(report)
    }

    /// Run the periodic poll loop until SIGINT/SIGTERM
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the periodic poll loop until `shutdown_rx` fires
    ///
    /// Used by tests and embedders that manage shutdown themselves.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        info!("Polling every {}s", self.interval.as_secs());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => wait_for_signal().await,
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(Utc::now()).await {
                        // Already reported by abort(); keep polling
                        debug!("Poll failed: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(PollEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        Ok(())
    }

    fn abort(&self, scan_time: DateTime<Utc>, error: Error) -> Error {
        error!("Poll aborted: {}", error);
        self.emit_event(PollEvent::PollAborted {
            scan_time,
            reason: error.to_string(),
        });
        error
    }

    fn emit_event(&self, event: PollEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
