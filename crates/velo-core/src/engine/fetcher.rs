//! Concurrent inventory fetch
//!
//! Builds one [`Snapshot`] from per-station inventory queries.
//!
//! ## Architecture
//!
//! ```text
//!  stations ──▶ task queue ──▶ worker 1 ─┐
//!                    │    ──▶ worker 2 ─┼──▶ results channel ──▶ merge ──▶ Snapshot
//!                    │    ──▶ worker N ─┘
//!                    (N = workers, each query retried per RetryPolicy)
//! ```
//!
//! The queue is filled up front and closed; a fixed set of workers drains it
//! and reports one result per station. Only the merging side touches the
//! snapshot, and every worker is joined before [`InventoryFetcher::fetch`]
//! returns. A station that keeps failing contributes no bike and is
//! reported as a [`StationFailure`]; it never aborts the fetch.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::model::{BikeRecord, Placement, Snapshot, Station, StationId};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_transient};
use crate::traits::{Credential, InventorySource};

/// A station whose inventory could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFailure {
    pub station: Station,
    /// Attempts made before giving up
    pub attempts: usize,
    /// Last error message
    pub error: String,
    /// The inventory endpoint refused the credential
    pub credential_rejected: bool,
}

/// Aggregated result of the fetch phase
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Bikes observed, keyed by bike id
    pub snapshot: Snapshot,
    /// Stations that reported a result (success or failure)
    pub processed: usize,
    /// Stations that contributed no data
    pub failures: Vec<StationFailure>,
    /// Bike rows dropped because they carried no bike id
    pub dropped_records: usize,
    /// Bike ids reported by more than one station (first one kept)
    pub duplicate_bikes: usize,
}

impl FetchOutcome {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Stations that refused the credential
    pub fn rejected_count(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.credential_rejected)
            .count()
    }
}

/// What one worker reports for one station
enum StationResult {
    Fetched {
        station: Station,
        bikes: Vec<BikeRecord>,
        observed_at: DateTime<Utc>,
    },
    Failed(StationFailure),
}

impl StationResult {
    fn station_id(&self) -> StationId {
        match self {
            StationResult::Fetched { station, .. } => station.id,
            StationResult::Failed(failure) => failure.station.id,
        }
    }
}

/// Bounded-concurrency, retrying inventory fetcher
pub struct InventoryFetcher {
    source: Arc<dyn InventorySource>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    workers: usize,
}

impl InventoryFetcher {
    /// Create a fetcher
    ///
    /// # Parameters
    ///
    /// - `source`: Per-station inventory query
    /// - `policy`: Retry policy applied to each station independently
    /// - `sleeper`: Waits between retries
    /// - `workers`: Maximum number of concurrent queries (at least 1)
    pub fn new(
        source: Arc<dyn InventorySource>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        workers: usize,
    ) -> Self {
        Self {
            source,
            policy,
            sleeper,
            workers: workers.max(1),
        }
    }

    /// Create a fetcher sleeping on the tokio timer
    pub fn with_tokio_sleeper(
        source: Arc<dyn InventorySource>,
        policy: RetryPolicy,
        workers: usize,
    ) -> Self {
        Self::new(source, policy, Arc::new(TokioSleeper), workers)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Query every station and merge the results into one snapshot.
    ///
    /// Never fails: per-station errors end up in [`FetchOutcome::failures`].
    pub async fn fetch(&self, stations: &[Station], credential: &Credential) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        if stations.is_empty() {
            return outcome;
        }

        let (task_tx, task_rx) = mpsc::channel::<Station>(stations.len());
        for station in stations {
            if task_tx.send(station.clone()).await.is_err() {
                break;
            }
        }
        drop(task_tx);

        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, result_rx) = mpsc::channel::<StationResult>(self.workers);

        let worker_count = self.workers.min(stations.len());
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            handles.push(tokio::spawn(Self::worker(
                worker_id,
                Arc::clone(&task_rx),
                result_tx.clone(),
                Arc::clone(&self.source),
                Arc::clone(&self.sleeper),
                self.policy,
                credential.clone(),
            )));
        }
        drop(result_tx);

        let mut reported = HashSet::with_capacity(stations.len());
        let mut results = ReceiverStream::new(result_rx);
        while let Some(result) = results.next().await {
            reported.insert(result.station_id());
            outcome.processed += 1;
            match result {
                StationResult::Fetched {
                    station,
                    bikes,
                    observed_at,
                } => Self::merge(&mut outcome, &station, bikes, observed_at),
                StationResult::Failed(failure) => {
                    warn!(
                        "Station {} ({}) failed after {} attempt(s): {}",
                        failure.station.id, failure.station.name, failure.attempts, failure.error
                    );
                    outcome.failures.push(failure);
                }
            }

            debug!(
                "Stations scanned: {}/{} (failed: {})",
                outcome.processed,
                stations.len(),
                outcome.failures.len()
            );
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Fetch worker aborted: {}", e);
            }
        }

        // A worker that died mid-station leaves that station unreported
        for station in stations {
            if !reported.contains(&station.id) {
                outcome.failures.push(StationFailure {
                    station: station.clone(),
                    attempts: 0,
                    error: "fetch worker aborted".to_string(),
                    credential_rejected: false,
                });
            }
        }

        outcome
    }

    async fn worker(
        worker_id: usize,
        tasks: Arc<Mutex<mpsc::Receiver<Station>>>,
        results: mpsc::Sender<StationResult>,
        source: Arc<dyn InventorySource>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        credential: Credential,
    ) {
        loop {
            let next = tasks.lock().await.recv().await;
            let Some(station) = next else {
                break;
            };

            let source_ref = source.as_ref();
            let credential_ref = &credential;
            let station_ref = &station;
            let attempt = retry_transient(&policy, sleeper.as_ref(), move |attempt| {
                if attempt > 1 {
                    debug!(
                        "Worker {}: station {} attempt {}",
                        worker_id, station_ref.id, attempt
                    );
                }
                source_ref.station_bikes(credential_ref, station_ref)
            })
            .await;

            let result = match attempt.result {
                Ok(bikes) => StationResult::Fetched {
                    station,
                    bikes,
                    observed_at: Utc::now(),
                },
                Err(e) => StationResult::Failed(StationFailure {
                    station,
                    attempts: attempt.attempts,
                    credential_rejected: matches!(e, Error::Authentication(_)),
                    error: e.to_string(),
                }),
            };

            if results.send(result).await.is_err() {
                warn!("Worker {}: result channel closed", worker_id);
                break;
            }
        }
    }

    fn merge(
        outcome: &mut FetchOutcome,
        station: &Station,
        bikes: Vec<BikeRecord>,
        observed_at: DateTime<Utc>,
    ) {
        for record in bikes {
            let Some(bike_id) = record.bike_id else {
                debug!("Station {}: dropping bike row without number", station.id);
                outcome.dropped_records += 1;
                continue;
            };

            let placement = Placement {
                bike_id,
                station_id: record.station_id.unwrap_or(station.id),
                station_name: station.name.clone(),
                observed_at,
            };

            let bike_id = placement.bike_id.clone();
            if !outcome.snapshot.insert(placement) {
                warn!(
                    "Bike {} reported by more than one station, keeping first placement",
                    bike_id
                );
                outcome.duplicate_bikes += 1;
            }
        }
    }
}
