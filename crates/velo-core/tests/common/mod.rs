//! Test doubles and common utilities for poll contract tests
//!
//! The doubles are scriptable between polls so a test can walk a bike
//! through disappear/reappear cycles without any network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use chrono::{DateTime, TimeZone, Utc};
use velo_core::config::PollConfig;
use velo_core::engine::{InventoryFetcher, PollEvent, PollReport, Poller};
use velo_core::error::{Error, Result};
use velo_core::model::{BikeRecord, Station, StationId};
use velo_core::retry::{RetryPolicy, Sleeper};
use velo_core::traits::{
    Credential, CredentialProvider, InventorySource, Publisher, StateStore, StationDirectory,
    TripSink,
};

/// Fixed start of every test timeline
pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// Directory returning a fixed list, or failing when told to
#[derive(Clone, Default)]
pub struct ScriptedDirectory {
    stations: Arc<Mutex<Vec<Station>>>,
    fail: Arc<Mutex<bool>>,
}

impl ScriptedDirectory {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: Arc::new(Mutex::new(stations)),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn set_stations(&self, stations: Vec<Station>) {
        *self.stations.lock().unwrap() = stations;
    }
}

#[async_trait]
impl StationDirectory for ScriptedDirectory {
    async fn stations(&self) -> Result<Vec<Station>> {
        if *self.fail.lock().unwrap() {
            return Err(Error::directory("directory returned HTTP 503"));
        }
        Ok(self.stations.lock().unwrap().clone())
    }

    fn directory_name(&self) -> &'static str {
        "scripted"
    }
}

/// Credential provider returning a token, or failing when told to
#[derive(Clone, Default)]
pub struct ScriptedCredentials {
    fail: Arc<Mutex<bool>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentials {
    async fn credential(&self) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(Error::credential("login helper exited with status 1"));
        }
        Ok(Credential::new("Taknv1 test-token"))
    }
}

/// How a scripted station answers
#[derive(Clone, Debug)]
pub enum StationScript {
    Bikes(Vec<BikeRecord>),
    /// Always fails with a transient error
    Transient,
    /// Always fails with a permanent HTTP status
    Permanent(u16),
    /// Always refuses the credential
    Rejected,
}

/// Inventory source whose answers can be rewritten between polls
#[derive(Clone, Default)]
pub struct ScriptedInventory {
    scripts: Arc<Mutex<HashMap<StationId, StationScript>>>,
    calls: Arc<Mutex<HashMap<StationId, usize>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every query for `delay` so concurrency can be observed
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Set the bikes docked at `station`, replacing the previous script
    pub fn dock(&self, station: u32, bikes: &[&str]) {
        let records = bikes
            .iter()
            .map(|bike| BikeRecord::new(*bike, StationId(station)))
            .collect();
        self.script(station, StationScript::Bikes(records));
    }

    pub fn script(&self, station: u32, script: StationScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(StationId(station), script);
    }

    pub fn calls(&self, station: u32) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&StationId(station))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventorySource for ScriptedInventory {
    async fn station_bikes(
        &self,
        credential: &Credential,
        station: &Station,
    ) -> Result<Vec<BikeRecord>> {
        assert!(!credential.is_empty());
        *self.calls.lock().unwrap().entry(station.id).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.scripts.lock().unwrap().get(&station.id).cloned();
        match script {
            Some(StationScript::Bikes(bikes)) => Ok(bikes),
            Some(StationScript::Transient) => Err(Error::timeout("request timed out after 15s")),
            Some(StationScript::Permanent(status)) => {
                Err(Error::http_status(status, "rejected"))
            }
            Some(StationScript::Rejected) => {
                Err(Error::auth("station query rejected the credential (401 Unauthorized)"))
            }
            None => Ok(Vec::new()),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Sleeper that returns immediately and records requested delays
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Trip sink that always fails
#[derive(Clone, Default)]
pub struct FailingTripSink;

#[async_trait]
impl TripSink for FailingTripSink {
    async fn append(&self, _trips: &[velo_core::model::TripRecord]) -> Result<()> {
        Err(Error::trip_sink("disk full"))
    }
}

/// Publisher counting calls, optionally failing
#[derive(Clone, Default)]
pub struct CountingPublisher {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl CountingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for CountingPublisher {
    async fn publish(&self, _report: &PollReport) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::publisher("git push rejected"));
        }
        Ok(())
    }
}

/// Collaborators of a test poller, with handles kept by the test
pub struct Harness {
    pub directory: ScriptedDirectory,
    pub credentials: ScriptedCredentials,
    pub inventory: ScriptedInventory,
    pub sleeper: RecordingSleeper,
    pub publisher: CountingPublisher,
    pub policy: RetryPolicy,
    pub workers: usize,
}

impl Harness {
    /// Harness over stations `1..=count`, named "Station <n>"
    pub fn with_stations(count: u32) -> Self {
        let stations = (1..=count)
            .map(|n| Station::new(StationId(n), format!("Station {}", n)))
            .collect();
        Self {
            directory: ScriptedDirectory::new(stations),
            credentials: ScriptedCredentials::new(),
            inventory: ScriptedInventory::new(),
            sleeper: RecordingSleeper::new(),
            publisher: CountingPublisher::new(),
            policy: RetryPolicy::new(3, Duration::from_secs(1)),
            workers: 10,
        }
    }

    pub fn fetcher(&self) -> InventoryFetcher {
        InventoryFetcher::new(
            Arc::new(self.inventory.clone()),
            self.policy,
            Arc::new(self.sleeper.clone()),
            self.workers,
        )
    }

    /// Build a poller over the given store and sink
    pub fn poller(
        &self,
        state_store: Box<dyn StateStore>,
        trip_sink: Box<dyn TripSink>,
    ) -> (Poller, mpsc::Receiver<PollEvent>) {
        Poller::new(
            Box::new(self.directory.clone()),
            Box::new(self.credentials.clone()),
            self.fetcher(),
            state_store,
            trip_sink,
            Box::new(self.publisher.clone()),
            &PollConfig::default(),
        )
        .expect("valid poll config")
    }
}

/// Drain every event currently queued
pub fn drain(events: &mut mpsc::Receiver<PollEvent>) -> Vec<PollEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
