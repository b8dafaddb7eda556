//! Contract Test: Fatal Poll Failures Leave State Untouched
//!
//! Constraints verified:
//! - Directory failure, empty directory and credential failure abort the poll
//! - A credential refused by the inventory endpoint aborts the poll instead
//!   of marking every bike rented
//! - An aborted poll neither saves states nor writes trips
//! - A failed trip append aborts before states are saved, so the trip is
//!   detected again by the next poll
//! - Publisher failures are logged and never fail the poll
//! - The poller keeps working after an aborted poll

mod common;

use common::*;
use velo_core::engine::PollEvent;
use velo_core::error::Error;
use velo_core::model::{BikeState, BikeStates, StationId};
use velo_core::sink::MemoryTripSink;
use velo_core::state::MemoryStateStore;

fn rented_store() -> MemoryStateStore {
    let mut states = BikeStates::new();
    states.insert("100".into(), BikeState::rented(StationId(1), "Station 1", t(0)));
    states.insert("200".into(), BikeState::available(StationId(1), "Station 1", t(0)));
    MemoryStateStore::with_states(states)
}

#[tokio::test]
async fn directory_failure_aborts_without_saving() {
    let harness = Harness::with_stations(1);
    harness.directory.set_failing(true);

    let store = rented_store();
    let before = store.snapshot();
    let sink = MemoryTripSink::new();
    let (poller, mut events) = harness.poller(Box::new(store.clone()), Box::new(sink.clone()));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::Directory(_))));

    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), before);
    assert!(sink.is_empty());
    // Credential never requested once the directory failed
    assert_eq!(harness.credentials.calls(), 0);
    assert_eq!(harness.inventory.calls(1), 0);

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(PollEvent::PollAborted { .. })));
}

#[tokio::test]
async fn empty_directory_aborts() {
    let harness = Harness::with_stations(0);
    let store = rented_store();
    let (poller, _events) =
        harness.poller(Box::new(store.clone()), Box::new(MemoryTripSink::new()));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::NoStations)));
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn credential_failure_aborts_without_saving() {
    let harness = Harness::with_stations(1);
    harness.credentials.set_failing(true);
    harness.inventory.dock(1, &["100"]);

    let store = rented_store();
    let sink = MemoryTripSink::new();
    let (poller, _events) = harness.poller(Box::new(store.clone()), Box::new(sink.clone()));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::Credential(_))));
    assert_eq!(store.save_count(), 0);
    assert!(sink.is_empty());
    assert_eq!(harness.inventory.calls(1), 0);
}

#[tokio::test]
async fn rejected_credential_aborts_without_saving() {
    let harness = Harness::with_stations(3);
    for station in 1..=3 {
        harness.inventory.script(station, StationScript::Rejected);
    }

    let mut states = BikeStates::new();
    states.insert("100".into(), BikeState::available(StationId(1), "Station 1", t(0)));
    states.insert("200".into(), BikeState::available(StationId(2), "Station 2", t(0)));
    let store = MemoryStateStore::with_states(states);
    let before = store.snapshot();
    let sink = MemoryTripSink::new();
    let (poller, mut events) = harness.poller(Box::new(store.clone()), Box::new(sink.clone()));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::Authentication(_))));

    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), before);
    assert!(sink.is_empty());
    // Not retried
    for station in 1..=3 {
        assert_eq!(harness.inventory.calls(station), 1);
    }

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(PollEvent::PollAborted { .. })));
}

#[tokio::test]
async fn single_rejected_station_aborts() {
    let harness = Harness::with_stations(2);
    harness.inventory.dock(1, &["100", "200"]);
    harness.inventory.script(2, StationScript::Rejected);

    let store = rented_store();
    let before = store.snapshot();
    let (poller, _events) =
        harness.poller(Box::new(store.clone()), Box::new(MemoryTripSink::new()));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn sink_failure_keeps_previous_states() {
    let harness = Harness::with_stations(1);
    harness.inventory.dock(1, &["100", "200"]);

    let store = rented_store();
    let before = store.snapshot();
    let (poller, _events) = harness.poller(Box::new(store.clone()), Box::new(FailingTripSink));

    let result = poller.poll_once(t(5)).await;
    assert!(matches!(result, Err(Error::TripSink(_))));
    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), before);

    // A working sink picks the same trip up on the next poll
    let sink = MemoryTripSink::new();
    let (poller, _events) = harness.poller(Box::new(store.clone()), Box::new(sink.clone()));
    let report = poller.poll_once(t(6)).await.unwrap();

    assert_eq!(report.trips.len(), 1);
    assert_eq!(report.trips[0].start_time, t(0));
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn publisher_failure_does_not_fail_poll() {
    let mut harness = Harness::with_stations(1);
    harness.publisher = CountingPublisher::failing();
    harness.inventory.dock(1, &["100"]);

    let store = rented_store();
    let (poller, _events) =
        harness.poller(Box::new(store.clone()), Box::new(MemoryTripSink::new()));

    let report = poller.poll_once(t(5)).await.unwrap();
    assert_eq!(report.trips.len(), 1);
    assert_eq!(harness.publisher.calls(), 1);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn poller_recovers_after_abort() {
    let harness = Harness::with_stations(1);
    harness.inventory.dock(1, &["100"]);
    let store = rented_store();
    let (poller, _events) =
        harness.poller(Box::new(store.clone()), Box::new(MemoryTripSink::new()));

    harness.directory.set_failing(true);
    assert!(poller.poll_once(t(5)).await.is_err());

    harness.directory.set_failing(false);
    let report = poller.poll_once(t(6)).await.unwrap();
    assert_eq!(report.trips.len(), 1);
    assert_eq!(report.trips[0].duration_minutes, 6);
}
