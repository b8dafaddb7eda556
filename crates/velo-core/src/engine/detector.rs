//! Trip detection
//!
//! Compares the bikes docked now against the persisted states of the
//! previous poll and infers completed rentals:
//!
//! ```text
//!   (absent)  ── seen ──▶ AVAILABLE ── missing ──▶ RENTED ── seen ──▶ AVAILABLE
//!                          ▲     │                  ▲    │             + TripRecord
//!                          └seen─┘                  └miss┘ (unchanged)
//! ```
//!
//! Pass 1 visits every bike in the snapshot, pass 2 every previously known
//! bike that is absent from it. The two sets are disjoint, so each bike id
//! is written exactly once into the new states.
//!
//! Accuracy is one poll interval at best: several rentals of the same bike
//! between two polls collapse into one observed trip (or none, if the bike
//! came back to where it was).

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::model::{BikeState, BikeStates, Snapshot, TripRecord};

/// Output of one detection step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// States to persist for the next poll
    pub states: BikeStates,
    /// Trips completed by this poll, ordered by bike id
    pub trips: Vec<TripRecord>,
}

/// Run one detection step.
///
/// Pure with respect to its inputs: no I/O, no clock, no hidden state.
///
/// - A bike seen now becomes `Available` at its current station with
///   `since = scan_time`; if it was `Rented` a trip is emitted, starting at
///   the rented timestamp and origin station.
/// - A bike missing now that was `Available` becomes `Rented` with its last
///   station as origin and `since = scan_time`.
/// - A bike missing now that was already `Rented` is carried over unchanged,
///   so its disappearance time survives any number of polls.
/// - Bikes are never dropped from the states.
pub fn detect(snapshot: &Snapshot, previous: &BikeStates, scan_time: DateTime<Utc>) -> Detection {
    let mut states = BikeStates::new();
    let mut trips = Vec::new();

    for (bike_id, placement) in snapshot.iter() {
        if let Some(BikeState::Rented {
            origin_station_id,
            origin_station_name,
            since,
        }) = previous.get(bike_id)
        {
            let duration = duration_minutes(*since, scan_time);
            if duration < 0 {
                warn!(
                    "Bike {} returns before it left ({} -> {}), duration {} min",
                    bike_id, since, scan_time, duration
                );
            }

            debug!(
                "Bike {}: trip {} -> {} in {} min",
                bike_id, origin_station_name, placement.station_name, duration
            );

            trips.push(TripRecord {
                bike_id: bike_id.clone(),
                start_station_id: *origin_station_id,
                start_station_name: origin_station_name.clone(),
                end_station_id: placement.station_id,
                end_station_name: placement.station_name.clone(),
                start_time: *since,
                end_time: scan_time,
                duration_minutes: duration,
            });
        }

        states.insert(
            bike_id.clone(),
            BikeState::available(placement.station_id, placement.station_name.clone(), scan_time),
        );
    }

    for (bike_id, prev) in previous {
        if snapshot.contains(bike_id) {
            continue;
        }

        let next = match prev {
            BikeState::Available {
                station_id,
                station_name,
                ..
            } => {
                debug!("Bike {}: left {}", bike_id, station_name);
                BikeState::rented(*station_id, station_name.clone(), scan_time)
            }
            BikeState::Rented { .. } => prev.clone(),
        };

        let replaced = states.insert(bike_id.clone(), next);
        debug_assert!(replaced.is_none(), "bike {} written twice", bike_id);
    }

    trips.sort_by(|a, b| a.bike_id.cmp(&b.bike_id));

    Detection { states, trips }
}

/// Whole minutes between two instants, rounding halves to even.
///
/// Negative when `end` precedes `start` (clock skew, out-of-order polls);
/// the value is passed through, not clamped.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    (seconds / 60.0).round_ties_even() as i64
}
