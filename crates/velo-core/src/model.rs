//! Data model shared by the fetcher, the detector and the stores
//!
//! - [`Station`] / [`StationId`]: directory reference data for one poll
//! - [`BikeRecord`]: one raw row returned by an inventory query
//! - [`Placement`] / [`Snapshot`]: what was physically docked during a poll
//! - [`BikeState`] / [`BikeStates`]: the persisted per-bike summary
//! - [`TripRecord`]: an inferred rental, derived and never stored as state

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Numeric identifier of a docking station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(StationId)
    }
}

impl From<u32> for StationId {
    fn from(id: u32) -> Self {
        StationId(id)
    }
}

// Older state files and some upstream payloads carry station numbers as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStationId {
    Number(u32),
    Text(String),
}

impl<'de> Deserialize<'de> for StationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawStationId::deserialize(deserializer)? {
            RawStationId::Number(n) => Ok(StationId(n)),
            RawStationId::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Identifier of a bike (the number painted on the frame)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BikeId(String);

impl BikeId {
    /// Create a bike id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BikeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BikeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BikeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A docking station as listed by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Station number
    pub id: StationId,
    /// Human-readable name
    pub name: String,
}

impl Station {
    /// Create a station
    pub fn new(id: StationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One bike row as returned by an inventory query.
///
/// Both fields are optional because the upstream payload is not trusted;
/// rows without a bike id are dropped by the fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BikeRecord {
    /// Bike number, if present in the payload
    pub bike_id: Option<BikeId>,
    /// Station the bike reports being docked at
    pub station_id: Option<StationId>,
}

impl BikeRecord {
    /// Create a complete record
    pub fn new(bike_id: impl Into<BikeId>, station_id: StationId) -> Self {
        Self {
            bike_id: Some(bike_id.into()),
            station_id: Some(station_id),
        }
    }
}

/// A bike observed docked during a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub bike_id: BikeId,
    pub station_id: StationId,
    pub station_name: String,
    pub observed_at: DateTime<Utc>,
}

/// Every bike placement observed during one poll, keyed by bike id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    placements: HashMap<BikeId, Placement>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a placement.
    ///
    /// Returns `false` and keeps the existing entry if the bike id was
    /// already placed in this snapshot.
    pub fn insert(&mut self, placement: Placement) -> bool {
        match self.placements.entry(placement.bike_id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(placement);
                true
            }
        }
    }

    pub fn get(&self, bike_id: &BikeId) -> Option<&Placement> {
        self.placements.get(bike_id)
    }

    pub fn contains(&self, bike_id: &BikeId) -> bool {
        self.placements.contains_key(bike_id)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BikeId, &Placement)> {
        self.placements.iter()
    }
}

impl FromIterator<Placement> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Placement>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for placement in iter {
            snapshot.insert(placement);
        }
        snapshot
    }
}

/// Plain status label of a [`BikeState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BikeStatus {
    Available,
    Rented,
}

impl fmt::Display for BikeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BikeStatus::Available => f.write_str("AVAILABLE"),
            BikeStatus::Rented => f.write_str("RENTED"),
        }
    }
}

/// Last known status of one bike, persisted across polls.
///
/// `since` is the time the status last became true. For `Available` that is
/// the latest poll that saw the bike; for `Rented` it is the poll that first
/// noticed the bike missing and is never refreshed afterwards.
///
/// On disk the variant becomes a `status` field (`AVAILABLE` / `RENTED`)
/// next to `last_known_station_id`, `last_known_station_name` and
/// `timestamp`. Timestamps without an offset, as older state files carry,
/// are read as local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BikeState {
    /// Docked at `station_id`
    Available {
        #[serde(rename = "last_known_station_id")]
        station_id: StationId,
        #[serde(rename = "last_known_station_name")]
        station_name: String,
        #[serde(rename = "timestamp", deserialize_with = "deserialize_timestamp")]
        since: DateTime<Utc>,
    },
    /// Missing since `since`, last seen at `origin_station_id`
    Rented {
        #[serde(rename = "last_known_station_id")]
        origin_station_id: StationId,
        #[serde(rename = "last_known_station_name")]
        origin_station_name: String,
        #[serde(rename = "timestamp", deserialize_with = "deserialize_timestamp")]
        since: DateTime<Utc>,
    },
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 one taken as local time
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    // Times skipped by a DST change have no local reading
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    )
}

impl BikeState {
    /// Create an available state
    pub fn available(
        station_id: StationId,
        station_name: impl Into<String>,
        since: DateTime<Utc>,
    ) -> Self {
        Self::Available {
            station_id,
            station_name: station_name.into(),
            since,
        }
    }

    /// Create a rented state
    pub fn rented(
        origin_station_id: StationId,
        origin_station_name: impl Into<String>,
        since: DateTime<Utc>,
    ) -> Self {
        Self::Rented {
            origin_station_id,
            origin_station_name: origin_station_name.into(),
            since,
        }
    }

    pub fn status(&self) -> BikeStatus {
        match self {
            BikeState::Available { .. } => BikeStatus::Available,
            BikeState::Rented { .. } => BikeStatus::Rented,
        }
    }

    /// Station the bike is docked at, or was last seen at
    pub fn station_id(&self) -> StationId {
        match self {
            BikeState::Available { station_id, .. } => *station_id,
            BikeState::Rented {
                origin_station_id, ..
            } => *origin_station_id,
        }
    }

    pub fn station_name(&self) -> &str {
        match self {
            BikeState::Available { station_name, .. } => station_name,
            BikeState::Rented {
                origin_station_name,
                ..
            } => origin_station_name,
        }
    }

    pub fn since(&self) -> DateTime<Utc> {
        match self {
            BikeState::Available { since, .. } | BikeState::Rented { since, .. } => *since,
        }
    }
}

/// Persisted mapping of bike id to last known state
pub type BikeStates = BTreeMap<BikeId, BikeState>;

/// A rental inferred from a disappearance followed by a reappearance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(rename = "bike_number")]
    pub bike_id: BikeId,
    pub start_station_id: StationId,
    pub start_station_name: String,
    pub end_station_id: StationId,
    pub end_station_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}
