//! Append-only CSV trip log
//!
//! One row per trip, columns in [`TripRecord`] field order:
//!
//! ```text
//! bike_number,start_station_id,start_station_name,end_station_id,end_station_name,start_time,end_time,duration_minutes
//! ```
//!
//! The header is written only when the target file is new or empty, so
//! restarting the daemon keeps appending to the same log. With daily
//! partitioning each trip goes to `<dir>/<YYYY-MM-DD>/<prefix>_<YYYY-MM-DD>.csv`
//! using the date of its `end_time`; otherwise everything goes to
//! `<dir>/<prefix>_trips.csv`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::Error;
use crate::config::TripSinkConfig;
use crate::model::TripRecord;
use crate::traits::{TripSink, TripSinkFactory};

/// CSV trip sink
#[derive(Debug)]
pub struct CsvTripSink {
    directory: PathBuf,
    prefix: String,
    daily: bool,
    // Serializes appends from concurrent callers
    write_lock: Mutex<()>,
}

impl CsvTripSink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>, daily: bool) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            daily,
            write_lock: Mutex::new(()),
        }
    }

    /// File a trip ending on `date` is written to
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        if self.daily {
            let day = date.format("%Y-%m-%d").to_string();
            self.directory
                .join(&day)
                .join(format!("{}_{}.csv", self.prefix, day))
        } else {
            self.directory.join(format!("{}_trips.csv", self.prefix))
        }
    }

    async fn append_to(path: &Path, trips: &[&TripRecord]) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::trip_sink(format!(
                        "Failed to create trip directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let needs_header = match fs::metadata(path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(Error::trip_sink(format!(
                    "Failed to stat trip log {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(Vec::new());
        for trip in trips {
            wtr.serialize(trip)
                .map_err(|e| Error::trip_sink(format!("CSV write error: {e}")))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| Error::trip_sink(format!("CSV flush error: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                Error::trip_sink(format!("Failed to open trip log {}: {}", path.display(), e))
            })?;
        file.write_all(&bytes).await.map_err(|e| {
            Error::trip_sink(format!("Failed to append to {}: {}", path.display(), e))
        })?;
        file.flush().await?;

        debug!("Appended {} trips to {}", trips.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl TripSink for CsvTripSink {
    async fn append(&self, trips: &[TripRecord]) -> Result<(), Error> {
        if trips.is_empty() {
            return Ok(());
        }

        let mut by_file: BTreeMap<PathBuf, Vec<&TripRecord>> = BTreeMap::new();
        for trip in trips {
            by_file
                .entry(self.path_for(trip.end_time.date_naive()))
                .or_default()
                .push(trip);
        }

        let _guard = self.write_lock.lock().await;
        for (path, trips) in &by_file {
            Self::append_to(path, trips).await?;
        }

        Ok(())
    }
}

/// Factory for [`CsvTripSink`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTripSinkFactory;

impl TripSinkFactory for CsvTripSinkFactory {
    fn create(&self, config: &TripSinkConfig) -> Result<Box<dyn TripSink>, Error> {
        match config {
            TripSinkConfig::Csv {
                directory,
                prefix,
                daily,
            } => Ok(Box::new(CsvTripSink::new(directory, prefix.clone(), *daily))),
            other => Err(Error::config(format!(
                "CSV trip sink cannot be created from {} config",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StationId;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;

    const HEADER: &str = "bike_number,start_station_id,start_station_name,end_station_id,\
                          end_station_name,start_time,end_time,duration_minutes";

    fn trip(bike: &str, end: DateTime<Utc>) -> TripRecord {
        TripRecord {
            bike_id: bike.into(),
            start_station_id: StationId(5),
            start_station_name: "Bellecour, Place".to_string(),
            end_station_id: StationId(9),
            end_station_name: "Terreaux".to_string(),
            start_time: end - chrono::Duration::minutes(22),
            end_time: end,
            duration_minutes: 22,
        }
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let sink = CsvTripSink::new(dir.path(), "velov", false);
        let end = Utc.with_ymd_and_hms(2025, 5, 1, 8, 32, 0).unwrap();

        sink.append(&[trip("100", end)]).await.unwrap();
        sink.append(&[trip("200", end)]).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("velov_trips.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(
            lines[1],
            "100,5,\"Bellecour, Place\",9,Terreaux,2025-05-01T08:10:00Z,2025-05-01T08:32:00Z,22"
        );
        assert!(lines[2].starts_with("200,"));
    }

    #[tokio::test]
    async fn test_header_added_to_empty_file() {
        let dir = tempdir().unwrap();
        let sink = CsvTripSink::new(dir.path(), "velov", false);
        std::fs::write(dir.path().join("velov_trips.csv"), b"").unwrap();

        let end = Utc.with_ymd_and_hms(2025, 5, 1, 8, 32, 0).unwrap();
        sink.append(&[trip("100", end)]).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("velov_trips.csv")).unwrap();
        assert!(content.starts_with(HEADER));
    }

    #[tokio::test]
    async fn test_daily_partition_by_end_time() {
        let dir = tempdir().unwrap();
        let sink = CsvTripSink::new(dir.path(), "velov", true);

        let late = Utc.with_ymd_and_hms(2025, 5, 1, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 5, 2, 0, 1, 0).unwrap();
        sink.append(&[trip("1", late), trip("2", early)]).await.unwrap();

        let first = dir.path().join("2025-05-01").join("velov_2025-05-01.csv");
        let second = dir.path().join("2025-05-02").join("velov_2025-05-02.csv");
        assert_eq!(std::fs::read_to_string(first).unwrap().lines().count(), 2);
        assert_eq!(std::fs::read_to_string(second).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_no_trips_creates_no_file() {
        let dir = tempdir().unwrap();
        let sink = CsvTripSink::new(dir.path(), "velov", false);

        sink.append(&[]).await.unwrap();
        assert!(!dir.path().join("velov_trips.csv").exists());
    }
}
