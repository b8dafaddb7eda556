//! Open-data station directory
//!
//! Reads the station export published by the network operator:
//!
//! ```json
//! { "values": [ { "number": 10021, "name": "Part-Dieu", ... }, ... ] }
//! ```
//!
//! The live Lyon endpoint emits keys wrapped in literal quotes (`"\"number\""`),
//! so both spellings are accepted.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use velo_core::config::DirectoryConfig;
use velo_core::model::{Station, StationId};
use velo_core::traits::{StationDirectory, StationDirectoryFactory};
use velo_core::{Error, Result};

use crate::request_error;

/// Station directory backed by an open-data JSON export
#[derive(Debug, Clone)]
pub struct OpenDataDirectory {
    url: String,
    client: reqwest::Client,
}

impl OpenDataDirectory {
    /// Create a directory reading `url`, giving up after `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StationDirectory for OpenDataDirectory {
    async fn stations(&self) -> Result<Vec<Station>> {
        debug!("Fetching station directory from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::directory(request_error(e, "station directory").to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::directory(format!("HTTP error: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::directory(format!("Failed to read response: {}", e)))?;

        let stations = parse_directory(&body)?;
        info!("Station directory listed {} stations", stations.len());
        Ok(stations)
    }

    fn directory_name(&self) -> &'static str {
        "open_data"
    }
}

/// Parse a directory export into stations.
///
/// Entries without a usable number or name are skipped.
pub fn parse_directory(body: &str) -> Result<Vec<Station>> {
    let data: Value = serde_json::from_str(body).map_err(|e| {
        let excerpt: String = body.chars().take(200).collect();
        Error::directory(format!("Invalid JSON ({}): {}", e, excerpt))
    })?;

    let values = match data.get("values") {
        Some(Value::Array(values)) => values,
        Some(_) => return Err(Error::directory("'values' is not a list")),
        None => return Err(Error::directory("'values' is missing from the response")),
    };

    let stations: Vec<Station> = values
        .iter()
        .filter_map(|entry| {
            let id = field(entry, "number").and_then(station_number)?;
            let name = field(entry, "name").and_then(Value::as_str)?;
            Some(Station::new(id, name))
        })
        .collect();

    if stations.is_empty() && !values.is_empty() {
        warn!(
            "Directory listed {} entries but none had a usable number and name",
            values.len()
        );
    } else if stations.len() < values.len() {
        debug!(
            "Skipped {} directory entries without number or name",
            values.len() - stations.len()
        );
    }

    Ok(stations)
}

/// Look up `key`, also trying the literally quoted spelling
fn field<'a>(entry: &'a Value, key: &str) -> Option<&'a Value> {
    entry
        .get(key)
        .or_else(|| entry.get(format!("\"{}\"", key).as_str()))
}

pub(crate) fn station_number(value: &Value) -> Option<StationId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(StationId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Factory for [`OpenDataDirectory`]
pub struct OpenDataDirectoryFactory;

impl StationDirectoryFactory for OpenDataDirectoryFactory {
    fn create(&self, config: &DirectoryConfig) -> Result<Box<dyn StationDirectory>> {
        match config {
            DirectoryConfig::OpenData { url, timeout_secs } => {
                if url.is_empty() {
                    return Err(Error::config("Directory URL is required"));
                }
                Ok(Box::new(OpenDataDirectory::new(
                    url.clone(),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for open-data directory")),
        }
    }
}
