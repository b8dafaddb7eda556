//! Cyclocity bikes API
//!
//! One request per station:
//!
//! ```text
//! GET <base>/contracts/<contract>/bikes?stationNumber=<id>
//! Accept: application/vnd.bikes.v4+json
//! Authorization: <credential>
//! ```
//!
//! The answer is either a list of bikes or an object with a `bikes` list.
//! Each bike carries at least `number` and `stationNumber`, as numbers or
//! strings depending on the API version.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use velo_core::config::{FetchConfig, InventoryConfig};
use velo_core::model::{BikeId, BikeRecord, Station};
use velo_core::traits::{Credential, InventorySource, InventorySourceFactory};
use velo_core::{Error, Result};

use crate::directory::station_number;
use crate::{request_error, status_error};

const BIKES_MEDIA_TYPE: &str = "application/vnd.bikes.v4+json";

/// Per-station inventory source for the Cyclocity bikes API
#[derive(Debug, Clone)]
pub struct CyclocityInventory {
    base_url: String,
    contract: String,
    client: reqwest::Client,
}

impl CyclocityInventory {
    /// Create an inventory source
    ///
    /// # Parameters
    ///
    /// - `base_url`: API root, e.g. "https://api.cyclocity.fr"
    /// - `contract`: Network name, e.g. "lyon"
    /// - `timeout`: Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        contract: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BIKES_MEDIA_TYPE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            contract: contract.into(),
            client,
        })
    }

    /// URL queried for `station`
    pub fn station_url(&self, station: &Station) -> String {
        format!(
            "{}/contracts/{}/bikes?stationNumber={}",
            self.base_url, self.contract, station.id
        )
    }
}

#[async_trait]
impl InventorySource for CyclocityInventory {
    async fn station_bikes(
        &self,
        credential: &Credential,
        station: &Station,
    ) -> Result<Vec<BikeRecord>> {
        let mut authorization = HeaderValue::from_str(credential.expose())
            .map_err(|_| Error::auth("credential is not a valid header value"))?;
        authorization.set_sensitive(true);

        let context = format!("station {}", station.id);
        let response = self
            .client
            .get(self.station_url(station))
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| request_error(e, &context))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &context));
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(e, &context))?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| Error::inventory(format!("{}: invalid JSON: {}", context, e)))?;

        let bikes = parse_bikes(&payload, station);
        debug!("Station {}: {} bikes", station.id, bikes.len());
        Ok(bikes)
    }

    fn source_name(&self) -> &'static str {
        "cyclocity"
    }
}

/// Extract bike rows from an inventory payload.
///
/// An unexpected shape yields no bikes for the station.
pub fn parse_bikes(payload: &Value, station: &Station) -> Vec<BikeRecord> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("bikes") {
            Some(Value::Array(items)) => items,
            None => return Vec::new(),
            Some(_) => {
                warn!("Station {}: 'bikes' is not a list, ignoring", station.id);
                return Vec::new();
            }
        },
        _ => {
            warn!("Station {}: unexpected inventory payload, ignoring", station.id);
            return Vec::new();
        }
    };

    items
        .iter()
        .map(|item| BikeRecord {
            bike_id: item.get("number").and_then(bike_number),
            station_id: item.get("stationNumber").and_then(station_number),
        })
        .collect()
}

fn bike_number(value: &Value) -> Option<BikeId> {
    match value {
        Value::Number(n) => Some(BikeId::new(n.to_string())),
        Value::String(s) if !s.trim().is_empty() => Some(BikeId::new(s.trim())),
        _ => None,
    }
}

/// Factory for [`CyclocityInventory`]
pub struct CyclocityInventoryFactory;

impl InventorySourceFactory for CyclocityInventoryFactory {
    fn create(
        &self,
        config: &InventoryConfig,
        fetch: &FetchConfig,
    ) -> Result<Box<dyn InventorySource>> {
        match config {
            InventoryConfig::Cyclocity { base_url, contract } => {
                if base_url.is_empty() || contract.is_empty() {
                    return Err(Error::config(
                        "Cyclocity inventory requires a base URL and a contract",
                    ));
                }
                Ok(Box::new(CyclocityInventory::new(
                    base_url.clone(),
                    contract.clone(),
                    fetch.request_timeout(),
                )?))
            }
            _ => Err(Error::config("Invalid config for Cyclocity inventory")),
        }
    }
}
