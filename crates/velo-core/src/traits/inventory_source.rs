// # Inventory Source Trait
//
// Defines the interface for querying the bikes docked at one station.
//
// ## Responsibilities
//
// An inventory source performs exactly one request per call and reports
// what it saw. It does not retry, back off, or schedule: the
// `InventoryFetcher` owns all of that, so a source must surface transient
// failures as errors for which `Error::is_transient()` is true.
//
// ## Usage
//
// ```rust,ignore
// use velo_core::InventorySource;
//
// let bikes = source.station_bikes(&credential, &station).await?;
// for bike in bikes {
//     println!("{:?} at {:?}", bike.bike_id, bike.station_id);
// }
// ```

use async_trait::async_trait;

use crate::model::{BikeRecord, Station};
use crate::traits::credential::Credential;

/// Trait for per-station inventory implementations
///
/// # Thread Safety
///
/// The fetcher calls this concurrently from several worker tasks, so
/// implementations share one client (connection pool) and keep no per-call
/// mutable state.
///
/// # Error Contract
///
/// - Timeouts, connection failures, HTTP 5xx/429: transient errors
/// - Authentication failures and other 4xx: permanent errors
/// - A response whose shape is unexpected is **not** an error: return an
///   empty list and log a warning
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Query the bikes currently docked at `station`
    ///
    /// # Parameters
    ///
    /// - `credential`: Token for the authenticated endpoint
    /// - `station`: The station to query
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<BikeRecord>)`: Raw bike rows (possibly empty)
    /// - `Err(Error)`: If the single attempt failed
    async fn station_bikes(
        &self,
        credential: &Credential,
        station: &Station,
    ) -> Result<Vec<BikeRecord>, crate::Error>;

    /// Short name used in logs
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing inventory sources from configuration
pub trait InventorySourceFactory: Send + Sync {
    /// Create an InventorySource instance from configuration
    fn create(
        &self,
        config: &crate::config::InventoryConfig,
        fetch: &crate::config::FetchConfig,
    ) -> Result<Box<dyn InventorySource>, crate::Error>;
}
