// # Station Directory Trait
//
// Defines the interface for listing the stations of the network.
//
// The station list is reference data for one poll: the fetcher queries each
// entry once and uses its name to enrich the bikes found there. The set may
// drift slowly between polls; nothing downstream assumes it is stable.

use async_trait::async_trait;

use crate::model::Station;

/// Trait for station directory implementations
///
/// # Failure Semantics
///
/// A directory failure is fatal to the poll: without a station list no
/// snapshot can be trusted. Implementations should return an error rather
/// than an empty list when the response is unusable, and an empty list only
/// when the endpoint genuinely lists no station.
#[async_trait]
pub trait StationDirectory: Send + Sync {
    /// Fetch the current station list
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Station>)`: Stations with id and name
    /// - `Err(Error)`: If the directory could not be fetched or parsed
    async fn stations(&self) -> Result<Vec<Station>, crate::Error>;

    /// Short name used in logs
    fn directory_name(&self) -> &'static str;
}

/// Helper trait for constructing station directories from configuration
pub trait StationDirectoryFactory: Send + Sync {
    /// Create a StationDirectory instance from configuration
    fn create(
        &self,
        config: &crate::config::DirectoryConfig,
    ) -> Result<Box<dyn StationDirectory>, crate::Error>;
}
