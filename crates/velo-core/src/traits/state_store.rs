// # State Store Trait
//
// Defines the interface for persisting bike states between polls.
//
// ## Purpose
//
// The single prior `BikeState` per bike is the only input trip detection
// needs to resume after a restart. The store is loaded once at the start of
// a poll and replaced wholesale at the end; there is no per-bike update.
//
// ## Implementations
//
// - File-based: JSON file with atomic replace and backup recovery
// - Memory: for tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use velo_core::StateStore;
//
// let previous = store.load().await?;
// let detection = velo_core::detect(&snapshot, &previous, scan_time);
// store.save(&detection.states).await?;
// ```

use async_trait::async_trait;

use crate::model::BikeStates;

/// Trait for state store implementations
///
/// # Degradation Rules
///
/// - Missing storage: `load()` returns an empty map
/// - Corrupt storage: `load()` logs a warning and returns an empty map (or
///   a recovered backup); it does not fail the poll
/// - `save()` failures are real errors and propagate to the poller
///
/// # Forbidden Capabilities
/// - ❌ Deciding bike status (owned by the detector)
/// - ❌ Dropping or rewriting entries on its own
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last persisted states
    ///
    /// # Returns
    ///
    /// - `Ok(BikeStates)`: Persisted states, empty when nothing usable exists
    /// - `Err(Error)`: Only for unexpected I/O failures
    async fn load(&self) -> Result<BikeStates, crate::Error>;

    /// Replace the persisted states
    ///
    /// # Parameters
    ///
    /// - `states`: The complete new mapping (not a delta)
    async fn save(&self, states: &BikeStates) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    fn create(
        &self,
        config: &crate::config::StateStoreConfig,
    ) -> Result<Box<dyn StateStore>, crate::Error>;
}
