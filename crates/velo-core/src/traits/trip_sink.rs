// # Trip Sink Trait
//
// Append-only destination for completed trips. A sink never sees a trip
// twice from the same poll and must not reorder or rewrite what it already
// holds.

use async_trait::async_trait;

use crate::model::TripRecord;

/// Trait for trip sink implementations
#[async_trait]
pub trait TripSink: Send + Sync {
    /// Durably append trips
    ///
    /// Called at most once per poll, and not at all when the poll produced
    /// no trip.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: All trips written
    /// - `Err(Error)`: Write failure (fails the poll before state is saved)
    async fn append(&self, trips: &[TripRecord]) -> Result<(), crate::Error>;
}

/// Helper trait for constructing trip sinks from configuration
pub trait TripSinkFactory: Send + Sync {
    /// Create a TripSink instance from configuration
    fn create(
        &self,
        config: &crate::config::TripSinkConfig,
    ) -> Result<Box<dyn TripSink>, crate::Error>;
}
