// # Memory Trip Sink
//
// Collects trips in memory. Clones share the same buffer.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::Error;
use crate::config::TripSinkConfig;
use crate::model::TripRecord;
use crate::traits::{TripSink, TripSinkFactory};

#[derive(Debug, Clone, Default)]
pub struct MemoryTripSink {
    trips: Arc<Mutex<Vec<TripRecord>>>,
}

impl MemoryTripSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every trip appended so far, in append order
    pub fn trips(&self) -> Vec<TripRecord> {
        self.trips
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.trips
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TripSink for MemoryTripSink {
    async fn append(&self, trips: &[TripRecord]) -> Result<(), Error> {
        self.trips
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(trips);
        Ok(())
    }
}

/// Factory for [`MemoryTripSink`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTripSinkFactory;

impl TripSinkFactory for MemoryTripSinkFactory {
    fn create(&self, _config: &TripSinkConfig) -> Result<Box<dyn TripSink>, Error> {
        Ok(Box::new(MemoryTripSink::new()))
    }
}
