// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Keeps states for the lifetime of the process only. Useful for tests and
// for embedding the poller where persistence is handled elsewhere.
//
// ## Crash Behavior
//
// - All state is lost on restart
// - The first poll after a restart treats every docked bike as first seen

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::Error;
use crate::config::StateStoreConfig;
use crate::model::BikeStates;
use crate::traits::{StateStore, StateStoreFactory};

/// In-memory state store implementation
///
/// Clones share the same underlying states, so a test can keep a handle
/// while the poller owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<BikeStates>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `states`
    pub fn with_states(states: BikeStates) -> Self {
        Self {
            inner: Arc::new(RwLock::new(states)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Copy of the current states
    pub fn snapshot(&self) -> BikeStates {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of completed `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<BikeStates, Error> {
        Ok(self.snapshot())
    }

    async fn save(&self, states: &BikeStates) -> Result<(), Error> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = states.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory for [`MemoryStateStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStateStoreFactory;

impl StateStoreFactory for MemoryStateStoreFactory {
    fn create(&self, _config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        Ok(Box::new(MemoryStateStore::new()))
    }
}
