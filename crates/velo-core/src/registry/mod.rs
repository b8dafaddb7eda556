//! Plugin-based source registry
//!
//! The registry maps configuration type names to factories, so the daemon
//! builds every collaborator of a [`crate::Poller`] from configuration
//! without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use velo_core::registry::SourceRegistry;
//!
//! let registry = SourceRegistry::with_builtins();
//! velo_source_cyclocity::register(&registry);
//!
//! let directory = registry.create_directory(&config.directory)?;
//! let source = registry.create_inventory_source(&config.inventory, &config.fetch)?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &SourceRegistry) {
//!     registry.register_directory("open_data", Box::new(OpenDataDirectoryFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{
    CredentialConfig, DirectoryConfig, FetchConfig, InventoryConfig, StateStoreConfig,
    TripSinkConfig,
};
use crate::error::{Error, Result};
use crate::sink::{CsvTripSinkFactory, MemoryTripSinkFactory};
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{
    CredentialProvider, CredentialProviderFactory, InventorySource, InventorySourceFactory,
    StateStore, StateStoreFactory, StationDirectory, StationDirectoryFactory, TripSink,
    TripSinkFactory,
};

type FactoryMap<F> = RwLock<HashMap<String, Arc<F>>>;

/// Registry of factories for every pluggable poll collaborator
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    directories: FactoryMap<dyn StationDirectoryFactory>,
    inventory_sources: FactoryMap<dyn InventorySourceFactory>,
    credential_providers: FactoryMap<dyn CredentialProviderFactory>,
    state_stores: FactoryMap<dyn StateStoreFactory>,
    trip_sinks: FactoryMap<dyn TripSinkFactory>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the state stores and trip sinks of this crate
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry.register_trip_sink("csv", Box::new(CsvTripSinkFactory));
        registry.register_trip_sink("memory", Box::new(MemoryTripSinkFactory));
        registry
    }

    /// Register a station directory factory
    ///
    /// # Parameters
    ///
    /// - `name`: Directory type name (e.g., "open_data")
    /// - `factory`: Factory object for creating directory instances
    pub fn register_directory(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StationDirectoryFactory>,
    ) {
        write(&self.directories).insert(name.into(), Arc::from(factory));
    }

    /// Register an inventory source factory
    pub fn register_inventory_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn InventorySourceFactory>,
    ) {
        write(&self.inventory_sources).insert(name.into(), Arc::from(factory));
    }

    /// Register a credential provider factory
    pub fn register_credential_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CredentialProviderFactory>,
    ) {
        write(&self.credential_providers).insert(name.into(), Arc::from(factory));
    }

    /// Register a state store factory
    pub fn register_state_store(&self, name: impl Into<String>, factory: Box<dyn StateStoreFactory>) {
        write(&self.state_stores).insert(name.into(), Arc::from(factory));
    }

    /// Register a trip sink factory
    pub fn register_trip_sink(&self, name: impl Into<String>, factory: Box<dyn TripSinkFactory>) {
        write(&self.trip_sinks).insert(name.into(), Arc::from(factory));
    }

    /// Create a station directory from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn StationDirectory>)`: Created directory instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_directory(&self, config: &DirectoryConfig) -> Result<Box<dyn StationDirectory>> {
        lookup(&self.directories, config.type_name(), "station directory")?.create(config)
    }

    /// Create an inventory source from configuration
    pub fn create_inventory_source(
        &self,
        config: &InventoryConfig,
        fetch: &FetchConfig,
    ) -> Result<Box<dyn InventorySource>> {
        lookup(&self.inventory_sources, config.type_name(), "inventory source")?
            .create(config, fetch)
    }

    /// Create a credential provider from configuration
    pub fn create_credential_provider(
        &self,
        config: &CredentialConfig,
    ) -> Result<Box<dyn CredentialProvider>> {
        lookup(&self.credential_providers, config.type_name(), "credential provider")?
            .create(config)
    }

    /// Create a state store from configuration
    pub fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
        lookup(&self.state_stores, config.type_name(), "state store")?.create(config)
    }

    /// Create a trip sink from configuration
    pub fn create_trip_sink(&self, config: &TripSinkConfig) -> Result<Box<dyn TripSink>> {
        lookup(&self.trip_sinks, config.type_name(), "trip sink")?.create(config)
    }

    pub fn has_directory(&self, name: &str) -> bool {
        read(&self.directories).contains_key(name)
    }

    pub fn has_inventory_source(&self, name: &str) -> bool {
        read(&self.inventory_sources).contains_key(name)
    }

    pub fn has_credential_provider(&self, name: &str) -> bool {
        read(&self.credential_providers).contains_key(name)
    }

    pub fn has_state_store(&self, name: &str) -> bool {
        read(&self.state_stores).contains_key(name)
    }

    pub fn has_trip_sink(&self, name: &str) -> bool {
        read(&self.trip_sinks).contains_key(name)
    }

    /// List all registered station directory types
    pub fn list_directories(&self) -> Vec<String> {
        read(&self.directories).keys().cloned().collect()
    }

    /// List all registered inventory source types
    pub fn list_inventory_sources(&self) -> Vec<String> {
        read(&self.inventory_sources).keys().cloned().collect()
    }
}

fn read<F: ?Sized>(map: &FactoryMap<F>) -> RwLockReadGuard<'_, HashMap<String, Arc<F>>> {
    map.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<F: ?Sized>(map: &FactoryMap<F>) -> RwLockWriteGuard<'_, HashMap<String, Arc<F>>> {
    map.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// The lock is released before the factory runs.
fn lookup<F: ?Sized>(map: &FactoryMap<F>, name: &str, kind: &str) -> Result<Arc<F>> {
    read(map)
        .get(name)
        .cloned()
        .ok_or_else(|| Error::config(format!("Unknown {} type: {}", kind, name)))
}
