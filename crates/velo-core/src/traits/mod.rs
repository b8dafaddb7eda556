//! Core traits for the trip inference system
//!
//! This module defines the ports the poller talks to. Everything behind a
//! port is replaceable, which is how the tests run without a network.
//!
//! - [`StationDirectory`]: List the stations of the network
//! - [`InventorySource`]: Query the bikes docked at one station
//! - [`CredentialProvider`]: Obtain the token the inventory endpoint wants
//! - [`StateStore`]: Load and replace the persisted bike states
//! - [`TripSink`]: Durably append completed trips
//! - [`Publisher`]: Ship output artifacts somewhere after a poll

pub mod station_directory;
pub mod inventory_source;
pub mod credential;
pub mod state_store;
pub mod trip_sink;
pub mod publisher;

pub use station_directory::{StationDirectory, StationDirectoryFactory};
pub use inventory_source::{InventorySource, InventorySourceFactory};
pub use credential::{Credential, CredentialProvider, CredentialProviderFactory};
pub use state_store::{StateStore, StateStoreFactory};
pub use trip_sink::{TripSink, TripSinkFactory};
pub use publisher::{NoopPublisher, Publisher};
