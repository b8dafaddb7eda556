// # velo-core
//
// Core library for inferring bike-share trips from inventory polling.
//
// ## Architecture Overview
//
// The network exposes no "rental started" signal. Each poll samples which
// bikes are docked where, and trips are inferred from a bike disappearing
// and later reappearing:
// - **StationDirectory**: Trait listing the stations to query
// - **InventorySource**: Trait querying the bikes docked at one station
// - **CredentialProvider**: Trait supplying the inventory API credential
// - **InventoryFetcher**: Bounded-concurrency, retrying fetch into one snapshot
// - **detect**: Pure state transition from (snapshot, previous states) to
//   (new states, trips)
// - **StateStore** / **TripSink**: Persistence of bike states and trips
// - **Poller**: Orchestrates one poll, or a periodic loop of them
// - **SourceRegistry**: Plugin-based registry building all of the above
//   from configuration
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Pure detection**: Trip detection performs no I/O and reads no clock
// 3. **Plugin-Based**: Sources are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Fail per station**: One broken station never aborts a poll

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod retry;
pub mod sink;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    CredentialConfig, DirectoryConfig, FetchConfig, InventoryConfig, PollConfig,
    StateStoreConfig, TripSinkConfig, VeloConfig,
};
pub use engine::{
    Detection, FetchOutcome, InventoryFetcher, PollEvent, PollReport, Poller, StationFailure,
    detect, duration_minutes,
};
pub use error::{Error, Result};
pub use model::{
    BikeId, BikeRecord, BikeState, BikeStates, BikeStatus, Placement, Snapshot, Station,
    StationId, TripRecord,
};
pub use registry::SourceRegistry;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use sink::{CsvTripSink, MemoryTripSink};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{
    Credential, CredentialProvider, InventorySource, NoopPublisher, Publisher, StateStore,
    StationDirectory, TripSink,
};
