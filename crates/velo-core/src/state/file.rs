// # File State Store
//
// JSON file holding the last known state of every bike ever seen.
//
// ## Purpose
//
// Keeps the per-bike states between polls and across daemon restarts.
// The file is read at the start of each poll and rewritten at its end.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of the previous state
// - Recovery: Falls back to backup if the main file is unreadable
// - Degradation: Starts from empty state if both are unreadable
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "bikes": {
//     "12345": {
//       "status": "RENTED",
//       "last_known_station_id": 10021,
//       "last_known_station_name": "Part-Dieu",
//       "timestamp": "2025-05-01T08:00:00Z"
//     }
//   }
// }
// ```
//
// A bare `{"12345": {...}}` map without the envelope is also accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::StateStoreConfig;
use crate::model::BikeStates;
use crate::traits::{StateStore, StateStoreFactory};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// Bike states persisted as one JSON document
///
/// # Example
///
/// ```rust,no_run
/// use velo_core::state::FileStateStore;
/// use velo_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/velo/bike_states.json");
///
///     let states = store.load().await?;
///     // ... run detection ...
///     store.save(&states).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

/// Serialized form written by this store
#[derive(Serialize)]
struct StateFileRef<'a> {
    version: &'a str,
    bikes: &'a BikeStates,
}

/// Accepted on-disk forms
#[derive(Deserialize)]
#[serde(untagged)]
enum StateFileFormat {
    Versioned { version: String, bikes: BikeStates },
    Legacy(BikeStates),
}

impl FileStateStore {
    /// Create a store backed by `path`. Nothing is read until [`StateStore::load`].
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the main file, then the backup, then give up with empty state.
    async fn load_with_recovery(&self) -> BikeStates {
        let error = match Self::read_states(&self.path).await {
            Ok(Some(states)) => {
                tracing::debug!("Loaded state from file: {} bikes", states.len());
                return states;
            }
            Ok(None) => {
                tracing::info!(
                    "State file {} does not exist, starting with empty state",
                    self.path.display()
                );
                return BikeStates::new();
            }
            Err(e) => e,
        };

        tracing::warn!(
            "Bike state file is unreadable ({}), trying the backup copy",
            error
        );

        let backup_path = Self::backup_path(&self.path);
        match Self::read_states(&backup_path).await {
            Ok(Some(states)) => {
                tracing::info!("Recovered state from backup: {} bikes", states.len());

                if let Err(restore_err) = Self::restore_from_backup(&self.path, &backup_path).await
                {
                    tracing::error!("Failed to restore state file from backup: {}", restore_err);
                }

                states
            }
            Ok(None) => {
                tracing::warn!("No bike state backup either, every bike starts unknown");
                BikeStates::new()
            }
            Err(backup_err) => {
                tracing::error!(
                    "Bike state backup is unreadable too ({}), every bike starts unknown",
                    backup_err
                );
                BikeStates::new()
            }
        }
    }

    /// `Ok(None)` when the file does not exist
    async fn read_states(path: &Path) -> Result<Option<BikeStates>, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::state_store(format!(
                    "Failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let parsed: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let states = match parsed {
            StateFileFormat::Versioned { version, bikes } => {
                if version != STATE_FILE_VERSION {
                    tracing::warn!(
                        "Bike state file has version {} (expected {}), reading it anyway",
                        version,
                        STATE_FILE_VERSION
                    );
                }
                bikes
            }
            StateFileFormat::Legacy(bikes) => {
                tracing::debug!("Loaded legacy state file without version envelope");
                bikes
            }
        };

        Ok(Some(states))
    }

    /// Replace the state file through a temporary sibling
    async fn write_states(&self, states: &BikeStates) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&StateFileRef {
            version: STATE_FILE_VERSION,
            bikes: states,
        })
        .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Could not keep a backup of the bike states: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Saved {} bike states to {}",
            states.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Bike state file rewritten from its backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<BikeStates, Error> {
        Ok(self.load_with_recovery().await)
    }

    async fn save(&self, states: &BikeStates) -> Result<(), Error> {
        self.write_states(states).await
    }
}

/// Factory for [`FileStateStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStateStoreFactory;

impl StateStoreFactory for FileStateStoreFactory {
    fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path))),
            other => Err(Error::config(format!(
                "File state store cannot be created from {} config",
                other.type_name()
            ))),
        }
    }
}
