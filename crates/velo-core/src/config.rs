//! Configuration types for the trip inference system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeloConfig {
    /// Station directory configuration
    pub directory: DirectoryConfig,

    /// Per-station inventory configuration
    pub inventory: InventoryConfig,

    /// Credential configuration
    pub credential: CredentialConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Trip sink configuration
    #[serde(default)]
    pub trip_sink: TripSinkConfig,

    /// Fetch phase settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Poll loop settings
    #[serde(default)]
    pub poll: PollConfig,
}

impl VeloConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            inventory: InventoryConfig::default(),
            credential: CredentialConfig::default(),
            state_store: StateStoreConfig::default(),
            trip_sink: TripSinkConfig::default(),
            fetch: FetchConfig::default(),
            poll: PollConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.directory.validate()?;
        self.inventory.validate()?;
        self.credential.validate()?;
        self.state_store.validate()?;
        self.trip_sink.validate()?;
        self.fetch.validate()?;
        self.poll.validate()?;

        Ok(())
    }
}

impl Default for VeloConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Default open-data station directory (Lyon)
pub const DEFAULT_DIRECTORY_URL: &str =
    "https://download.data.grandlyon.com/ws/rdata/jcd_jcdecaux.jcdvelov/all.json";

/// Default inventory API base URL
pub const DEFAULT_INVENTORY_BASE_URL: &str = "https://api.cyclocity.fr";

/// Station directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryConfig {
    /// Open-data JSON listing (`values[]` with `number` and `name`)
    OpenData {
        /// Directory URL
        url: String,
        /// Request timeout in seconds
        #[serde(default = "default_directory_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom directory
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DirectoryConfig {
    /// Validate the directory configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DirectoryConfig::OpenData { url, timeout_secs } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Directory URL cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Directory timeout must be > 0"));
                }
                Ok(())
            }
            DirectoryConfig::Custom { factory, .. } => validate_factory(factory, "directory"),
        }
    }

    /// Get the directory type name
    pub fn type_name(&self) -> &str {
        match self {
            DirectoryConfig::OpenData { .. } => "open_data",
            DirectoryConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::OpenData {
            url: DEFAULT_DIRECTORY_URL.to_string(),
            timeout_secs: default_directory_timeout_secs(),
        }
    }
}

/// Inventory source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryConfig {
    /// Cyclocity bikes API
    Cyclocity {
        /// API base URL
        base_url: String,
        /// Contract (city) name, e.g. "lyon"
        contract: String,
    },

    /// Custom inventory source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl InventoryConfig {
    /// Validate the inventory configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            InventoryConfig::Cyclocity { base_url, contract } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Inventory base URL cannot be empty"));
                }
                if contract.is_empty() {
                    return Err(crate::Error::config("Inventory contract cannot be empty"));
                }
                Ok(())
            }
            InventoryConfig::Custom { factory, .. } => validate_factory(factory, "inventory"),
        }
    }

    /// Get the inventory type name
    pub fn type_name(&self) -> &str {
        match self {
            InventoryConfig::Cyclocity { .. } => "cyclocity",
            InventoryConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig::Cyclocity {
            base_url: DEFAULT_INVENTORY_BASE_URL.to_string(),
            contract: "lyon".to_string(),
        }
    }
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialConfig {
    /// Fixed authorization value
    Static {
        /// Full header value, e.g. "Taknv1 ..."
        token: String,
    },

    /// External helper that prints the authorization value on stdout
    Command {
        /// Program to run
        program: String,
        /// Program arguments
        #[serde(default)]
        args: Vec<String>,
        /// Maximum run time in seconds
        #[serde(default = "default_credential_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom credential provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl CredentialConfig {
    /// Validate the credential configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            CredentialConfig::Static { token } => {
                if token.trim().is_empty() {
                    return Err(crate::Error::config("Static credential cannot be empty"));
                }
                Ok(())
            }
            CredentialConfig::Command {
                program,
                timeout_secs,
                ..
            } => {
                if program.is_empty() {
                    return Err(crate::Error::config("Credential command cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Credential command timeout must be > 0"));
                }
                Ok(())
            }
            CredentialConfig::Custom { factory, .. } => validate_factory(factory, "credential"),
        }
    }

    /// Get the credential provider type name
    pub fn type_name(&self) -> &str {
        match self {
            CredentialConfig::Static { .. } => "static",
            CredentialConfig::Command { .. } => "command",
            CredentialConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::Static {
            token: String::new(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the state store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
        }
    }
}

/// Trip sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripSinkConfig {
    /// Append-only CSV log
    Csv {
        /// Output directory
        directory: String,
        /// File name prefix
        #[serde(default = "default_csv_prefix")]
        prefix: String,
        /// One sub-directory and file per day (`<dir>/<date>/<prefix>_<date>.csv`)
        #[serde(default)]
        daily: bool,
    },

    /// In-memory sink (not persistent)
    #[default]
    Memory,
}

impl TripSinkConfig {
    /// Validate the trip sink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            TripSinkConfig::Csv { prefix, .. } if prefix.is_empty() => {
                Err(crate::Error::config("Trip log prefix cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the trip sink type name
    pub fn type_name(&self) -> &str {
        match self {
            TripSinkConfig::Csv { .. } => "csv",
            TripSinkConfig::Memory => "memory",
        }
    }
}

/// Fetch phase configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of concurrent station queries
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retries after the first failed attempt of a station query
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay before the first retry (in milliseconds); doubles afterwards
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl FetchConfig {
    /// Validate the fetch configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.workers == 0 {
            return Err(crate::Error::config("Fetch workers must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        Ok(())
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Upper bound of the fetch phase wall time for `stations` stations,
    /// ignoring backoff sleeps: `ceil(stations / workers) × timeout × attempts`.
    pub fn worst_case_duration(&self, stations: usize) -> Duration {
        let rounds = stations.div_ceil(self.workers.max(1)) as u32;
        let attempts = (self.max_retries + 1) as u32;
        self.request_timeout() * rounds * attempts
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval between polls in daemon mode (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Capacity of the poll event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl PollConfig {
    /// Validate the poll configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_factory(factory: &str, kind: &str) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            kind
        )));
    }
    Ok(())
}

fn default_directory_timeout_secs() -> u64 {
    20
}

fn default_credential_timeout_secs() -> u64 {
    60
}

fn default_csv_prefix() -> String {
    "velov".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> VeloConfig {
        VeloConfig {
            credential: CredentialConfig::Static {
                token: "Taknv1 abc".to_string(),
            },
            ..VeloConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.workers, 10);
        assert_eq!(fetch.max_retries, 3);
        assert_eq!(fetch.initial_backoff_ms, 1000);
        assert_eq!(fetch.request_timeout(), Duration::from_secs(15));

        let policy = fetch.retry_policy();
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        // Default credential is empty
        assert!(VeloConfig::default().validate().is_err());

        let mut config = valid_config();
        config.fetch.workers = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.state_store = StateStoreConfig::File {
            path: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worst_case_duration() {
        let fetch = FetchConfig::default();
        // 25 stations over 10 workers = 3 rounds, 4 attempts of 15s each
        assert_eq!(fetch.worst_case_duration(25), Duration::from_secs(180));
    }

    #[test]
    fn test_deserialize_tagged_sections() {
        let json = serde_json::json!({
            "directory": { "type": "open_data", "url": "https://example.org/all.json" },
            "inventory": { "type": "cyclocity", "base_url": "https://api.example.org", "contract": "lyon" },
            "credential": { "type": "command", "program": "/usr/local/bin/velov-token" },
            "state_store": { "type": "file", "path": "/var/lib/velo/bike_states.json" },
            "trip_sink": { "type": "csv", "directory": "data", "daily": true }
        });

        let config: VeloConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.credential.type_name(), "command");
        assert_eq!(config.trip_sink.type_name(), "csv");
        assert_eq!(config.fetch.workers, 10);
        match config.trip_sink {
            TripSinkConfig::Csv { prefix, daily, .. } => {
                assert_eq!(prefix, "velov");
                assert!(daily);
            }
            TripSinkConfig::Memory => panic!("expected csv sink"),
        }
    }
}
