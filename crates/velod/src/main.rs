// # velod - Trip Poller Daemon
//
// Thin integration layer: all polling, detection and persistence logic lives
// in velo-core. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering sources and building the poller
// 4. Running one poll (cron) or polling forever (daemon)
//
// ## Configuration
//
// ### Run
// - `VELO_MODE`: `daemon` (default) polls every interval, `once` runs one poll
// - `VELO_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ### Stations and inventory
// - `VELO_DIRECTORY_URL`: Open-data station export (default: Lyon)
// - `VELO_DIRECTORY_TIMEOUT_SECS`: Directory request timeout (default 20)
// - `VELO_INVENTORY_BASE_URL`: Bikes API root (default https://api.cyclocity.fr)
// - `VELO_CONTRACT`: Network name (default lyon)
//
// ### Credential (one of)
// - `VELO_TOKEN`: Full Authorization value, e.g. "Taknv1 ..."
// - `VELO_CREDENTIAL_COMMAND`: Helper printing the value on stdout
// - `VELO_CREDENTIAL_ARGS`: Whitespace-separated helper arguments
// - `VELO_CREDENTIAL_TIMEOUT_SECS`: Helper timeout (default 60)
//
// ### Storage
// - `VELO_STATE_STORE_TYPE`: file (default) or memory
// - `VELO_STATE_PATH`: State file (default bike_states.json)
// - `VELO_TRIP_SINK_TYPE`: csv (default) or memory
// - `VELO_TRIP_DIR`: Trip log directory (default .)
// - `VELO_TRIP_PREFIX`: Trip file prefix (default velov)
// - `VELO_TRIP_DAILY`: One folder and file per day (default false)
//
// ### Fetch and loop
// - `VELO_WORKERS`: Concurrent station queries (default 10)
// - `VELO_MAX_RETRIES`: Retries per station (default 3)
// - `VELO_INITIAL_BACKOFF_MS`: First retry delay, doubled each retry (default 1000)
// - `VELO_REQUEST_TIMEOUT_SECS`: Per-request timeout (default 15)
// - `VELO_POLL_INTERVAL_SECS`: Interval in daemon mode (default 60)
//
// ### Publication
// - `VELO_PUBLISH_GIT_REPO`: Repository to commit the trip log to (disabled if unset)
// - `VELO_PUBLISH_GIT_PATHS`: Comma-separated paths to add (default `VELO_TRIP_DIR`)
// - `VELO_PUBLISH_GIT_PUSH`: Push after committing (default true)
//
// ## Example
//
// ```bash
// export VELO_MODE=once
// export VELO_CREDENTIAL_COMMAND=/usr/local/bin/velov-token
// export VELO_STATE_PATH=/var/lib/velo/bike_states.json
// export VELO_TRIP_DIR=/srv/velov/data
// export VELO_TRIP_DAILY=true
//
// velod
// ```

mod publish;

use anyhow::{Context, Result};
use chrono::Utc;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use velo_core::{
    CredentialConfig, DirectoryConfig, FetchConfig, InventoryConfig, InventoryFetcher,
    NoopPublisher, PollConfig, PollEvent, Poller, Publisher, SourceRegistry, StateStoreConfig,
    TripSinkConfig, VeloConfig,
};

use crate::publish::GitPublisher;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown, or successful poll in `once` mode
/// - 1: Configuration or startup error
/// - 2: Runtime error (including a failed poll in `once` mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VeloExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<VeloExitCode> for ExitCode {
    fn from(code: VeloExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Single poll, for cron
    Once,
    /// Poll every interval until SIGINT/SIGTERM
    Daemon,
}

#[derive(Debug, Clone)]
struct GitSettings {
    repo: String,
    paths: Vec<String>,
    push: bool,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    mode: RunMode,
    log_level: String,
    velo: VeloConfig,
    publish: Option<GitSettings>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match var("VELO_MODE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("daemon") => RunMode::Daemon,
            Some("once") => RunMode::Once,
            Some(other) => anyhow::bail!(
                "VELO_MODE '{}' is not supported. Supported modes: daemon, once",
                other
            ),
        };

        let directory = DirectoryConfig::OpenData {
            url: var("VELO_DIRECTORY_URL")
                .unwrap_or_else(|| velo_core::config::DEFAULT_DIRECTORY_URL.to_string()),
            timeout_secs: parse_var(&var, "VELO_DIRECTORY_TIMEOUT_SECS", 20)?,
        };

        let inventory = InventoryConfig::Cyclocity {
            base_url: var("VELO_INVENTORY_BASE_URL")
                .unwrap_or_else(|| velo_core::config::DEFAULT_INVENTORY_BASE_URL.to_string()),
            contract: var("VELO_CONTRACT").unwrap_or_else(|| "lyon".to_string()),
        };

        let credential = match (var("VELO_CREDENTIAL_COMMAND"), var("VELO_TOKEN")) {
            (Some(program), _) => CredentialConfig::Command {
                program,
                args: var("VELO_CREDENTIAL_ARGS")
                    .map(|a| a.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                timeout_secs: parse_var(&var, "VELO_CREDENTIAL_TIMEOUT_SECS", 60)?,
            },
            (None, Some(token)) => CredentialConfig::Static { token },
            (None, None) => anyhow::bail!(
                "A credential is required. Set VELO_TOKEN=\"Taknv1 ...\" \
                or VELO_CREDENTIAL_COMMAND=/path/to/helper"
            ),
        };

        let state_store = match var("VELO_STATE_STORE_TYPE").as_deref().unwrap_or("file") {
            "file" => StateStoreConfig::File {
                path: var("VELO_STATE_PATH").unwrap_or_else(|| "bike_states.json".to_string()),
            },
            "memory" => StateStoreConfig::Memory,
            other => anyhow::bail!(
                "VELO_STATE_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        };

        let trip_dir = var("VELO_TRIP_DIR").unwrap_or_else(|| ".".to_string());
        let trip_sink = match var("VELO_TRIP_SINK_TYPE").as_deref().unwrap_or("csv") {
            "csv" => TripSinkConfig::Csv {
                directory: trip_dir.clone(),
                prefix: var("VELO_TRIP_PREFIX").unwrap_or_else(|| "velov".to_string()),
                daily: parse_var(&var, "VELO_TRIP_DAILY", false)?,
            },
            "memory" => TripSinkConfig::Memory,
            other => anyhow::bail!(
                "VELO_TRIP_SINK_TYPE '{}' is not supported. Supported types: csv, memory",
                other
            ),
        };

        let fetch = FetchConfig {
            workers: parse_var(&var, "VELO_WORKERS", 10)?,
            max_retries: parse_var(&var, "VELO_MAX_RETRIES", 3)?,
            initial_backoff_ms: parse_var(&var, "VELO_INITIAL_BACKOFF_MS", 1000)?,
            request_timeout_secs: parse_var(&var, "VELO_REQUEST_TIMEOUT_SECS", 15)?,
        };

        let poll = PollConfig {
            interval_secs: parse_var(&var, "VELO_POLL_INTERVAL_SECS", 60)?,
            ..PollConfig::default()
        };

        let publish = match var("VELO_PUBLISH_GIT_REPO") {
            Some(repo) => Some(GitSettings {
                repo,
                paths: var("VELO_PUBLISH_GIT_PATHS")
                    .map(|p| {
                        p.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|| vec![trip_dir.clone()]),
                push: parse_var(&var, "VELO_PUBLISH_GIT_PUSH", true)?,
            }),
            None => None,
        };

        Ok(Self {
            mode,
            log_level: var("VELO_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            velo: VeloConfig {
                directory,
                inventory,
                credential,
                state_store,
                trip_sink,
                fetch,
                poll,
            },
            publish,
        })
    }

    /// Validate the configuration
    ///
    /// Structural checks come from [`VeloConfig::validate`]; the ranges
    /// below guard against values that would hammer the API or never finish.
    fn validate(&self) -> Result<()> {
        self.velo.validate().context("Invalid configuration")?;

        let fetch = &self.velo.fetch;
        if !(1..=100).contains(&fetch.workers) {
            anyhow::bail!("VELO_WORKERS must be between 1 and 100. Got: {}", fetch.workers);
        }

        if fetch.max_retries > 10 {
            anyhow::bail!(
                "VELO_MAX_RETRIES must be between 0 and 10. Got: {}",
                fetch.max_retries
            );
        }

        if fetch.initial_backoff_ms > 60_000 {
            anyhow::bail!(
                "VELO_INITIAL_BACKOFF_MS must be at most 60000. Got: {}",
                fetch.initial_backoff_ms
            );
        }

        if !(1..=300).contains(&fetch.request_timeout_secs) {
            anyhow::bail!(
                "VELO_REQUEST_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                fetch.request_timeout_secs
            );
        }

        let interval = self.velo.poll.interval_secs;
        if !(10..=86_400).contains(&interval) {
            anyhow::bail!(
                "VELO_POLL_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                interval
            );
        }

        for url in [self.directory_url(), self.inventory_base_url()]
            .into_iter()
            .flatten()
        {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("URL must use HTTP or HTTPS scheme. Got: {}", url);
            }
        }

        if let StateStoreConfig::File { path } = &self.velo.state_store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "VELO_STATE_PATH parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if let Some(git) = &self.publish {
            if !std::path::Path::new(&git.repo).is_dir() {
                anyhow::bail!("VELO_PUBLISH_GIT_REPO is not a directory: {}", git.repo);
            }
            if git.paths.is_empty() {
                anyhow::bail!("VELO_PUBLISH_GIT_PATHS must name at least one path");
            }
        }

        self.level()?;

        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "VELO_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn directory_url(&self) -> Option<&str> {
        match &self.velo.directory {
            DirectoryConfig::OpenData { url, .. } => Some(url),
            DirectoryConfig::Custom { .. } => None,
        }
    }

    fn inventory_base_url(&self) -> Option<&str> {
        match &self.velo.inventory {
            InventoryConfig::Cyclocity { base_url, .. } => Some(base_url),
            InventoryConfig::Custom { .. } => None,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return VeloExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return VeloExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return VeloExitCode::ConfigError.into();
    }

    info!("Starting velod ({:?} mode)", config.mode);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return VeloExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => VeloExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Configuration problems surfacing while building sources exit like
/// validation errors; everything else is a runtime failure.
fn exit_code_for(err: &anyhow::Error) -> VeloExitCode {
    match err.downcast_ref::<velo_core::Error>() {
        Some(velo_core::Error::Config(_)) => VeloExitCode::ConfigError,
        _ => VeloExitCode::RuntimeError,
    }
}

/// Build the poller and run it
async fn run_daemon(config: Config) -> Result<()> {
    let registry = SourceRegistry::with_builtins();

    #[cfg(feature = "cyclocity")]
    {
        info!("Registering Cyclocity sources");
        velo_source_cyclocity::register(&registry);
    }

    let velo = &config.velo;
    info!("Directory: {}", velo.directory.type_name());
    info!("Inventory: {} ({} workers)", velo.inventory.type_name(), velo.fetch.workers);
    info!("Credential: {}", velo.credential.type_name());
    info!("State store: {}", velo.state_store.type_name());
    info!("Trip sink: {}", velo.trip_sink.type_name());

    let directory = registry.create_directory(&velo.directory)?;
    let inventory = registry.create_inventory_source(&velo.inventory, &velo.fetch)?;
    let credentials = registry.create_credential_provider(&velo.credential)?;
    let state_store = registry.create_state_store(&velo.state_store)?;
    let trip_sink = registry.create_trip_sink(&velo.trip_sink)?;

    let publisher: Box<dyn Publisher> = match &config.publish {
        Some(git) => {
            info!("Publishing trips to git repository {}", git.repo);
            Box::new(GitPublisher::new(&git.repo, git.paths.clone()).with_push(git.push))
        }
        None => Box::new(NoopPublisher),
    };

    let fetcher = InventoryFetcher::with_tokio_sleeper(
        Arc::from(inventory),
        velo.fetch.retry_policy(),
        velo.fetch.workers,
    );

    let (poller, events) = Poller::new(
        directory,
        credentials,
        fetcher,
        state_store,
        trip_sink,
        publisher,
        &velo.poll,
    )?;

    let monitor = tokio::spawn(log_events(events));

    let result = match config.mode {
        RunMode::Once => poller.poll_once(Utc::now()).await.map(|report| {
            info!(
                "Poll done: {} trips, {}/{} stations failed",
                report.trips.len(),
                report.stations_failed,
                report.stations_total
            );
        }),
        RunMode::Daemon => poller.run().await,
    };

    // Closing the channel ends the monitor
    drop(poller);
    if let Err(e) = monitor.await {
        warn!("Event monitor stopped abnormally: {}", e);
    }

    result?;
    info!("Shutting down velod");
    Ok(())
}

/// Log poll events for operators
async fn log_events(mut events: mpsc::Receiver<PollEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PollEvent::PollStarted { scan_time } => {
                debug!("Poll started at {}", scan_time.to_rfc3339());
            }
            PollEvent::StationFailed {
                station_id,
                station_name,
                error,
                attempts,
            } => {
                debug!(
                    "Station {} ({}) failed after {} attempt(s): {}",
                    station_id, station_name, attempts, error
                );
            }
            PollEvent::TripCompleted { trip } => {
                debug!(
                    "Trip: bike {} from {} to {} in {} min",
                    trip.bike_id, trip.start_station_id, trip.end_station_id, trip.duration_minutes
                );
            }
            PollEvent::PollCompleted {
                stations_failed,
                stations_total,
                trips,
                ..
            } if stations_total > 0 && stations_failed * 2 > stations_total => {
                warn!(
                    "Degraded poll: {}/{} stations failed ({} trips)",
                    stations_failed, stations_total, trips
                );
            }
            PollEvent::PollCompleted { .. } => {}
            PollEvent::PollAborted { reason, .. } => {
                debug!("Poll aborted: {}", reason);
            }
            PollEvent::Stopped { reason } => {
                info!("Poller stopped: {}", reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_token() {
        let config = Config::from_lookup(lookup(&[("VELO_TOKEN", "Taknv1 abc")])).unwrap();

        assert_eq!(config.mode, RunMode::Daemon);
        assert_eq!(config.velo.fetch.workers, 10);
        assert_eq!(config.velo.fetch.max_retries, 3);
        assert_eq!(config.velo.poll.interval_secs, 60);
        assert_eq!(config.velo.credential.type_name(), "static");
        assert_eq!(config.velo.state_store.type_name(), "file");
        assert_eq!(config.velo.trip_sink.type_name(), "csv");
        assert!(config.publish.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_credential_rejected() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("VELO_TOKEN", "   ")])).is_err());
    }

    #[test]
    fn test_command_credential_preferred() {
        let config = Config::from_lookup(lookup(&[
            ("VELO_TOKEN", "Taknv1 abc"),
            ("VELO_CREDENTIAL_COMMAND", "/usr/local/bin/velov-token"),
            ("VELO_CREDENTIAL_ARGS", "--headless  --city lyon"),
        ]))
        .unwrap();

        match config.velo.credential {
            CredentialConfig::Command {
                program,
                args,
                timeout_secs,
            } => {
                assert_eq!(program, "/usr/local/bin/velov-token");
                assert_eq!(args, vec!["--headless", "--city", "lyon"]);
                assert_eq!(timeout_secs, 60);
            }
            other => panic!("unexpected credential config: {:?}", other),
        }
    }

    #[test]
    fn test_once_mode_and_daily_sink() {
        let config = Config::from_lookup(lookup(&[
            ("VELO_TOKEN", "Taknv1 abc"),
            ("VELO_MODE", "ONCE"),
            ("VELO_TRIP_DIR", "data"),
            ("VELO_TRIP_DAILY", "true"),
        ]))
        .unwrap();

        assert_eq!(config.mode, RunMode::Once);
        match config.velo.trip_sink {
            TripSinkConfig::Csv {
                directory, daily, ..
            } => {
                assert_eq!(directory, "data");
                assert!(daily);
            }
            TripSinkConfig::Memory => panic!("expected csv sink"),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [("VELO_TOKEN", "Taknv1 abc")];

        assert!(Config::from_lookup(lookup(&[base[0], ("VELO_MODE", "sometimes")])).is_err());
        assert!(Config::from_lookup(lookup(&[base[0], ("VELO_WORKERS", "ten")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[base[0], ("VELO_STATE_STORE_TYPE", "redis")])).is_err()
        );

        let config = Config::from_lookup(lookup(&[base[0], ("VELO_WORKERS", "0")])).unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::from_lookup(lookup(&[base[0], ("VELO_POLL_INTERVAL_SECS", "5")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[base[0], ("VELO_LOG_LEVEL", "loud")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[
            base[0],
            ("VELO_INVENTORY_BASE_URL", "ftp://api.example.org"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_parent_must_exist() {
        let config = Config::from_lookup(lookup(&[
            ("VELO_TOKEN", "Taknv1 abc"),
            ("VELO_STATE_PATH", "/nonexistent/velo/bike_states.json"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_git_publication_settings() {
        let repo = std::env::temp_dir();
        let repo = repo.to_string_lossy();

        let config = Config::from_lookup(lookup(&[
            ("VELO_TOKEN", "Taknv1 abc"),
            ("VELO_TRIP_DIR", "data"),
            ("VELO_PUBLISH_GIT_REPO", &*repo),
            ("VELO_PUBLISH_GIT_PUSH", "false"),
        ]))
        .unwrap();

        let git = config.publish.clone().unwrap();
        assert_eq!(git.paths, vec!["data"]);
        assert!(!git.push);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_exit_code_mapping() {
        let config_err = anyhow::Error::from(velo_core::Error::config("Unknown directory type"));
        assert_eq!(exit_code_for(&config_err), VeloExitCode::ConfigError);

        let runtime_err = anyhow::Error::from(velo_core::Error::NoStations);
        assert_eq!(exit_code_for(&runtime_err), VeloExitCode::RuntimeError);
    }
}
