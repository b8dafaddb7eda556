//! Error types for the trip inference system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for velo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the trip inference system
#[derive(Error, Debug)]
pub enum Error {
    /// Station directory errors (fatal to a poll)
    #[error("Station directory error: {0}")]
    Directory(String),

    /// Inventory query errors (local to one station)
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// Credential acquisition errors (fatal to a poll)
    #[error("Credential error: {0}")]
    Credential(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Trip sink-related errors
    #[error("Trip sink error: {0}")]
    TripSink(String),

    /// Artifact publisher errors
    #[error("Publisher error: {0}")]
    Publisher(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The directory returned no usable station
    #[error("No stations available")]
    NoStations,

    /// Non-success HTTP status from an upstream endpoint
    #[error("HTTP error: status {status}: {message}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response excerpt or context
        message: String,
    },

    /// Connection-level failure (reset, refused, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a station directory error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    /// Create an inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a credential error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a trip sink error
    pub fn trip_sink(msg: impl Into<String>) -> Self {
        Self::TripSink(msg.into())
    }

    /// Create a publisher error
    pub fn publisher(msg: impl Into<String>) -> Self {
        Self::Publisher(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the failure is worth retrying.
    ///
    /// Timeouts, connection failures, HTTP 5xx and HTTP 429 are transient.
    /// Everything else (authentication, other 4xx, malformed data) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
