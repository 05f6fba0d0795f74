//! Core error types for uvhero-core.
//!
//! Only the persistence and network boundaries can fail. Scoring, the
//! active-window gate and the in-memory streak walk are infallible and
//! never return these types.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for uvhero-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable store errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Forecast endpoint errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A caller-imposed deadline ran out before the work could be committed
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Durable store errors.
///
/// Any of these aborts the in-flight transactional unit; the store is rolled
/// back to its state before the unit started.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A holder of the shared store handle panicked
    #[error("Database handle poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Forecast fetch errors. Always scoped to a single city.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status without an API error body
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The API answered with an error payload
    #[error("API error: {0}")]
    Api(String),

    /// The body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// City is not in the known coordinate table
    #[error("Unknown city: {0}")]
    UnknownCity(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Hour outside 0..=23 or an empty/inverted window
    #[error("Invalid hour range: {start}..{end}")]
    InvalidHourRange { start: u32, end: u32 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DatabaseError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DatabaseError::Poisoned
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CoreError::Database(DatabaseError::Poisoned)
    }
}

impl CoreError {
    /// True for failures that leave the store untouched and are worth retrying
    /// on the next trigger.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Fetch(_)
                | CoreError::DeadlineExceeded { .. }
                | CoreError::Database(DatabaseError::Locked)
        )
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
