use std::path::PathBuf;

use thiserror::Error;

use crate::client::ApiError;
use crate::migration::Operation;

/// Configuration and load errors that abort a batch before anything executes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested migration file does not exist.
    #[error("cannot find the specified migration script: {}", path.display())]
    MigrationNotFound { path: PathBuf },

    /// The requested migration name carries an extension other than the recognised one.
    #[error("file {name} has an unsupported extension (expected .{expected})")]
    UnsupportedExtension { name: String, expected: &'static str },

    /// A migration file could not be read or parsed.
    #[error("couldn't load the migration script from \"{}\" due to an error: \"{message}\"", path.display())]
    MigrationLoad { path: PathBuf, message: String },

    /// A migration does not provide the entry point the batch needs.
    #[error("migration {name} does not provide a {entry} entry point")]
    MissingEntryPoint { name: String, entry: Operation },

    /// Two or more migrations share an order key.
    #[error("duplicate migration order found: {}", format_offenders(offenders))]
    DuplicateOrder { offenders: Vec<(String, String)> },

    /// One or more migrations declare an order that is neither a non-negative integer nor a timestamp.
    #[error("migration order has to be a positive integer, zero or a timestamp: {}", format_offenders(offenders))]
    InvalidOrder { offenders: Vec<(String, String)> },

    #[error(transparent)]
    InvalidRange(#[from] RangeError),

    /// The configured status backend cannot be used.
    #[error("malformed status backend: {reason}")]
    MalformedBackend { reason: String },

    /// The migrations directory is missing or unreadable.
    #[error("cannot read the migrations directory {}: {message}", path.display())]
    MigrationsDirectory { path: PathBuf, message: String },

    #[error(transparent)]
    Status(#[from] StatusError),
}

fn format_offenders(offenders: &[(String, String)]) -> String {
    offenders
        .iter()
        .map(|(name, order)| format!("{name} (order: {order})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while loading or persisting the status ledger.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status file {} could not be accessed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("status document is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failure reported by a custom backend.
    #[error("status backend {backend} failed: {message}")]
    Backend { backend: String, message: String },
}

/// A range string that is malformed or whose lower bound exceeds its upper bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "invalid range \"{spec}\": expected \"number:number\" or \"Tyyyy-mm-dd-hh-mm-ss:yyyy-mm-dd-hh-mm-ss\" where the left value is less than or equal to the right one"
)]
pub struct RangeError {
    pub spec: String,
}

impl RangeError {
    pub fn new(spec: impl Into<String>) -> Self {
        Self { spec: spec.into() }
    }
}

/// Failure returned by a migration's run or rollback capability.
#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    /// The remote service rejected a call.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The migration's own logic failed.
    #[error("{message}")]
    Failed { message: String },
}

impl MigrationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Detailed validation failure reported by the remote service for a single path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
