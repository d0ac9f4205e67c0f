//! Storage backends for the status ledger.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::StatusLedger;
use super::redis_backend::RedisBackend;
use crate::errors::{EngineError, StatusError};

/// Default ledger file, relative to the working directory.
pub const DEFAULT_STATUS_FILE: &str = "status.json";

/// Default redis key holding the ledger document.
pub const DEFAULT_REDIS_KEY: &str = "cms-migrate:status";

/// Somewhere the serialized ledger can be written to and read back from.
#[async_trait]
pub trait StatusBackend: Send + Sync {
    /// Short label used in log messages.
    fn name(&self) -> &str;

    /// Overwrite the stored document.
    async fn persist(&self, document: &str) -> Result<(), StatusError>;

    /// Read the stored ledger. A backend with nothing stored yet returns an empty ledger.
    async fn load(&self) -> Result<StatusLedger, StatusError>;
}

/// JSON document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StatusError {
        StatusError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StatusBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn persist(&self, document: &str) -> Result<(), StatusError> {
        tokio::fs::write(&self.path, document)
            .await
            .map_err(|err| self.io_error(err))
    }

    async fn load(&self) -> Result<StatusLedger, StatusError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => StatusLedger::from_json(&text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StatusLedger::new()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// The resolved ledger storage for one invocation.
pub struct StatusStore {
    primary: Box<dyn StatusBackend>,
    fallback: Option<FileBackend>,
}

impl StatusStore {
    /// The default file backend alone.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            primary: Box::new(FileBackend::new(path)),
            fallback: None,
        }
    }

    /// A custom backend, with the file at `fallback_path` used when it cannot persist.
    pub fn with_plugin(backend: impl StatusBackend + 'static, fallback_path: impl Into<PathBuf>) -> Self {
        Self {
            primary: Box::new(backend),
            fallback: Some(FileBackend::new(fallback_path)),
        }
    }

    /// A custom backend with no fallback.
    pub fn only(backend: impl StatusBackend + 'static) -> Self {
        Self {
            primary: Box::new(backend),
            fallback: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.primary.name()
    }

    pub async fn load(&self) -> Result<StatusLedger, StatusError> {
        debug!("loading migration status from {} backend", self.primary.name());
        self.primary.load().await
    }

    pub async fn persist(&self, document: &str) -> Result<(), StatusError> {
        match self.primary.persist(document).await {
            Ok(()) => Ok(()),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        "failed to save status with the {} backend ({err}); writing {} instead",
                        self.primary.name(),
                        fallback.path().display()
                    );
                    fallback.persist(document).await
                }
                None => Err(err),
            },
        }
    }
}

/// Stands in for a backend that failed to connect. Every call reports the connect error.
struct Unreachable {
    name: &'static str,
    reason: String,
}

impl Unreachable {
    fn new(name: &'static str, err: &StatusError) -> Self {
        Self {
            name,
            reason: err.to_string(),
        }
    }

    fn error(&self) -> StatusError {
        StatusError::Backend {
            backend: self.name.to_string(),
            message: format!("unavailable: {}", self.reason),
        }
    }
}

#[async_trait]
impl StatusBackend for Unreachable {
    fn name(&self) -> &str {
        self.name
    }

    async fn persist(&self, _document: &str) -> Result<(), StatusError> {
        Err(self.error())
    }

    async fn load(&self) -> Result<StatusLedger, StatusError> {
        Err(self.error())
    }
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

fn default_backend() -> String {
    "file".to_string()
}

fn default_path() -> String {
    DEFAULT_STATUS_FILE.to_string()
}

fn default_key() -> String {
    DEFAULT_REDIS_KEY.to_string()
}

/// `[status]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
            url: None,
            key: default_key(),
        }
    }
}

impl BackendSettings {
    /// Status file path, relative paths resolved against `base_dir`.
    pub fn file_path(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Reject settings that cannot produce a working backend.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.backend.as_str() {
            "file" => Ok(()),
            "redis" => match self.url.as_deref() {
                Some(url) if !url.trim().is_empty() => Ok(()),
                _ => Err(EngineError::MalformedBackend {
                    reason: "the redis backend requires `url`".to_string(),
                }),
            },
            other => Err(EngineError::MalformedBackend {
                reason: format!("unknown backend \"{other}\" (expected \"file\" or \"redis\")"),
            }),
        }
    }

    /// Resolve the configuration into a store.
    ///
    /// Only invalid settings are an error. A redis server that cannot be reached
    /// yields a store whose loads fail and whose persists go to the status file.
    pub async fn open(&self, base_dir: &Path) -> Result<StatusStore, EngineError> {
        self.validate()?;
        let path = self.file_path(base_dir);

        match (self.backend.as_str(), self.url.as_deref()) {
            ("redis", Some(url)) => match RedisBackend::connect(url, &self.key).await {
                Ok(backend) => Ok(StatusStore::with_plugin(backend, path)),
                Err(err) => {
                    warn!(
                        "cannot connect to the redis status backend ({err}); status will be written to {}",
                        path.display()
                    );
                    Ok(StatusStore::with_plugin(Unreachable::new("redis", &err), path))
                }
            },
            _ => Ok(StatusStore::file(path)),
        }
    }
}
