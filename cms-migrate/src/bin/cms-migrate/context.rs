use anyhow::{Context, Result};
use cms_migrate::BackendSettings;
use cms_migrate::discovery::DEFAULT_MIGRATIONS_DIR;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "cms-migrate.toml";
pub const ENVIRONMENTS_FILE: &str = ".environments.json";
pub const BASE_URL_ENV: &str = "CMS_MIGRATE_BASE_URL";

/// Project context for cms-migrate operations
pub struct ProjectContext {
    /// Working directory all relative paths resolve against
    pub project_root: PathBuf,
    /// Path to migrations directory
    pub migrations_dir: PathBuf,
    /// Path to the named environments file
    pub environments_path: PathBuf,
    /// Loaded configuration (defaults when the file is absent)
    pub config: ProjectConfig,
}

/// Configuration stored in cms-migrate.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub migrations: MigrationSettings,
    #[serde(default)]
    pub status: BackendSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    #[serde(default = "default_migrations_dir")]
    pub dir: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
        }
    }
}

fn default_migrations_dir() -> String {
    DEFAULT_MIGRATIONS_DIR.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_base_url() -> String {
    "https://manage.kontent.ai/v2/projects".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_ms() -> u64 {
    1000
}

/// Credentials of one named environment in .environments.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    #[serde(rename = "environmentId", alias = "projectId")]
    pub environment_id: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

pub type Environments = BTreeMap<String, EnvironmentEntry>;

impl ProjectContext {
    /// Load project context from the current directory
    pub fn current() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::from_root(current_dir)
    }

    /// Create context from a known project root
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {CONFIG_FILE}"))?;
            toml::from_str(&content).with_context(|| format!("Failed to parse {CONFIG_FILE}"))?
        } else {
            ProjectConfig::default()
        };

        let migrations_dir = resolve(&project_root, &config.migrations.dir);
        let environments_path = project_root.join(ENVIRONMENTS_FILE);

        Ok(Self {
            project_root,
            migrations_dir,
            environments_path,
            config,
        })
    }

    /// Status backend settings with environment variables expanded
    pub fn status_settings(&self) -> Result<BackendSettings> {
        let mut settings = self.config.status.clone();
        if let Some(url) = settings.url.take() {
            settings.url = Some(expand_env(&url)?);
        }
        Ok(settings)
    }

    /// Remote API settings, honouring the base URL override variable
    pub fn remote_settings(&self) -> Result<RemoteSettings> {
        let mut remote = self.config.remote.clone();
        remote.base_url = match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => url,
            _ => expand_env(&remote.base_url)?,
        };
        Ok(remote)
    }

    /// Named environments, empty when the file does not exist
    pub fn load_environments(&self) -> Result<Environments> {
        if !self.environments_path.exists() {
            return Ok(Environments::new());
        }

        let content = std::fs::read_to_string(&self.environments_path)
            .with_context(|| format!("Failed to read {ENVIRONMENTS_FILE}"))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {ENVIRONMENTS_FILE}"))
    }

    pub fn save_environments(&self, environments: &Environments) -> Result<()> {
        let content = serde_json::to_string_pretty(environments)?;
        std::fs::write(&self.environments_path, content)
            .with_context(|| format!("Failed to write {ENVIRONMENTS_FILE}"))
    }

    /// Look up a named environment
    pub fn environment(&self, name: &str) -> Result<EnvironmentEntry> {
        self.load_environments()?
            .remove(name)
            .with_context(|| format!("Cannot find the \"{name}\" environment in {ENVIRONMENTS_FILE}"))
    }
}

fn resolve(root: &Path, dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Expand a `${VAR}` value from the environment; other values are returned as-is
pub fn expand_env(value: &str) -> Result<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).with_context(|| format!("Environment variable {var_name} not set"))
    } else {
        Ok(value.to_string())
    }
}
