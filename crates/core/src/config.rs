use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_key: String,
    pub workspace_mapping: Vec<WorkspaceMapping>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub dry_run: bool,
}

/// A set of local folders whose files go to the same destination workspaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMapping {
    pub folders: Vec<PathBuf>,
    pub workspace_slugs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Pause between two scan passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Files modified more recently than this are left for a later pass.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns matched against full paths; matches are never visited.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Extra case-insensitive regexes marking a file name as a probable copy.
    #[serde(default)]
    pub copy_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            settle_secs: default_settle_secs(),
            extensions: default_extensions(),
            exclude: Vec::new(),
            copy_patterns: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            path: default_ledger_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    15
}

fn default_settle_secs() -> u64 {
    5
}

fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "docx".to_string(), "txt".to_string()]
}

fn default_ledger_path() -> String {
    "uploaded_files.json".to_string()
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() && !self.dry_run {
            return Err(ConfigError::Invalid("api_key must not be empty".into()));
        }
        if self.workspace_mapping.is_empty() {
            return Err(ConfigError::Invalid(
                "workspace_mapping must list at least one mapping".into(),
            ));
        }
        for (i, mapping) in self.workspace_mapping.iter().enumerate() {
            if mapping.folders.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "workspace_mapping[{i}] has no folders"
                )));
            }
            if mapping.workspace_slugs.is_empty()
                || mapping.workspace_slugs.iter().any(|s| s.trim().is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "workspace_mapping[{i}] needs non-empty workspace_slugs"
                )));
            }
        }
        if self.scan.interval_secs == 0 {
            return Err(ConfigError::Invalid("scan.interval_secs must be > 0".into()));
        }
        if self.scan.extensions.is_empty() {
            return Err(ConfigError::Invalid("scan.extensions must not be empty".into()));
        }
        if self.sink.timeout_secs == 0 {
            return Err(ConfigError::Invalid("sink.timeout_secs must be > 0".into()));
        }
        if self.ledger.path.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger.path must not be empty".into()));
        }
        Ok(())
    }
}

/// Loads the config file (`config.{json,toml,yaml}` in the working directory
/// unless `path` is given), applies `SYNCAGENT_*` environment overrides and
/// validates the result.
pub fn load(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config"));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("SYNCAGENT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    let cfg: AppConfig = settings.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
