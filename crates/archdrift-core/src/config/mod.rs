//! Configuration management for archdrift.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `archdrift.toml` file
//! 3. User config `~/.config/archdrift/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::render::DiagramType;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source walking and parsing.
    pub extraction: ExtractionConfig,

    /// Repository checkout.
    pub snapshot: SnapshotConfig,

    /// Diagram rendering.
    pub render: RenderConfig,

    /// Analysis scheduling and remote polling.
    pub scheduler: SchedulerConfig,

    /// Storage configuration.
    pub storage: StorageConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./archdrift.toml` (project local)
    /// 2. `~/.config/archdrift/config.toml` (user config)
    /// 3. Falls back to defaults
    ///
    /// Environment overrides apply in every case.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("archdrift.toml").exists() {
            return Self::from_file("archdrift.toml");
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Location of the per-user config file.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("archdrift").join("config.toml"))
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Extraction overrides
        if let Ok(size) = std::env::var("ARCHDRIFT_MAX_FILE_SIZE") {
            if let Ok(n) = size.parse() {
                self.extraction.max_file_size = n;
            }
        }

        // Snapshot overrides
        if let Ok(git) = std::env::var("ARCHDRIFT_GIT_BINARY") {
            self.snapshot.git_binary = git;
        }

        // Render overrides
        if let Ok(backend) = std::env::var("ARCHDRIFT_RENDER_BACKEND") {
            self.render.backend = backend;
        }
        if let Ok(format) = std::env::var("ARCHDRIFT_RENDER_FORMAT") {
            self.render.format = format;
        }
        if let Ok(dot) = std::env::var("ARCHDRIFT_DOT_BINARY") {
            self.render.dot_binary = dot;
        }

        // Scheduler overrides
        if let Ok(secs) = std::env::var("ARCHDRIFT_POLL_INTERVAL_SECS") {
            if let Ok(n) = secs.parse() {
                self.scheduler.poll_interval_secs = n;
            }
        }

        // Storage overrides
        if let Ok(dir) = std::env::var("ARCHDRIFT_DATA_DIR") {
            self.storage.data_dir = dir;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("ARCHDRIFT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("ARCHDRIFT_LOG_JSON") {
            self.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.render.backend.as_str(), "graphviz" | "dot-source") {
            return Err(ConfigError::Invalid(format!(
                "render.backend must be \"graphviz\" or \"dot-source\", got \"{}\"",
                self.render.backend
            )));
        }
        if self.render.format.trim().is_empty() {
            return Err(ConfigError::Invalid("render.format must not be empty".to_string()));
        }
        if self.render.timeout_secs == 0 || self.scheduler.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".to_string()));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("scheduler.poll_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Source walking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Files larger than this (in bytes) are skipped.
    pub max_file_size: u64,

    /// Directories to exclude from scanning.
    pub exclude_dirs: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Repository checkout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// git executable used for clone, checkout and ls-remote.
    pub git_binary: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            git_binary: DEFAULT_GIT_BINARY.to_string(),
        }
    }
}

/// Diagram rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// "graphviz" pipes DOT through `dot`; "dot-source" stores the DOT text.
    pub backend: String,

    /// Graphviz output format (`-T` argument).
    pub format: String,

    /// Graphviz executable.
    pub dot_binary: String,

    /// Limit for a single render call.
    pub timeout_secs: u64,

    /// Diagram types produced for each version.
    pub diagram_types: Vec<DiagramType>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_RENDER_BACKEND.to_string(),
            format: DEFAULT_RENDER_FORMAT.to_string(),
            dot_binary: DEFAULT_DOT_BINARY.to_string(),
            timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            diagram_types: DiagramType::ALL.to_vec(),
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Limit for materializing a snapshot.
    pub fetch_timeout_secs: u64,

    /// Interval between remote HEAD checks.
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for archdrift data (default: ".archdrift").
    pub data_dir: String,

    /// Projects subdirectory name.
    pub projects_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            projects_dir: DEFAULT_PROJECTS_DIR.to_string(),
        }
    }
}

impl StorageConfig {
    /// Get the full path to the projects directory.
    pub fn projects_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.projects_dir)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.extraction.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.render.backend, DEFAULT_RENDER_BACKEND);
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(config.render.diagram_types.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[extraction]"));
        assert!(toml_str.contains("[render]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("class_global"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[extraction]
max_file_size = 200000

[render]
backend = "dot-source"
diagram_types = ["dependency", "api"]

[storage]
data_dir = ".custom-archdrift"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.extraction.max_file_size, 200000);
        assert_eq!(config.render.backend, "dot-source");
        assert_eq!(config.render.diagram_types, vec![DiagramType::Dependency, DiagramType::Api]);
        assert_eq!(config.storage.data_dir, ".custom-archdrift");
        assert_eq!(config.render.format, DEFAULT_RENDER_FORMAT);
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = Config::default();
        config.render.backend = "mermaid".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
