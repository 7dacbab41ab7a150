//! Configuration loading and root folder resolution
//!
//! Root folder resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SCOUT_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! built-in defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SCOUT_ROOT_FOLDER";

/// Directory name used under the platform config/data directories
const APP_DIR_NAME: &str = "vacancy-scout";

/// Database file created inside the root folder
const DATABASE_FILE_NAME: &str = "scout.db";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional so that a partial file still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAI API key used by the enrichment stage when a request carries none
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Base URL of the JobSpy-compatible scraping service
    #[serde(default)]
    pub scraper_service_url: Option<String>,

    /// Site names registered as scrapers (default: linkedin, indeed)
    #[serde(default)]
    pub scraper_sites: Option<Vec<String>>,

    /// Minutes a finished session stays in memory before eviction
    #[serde(default)]
    pub session_retention_minutes: Option<u64>,

    /// Collection scheduler tunables; unset fields keep built-in defaults
    #[serde(default)]
    pub collection: CollectionTuning,
}

/// Collection scheduler overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTuning {
    #[serde(default)]
    pub max_concurrent_sources: Option<usize>,
    #[serde(default)]
    pub max_concurrent_positions: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub base_retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub inter_request_delay_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

/// Resolves the root folder from CLI argument, environment, TOML and defaults
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_config: Option<TomlConfig>,
}

impl RootFolderResolver {
    /// Create resolver for the named module (used for log output only)
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_config: None,
        }
    }

    /// Supply the command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Supply an already-loaded TOML configuration
    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_config = Some(config.clone());
        self
    }

    /// Resolve the root folder; never fails
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, path = %path, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.toml_config.as_ref().and_then(|c| c.root_folder.clone()) {
            info!(module = %self.module_name, path = %path.display(), "Root folder from TOML config");
            return path;
        }

        let path = default_root_folder();
        info!(module = %self.module_name, path = %path.display(), "Root folder from compiled default");
        path
    }
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}

/// Default TOML config location (`~/.config/vacancy-scout/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Load TOML configuration with graceful degradation
///
/// A missing file yields defaults; a malformed file logs a warning and yields defaults.
pub fn load_toml_config(path: Option<&Path>) -> TomlConfig {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using built-in defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        info!(path = %path.display(), "No config file found, using built-in defaults");
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file unusable, using built-in defaults");
            TomlConfig::default()
        }
    }
}

/// Read and parse a TOML configuration file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vacancy-scout"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vacancy-scout"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vacancy-scout"))
    } else {
        PathBuf::from("./vacancy_scout_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("openai_api_key = \"sk-test\"").unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 5740);
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_nested_sections_parse() {
        let config: TomlConfig = toml::from_str(
            r#"
            scraper_sites = ["linkedin", "glassdoor"]

            [collection]
            max_retries = 5

            [server]
            port = 9000

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.scraper_sites,
            Some(vec!["linkedin".to_string(), "glassdoor".to_string()])
        );
        assert_eq!(config.collection.max_retries, Some(5));
        assert_eq!(config.collection.max_concurrent_sources, None);
    }

    #[test]
    fn test_database_path_inside_root() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/scout-root"));
        assert_eq!(init.database_path(), PathBuf::from("/tmp/scout-root/scout.db"));
    }
}
