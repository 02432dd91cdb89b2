//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CODHUB_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "codhub.db";

/// Service TOML configuration
///
/// Every field is optional so a partial (or missing) file still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP listener configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Staging sync limit overrides (lower priority than database settings)
    #[serde(default)]
    pub sync: SyncTomlConfig,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is not set
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

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5740".to_string()
}

/// `[sync]` section: optional overrides for reconciliation limits
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncTomlConfig {
    pub batch_size: Option<u32>,
    pub max_iterations: Option<u32>,
    pub max_records: Option<u32>,
    pub max_run_seconds: Option<u64>,
    pub max_lock_wait_ms: Option<u64>,
    pub stale_lock_minutes: Option<u64>,
    pub progress_grace_seconds: Option<u64>,
}

/// Default TOML config path for a service (e.g. `~/.config/codhub/codhub-reconcile.toml`)
pub fn default_config_path(service_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("codhub").join(format!("{}.toml", service_name)))
}

/// Load TOML configuration from a file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load TOML configuration, falling back to defaults when the file is missing or invalid
pub fn load_toml_config_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        return TomlConfig::default();
    };

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using default configuration", e);
            TomlConfig::default()
        }
    }
}

/// Write TOML configuration, creating the parent directory if needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/codhub (or /var/lib/codhub for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("codhub"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/codhub"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("codhub"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/codhub"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("codhub"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\codhub"))
    } else {
        PathBuf::from("./codhub_data")
    }
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}
