//! Application configuration for Euclid.
//!
//! User config lives at `~/.euclid/euclid.toml`.
//! CLI flags override the environment, which overrides config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EuclidError, Result};
use crate::types::ExportFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "euclid.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".euclid";

/// Address of the pipeline service when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

// ---------------------------------------------------------------------------
// Config structs (matching euclid.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline service settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Export defaults.
    #[serde(default)]
    pub export: ExportConfig,

    /// Dataset preview defaults.
    #[serde(default)]
    pub preview: PreviewConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base address of the pipeline service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var that overrides `base_url` when set.
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            base_url_env: default_base_url_env(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_base_url_env() -> String {
    "EUCLID_API_URL".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory exported datasets are saved into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Format used when none is requested.
    #[serde(default)]
    pub default_format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            default_format: ExportFormat::default(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

/// `[preview]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Rows fetched per preview page.
    #[serde(default = "default_preview_limit")]
    pub limit: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            limit: default_preview_limit(),
        }
    }
}

fn default_preview_limit() -> u32 {
    50
}

impl AppConfig {
    /// Resolve the service base address: env override first, then config value.
    pub fn api_base_url(&self) -> String {
        match std::env::var(&self.api.base_url_env) {
            Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
            _ => self.api.base_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.euclid/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EuclidError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.euclid/euclid.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EuclidError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EuclidError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EuclidError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EuclidError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EuclidError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that a base address is an absolute http(s) URL.
pub fn validate_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| EuclidError::validation(format!("invalid base URL '{base_url}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EuclidError::validation(format!(
            "invalid base URL '{base_url}': unsupported scheme '{other}'"
        ))),
    }
}
