//! Configuration loading and credential resolution
//!
//! Configuration comes from a TOML file. A missing default file is not an
//! error: every field has a compiled default. An explicitly requested file
//! that cannot be read or parsed is a fatal configuration error.

use crate::{Credential, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the access token
pub const ACCESS_TOKEN_ENV: &str = "INAT_ACCESS_TOKEN";

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "inat-classify";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Bearer token (lowest-priority credential source)
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the v1 API; endpoint paths are appended to it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout, long enough for multipart uploads
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Client-side request quota
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Locale for common names in taxonomy lookups (e.g. "zh-CN")
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            requests_per_minute: default_requests_per_minute(),
            locale: None,
        }
    }
}

/// Batch traversal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Delay between successive images
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Descend into subdirectories
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Persist intermediate results every N images (0 disables)
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            recursive: true,
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

/// Retry policy for transient transport failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per stage, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// How images reach the scoring endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Upload first, then score by photo id
    #[default]
    UploadFirst,
    /// Post the image bytes directly to the scoring endpoint
    RawImage,
}

/// Classifier settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Scores below this are logged as low confidence, never rejected
    #[serde(default)]
    pub min_confidence: Option<f64>,

    #[serde(default)]
    pub scoring_mode: ScoringMode,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
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

fn default_base_url() -> String {
    "https://api.inaturalist.org/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_pacing_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform default location: `<config_dir>/inat-classify/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml"))
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration from an explicit path or the platform default
///
/// An explicit path must exist. The default path is optional; when absent
/// the compiled defaults are used.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        _ => {
            info!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the access token
///
/// **Priority:** CLI argument → environment (`INAT_ACCESS_TOKEN`) → TOML
pub fn resolve_access_token(cli_token: Option<&str>, toml_config: &TomlConfig) -> Result<Credential> {
    let env_token = std::env::var(ACCESS_TOKEN_ENV).ok();
    resolve_access_token_from(cli_token, env_token.as_deref(), toml_config)
}

/// Resolution over already-collected sources
pub fn resolve_access_token_from(
    cli_token: Option<&str>,
    env_token: Option<&str>,
    toml_config: &TomlConfig,
) -> Result<Credential> {
    let candidates = [
        ("command line", cli_token),
        ("environment", env_token),
        ("TOML", toml_config.access_token.as_deref()),
    ];

    let valid: Vec<(&str, &str)> = candidates
        .iter()
        .filter_map(|(source, token)| token.filter(|t| is_valid_token(t)).map(|t| (*source, t)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(source, _)| *source).collect();
        warn!(
            "Access token found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match valid.first() {
        Some((source, token)) => {
            info!("Access token loaded from {}", source);
            Credential::new(*token)
        }
        None => Err(Error::Config(format!(
            "iNaturalist access token not configured. Provide it using one of:\n\
             1. Command line: --token <TOKEN>\n\
             2. Environment: {}=<TOKEN>\n\
             3. TOML config: access_token = \"<TOKEN>\"\n\
             \n\
             Obtain a token at: https://www.inaturalist.org/users/api_token",
            ACCESS_TOKEN_ENV
        ))),
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}
