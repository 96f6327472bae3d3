//! Runtime configuration for inat-classify
//!
//! Converts the TOML sections from `inat_common::config` into the typed
//! settings the services consume.

use inat_common::config::{RetryConfig, ScoringMode, TomlConfig};
use inat_common::{Error, Result};
use std::num::NonZeroU32;
use std::time::Duration;

/// User-Agent sent with every request
pub const USER_AGENT: &str = concat!("inat-classify/", env!("CARGO_PKG_VERSION"));

/// Endpoint URLs derived from the API base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn upload_url(&self) -> String {
        format!("{}/photos", self.base_url)
    }

    pub fn score_url(&self) -> String {
        format!("{}/computervision/score_image", self.base_url)
    }

    pub fn taxon_url(&self, taxon_id: u64) -> String {
        format!("{}/taxa/{}", self.base_url, taxon_id)
    }

    pub fn token_check_url(&self) -> String {
        format!("{}/users/me", self.base_url)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(TomlConfig::default().api.base_url)
    }
}

/// Retry policy for transient transport failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff before attempt `attempt + 1` (attempt is 1-based), doubling and capped
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// `None` disables the client-side quota
    pub requests_per_minute: Option<NonZeroU32>,
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let api = TomlConfig::default().api;
        Self {
            timeout: Duration::from_secs(api.timeout_secs),
            connect_timeout: Duration::from_secs(api.connect_timeout_secs),
            requests_per_minute: NonZeroU32::new(api.requests_per_minute),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Everything the pipeline and batch runner need
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub endpoints: Endpoints,
    pub transport: TransportSettings,
    pub retry: RetryPolicy,
    pub scoring_mode: ScoringMode,
    pub min_confidence: Option<f64>,
    pub locale: Option<String>,
    pub pacing: Duration,
    pub recursive: bool,
    pub checkpoint_every: usize,
}

impl PipelineConfig {
    /// Validate and convert the TOML configuration
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        let base_url = config.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api.base_url must be an http(s) URL, got {:?}",
                base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(Error::Config("api.timeout_secs must be > 0".to_string()));
        }

        if config.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be >= 1".to_string()));
        }

        if let Some(min) = config.classifier.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(Error::Config(format!(
                    "classifier.min_confidence must be within [0, 1], got {}",
                    min
                )));
            }
        }

        let locale = match config.api.locale.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(locale) if is_valid_locale(locale) => Some(locale.to_string()),
            Some(locale) => {
                return Err(Error::Config(format!("api.locale is not a locale tag: {:?}", locale)))
            }
        };

        Ok(Self {
            endpoints: Endpoints::new(base_url),
            transport: TransportSettings {
                timeout: Duration::from_secs(config.api.timeout_secs),
                connect_timeout: Duration::from_secs(config.api.connect_timeout_secs.max(1)),
                requests_per_minute: NonZeroU32::new(config.api.requests_per_minute),
                user_agent: USER_AGENT.to_string(),
            },
            retry: RetryPolicy::from(&config.retry),
            scoring_mode: config.classifier.scoring_mode,
            min_confidence: config.classifier.min_confidence,
            locale,
            pacing: Duration::from_millis(config.batch.pacing_ms),
            recursive: config.batch.recursive,
            checkpoint_every: config.batch.checkpoint_every,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Compiled defaults always validate
        Self {
            endpoints: Endpoints::default(),
            transport: TransportSettings::default(),
            retry: RetryPolicy::default(),
            scoring_mode: ScoringMode::default(),
            min_confidence: None,
            locale: None,
            pacing: Duration::from_millis(TomlConfig::default().batch.pacing_ms),
            recursive: true,
            checkpoint_every: TomlConfig::default().batch.checkpoint_every,
        }
    }
}

/// Letters, digits, `-` and `_` only (e.g. `en`, `zh-CN`)
fn is_valid_locale(locale: &str) -> bool {
    !locale.is_empty()
        && locale.len() <= 35
        && locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
