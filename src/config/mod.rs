//! Configuration management for flixcore

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Offline cache controller settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Watch-progress reconciler settings
    #[serde(default)]
    pub progress: ProgressSettings,

    /// Remote progress API settings
    #[serde(default)]
    pub api: ApiSettings,
}

/// Offline cache controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache version suffix; bumping it retires every old bucket on activate
    #[serde(default = "default_cache_version")]
    pub version: String,

    /// Origin the controller serves (scheme + host + port)
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Cross-origin hosts that are still cached (fonts, CDN)
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Max age of runtime/API bucket entries
    #[serde(default = "default_runtime_max_age")]
    pub runtime_max_age_secs: u64,

    /// Page served to navigations when neither network nor cache can answer
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Critical assets fetched into the static bucket on install
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Optional storage quota in bytes across all buckets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<u64>,

    /// Cache directory override (defaults to ~/.cache/flixcore)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Watch-progress reconciler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSettings {
    /// Fraction of the duration at which a video counts as completed
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f64,

    /// Autosave period while playing
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,

    /// Consecutive failed writes before the session reports itself failing
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Local progress database override (defaults to ~/.local/share/flixcore/progress.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Remote progress API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the progress API (e.g. https://comunidadeflix.com)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Polling period for remote progress subscriptions
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec![
        "fonts.googleapis.com".to_string(),
        "fonts.gstatic.com".to_string(),
        "cdn.jsdelivr.net".to_string(),
    ]
}

fn default_runtime_max_age() -> u64 {
    5 * 60
}

fn default_offline_page() -> String {
    "/offline".to_string()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/offline",
        "/manifest.json",
        "/icons/icon-72x72.png",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_completion_threshold() -> f64 {
    0.9
}

fn default_save_interval_ms() -> u64 {
    10_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    15
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            version: default_cache_version(),
            origin: default_origin(),
            allowed_hosts: default_allowed_hosts(),
            runtime_max_age_secs: default_runtime_max_age(),
            offline_page: default_offline_page(),
            precache: default_precache(),
            quota_bytes: None,
            dir: None,
        }
    }
}

impl CacheSettings {
    pub fn runtime_max_age(&self) -> Duration {
        Duration::from_secs(self.runtime_max_age_secs)
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
            save_interval_ms: default_save_interval_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            db_path: None,
        }
    }
}

impl ProgressSettings {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".flixcore").join("config.yaml"))
    }

    /// Resolve an optional override against the default path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from an optional path, falling back to defaults
    /// when the file does not exist yet.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        match Self::load_from(path) {
            Ok(config) => Ok(config),
            Err(crate::error::Error::Config(ConfigError::NotFound)) => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to an optional path
    pub fn save_at(&self, path: Option<&str>) -> Result<()> {
        self.save_to(Self::resolve_path(path)?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // The file may carry an API token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Validate value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let threshold = self.progress.completion_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "progress.completion_threshold must be in (0, 1], got {}",
                threshold
            ))
            .into());
        }
        if self.progress.save_interval_ms == 0 {
            return Err(
                ConfigError::Invalid("progress.save_interval_ms must be positive".into()).into(),
            );
        }
        if self.cache.version.trim().is_empty() {
            return Err(ConfigError::Invalid("cache.version must not be empty".into()).into());
        }
        if reqwest::Url::parse(&self.cache.origin).is_err() {
            return Err(ConfigError::Invalid(format!(
                "cache.origin is not a valid URL: {}",
                self.cache.origin
            ))
            .into());
        }
        Ok(())
    }

    /// Base URL of the remote progress API, if configured
    pub fn require_api_url(&self) -> Result<&str> {
        self.api
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingApiUrl.into())
    }
}
