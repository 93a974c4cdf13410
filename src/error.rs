//! Error types for flixcore

use std::time::Duration;
use thiserror::Error;

/// Result type alias for flixcore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Sqlite(String),

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Storage quota exceeded writing {bytes} bytes to {cache}")]
    QuotaExceeded { cache: String, bytes: usize },

    #[error("Failed to encode cache entry: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Sqlite(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Progress document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Progress record not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Invalid store response: {0}")]
    InvalidResponse(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Progress subscription closed")]
    Closed,
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            StoreError::Network("Failed to connect to progress API".to_string())
        } else if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Network errors seen by the cache controller
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Network request timed out")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Run `flixcore init` to set up.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("Progress API not configured. Set `api.base_url` or run `flixcore init`.")]
    MissingApiUrl,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_names_cache() {
        let err = CacheError::QuotaExceeded {
            cache: "flixcore-runtime-v1".to_string(),
            bytes: 2048,
        };
        let msg = err.to_string();
        assert!(msg.contains("flixcore-runtime-v1"));
        assert!(msg.contains("2048"));
    }

    #[test]
    fn test_store_error_rate_limit() {
        let err = StoreError::RateLimit(Duration::from_secs(30));
        let msg = err.to_string();
        assert!(msg.contains("Rate limit"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_store_error_invalid_response() {
        let err = StoreError::InvalidResponse("bad updatedAt".to_string());
        assert!(err.to_string().contains("bad updatedAt"));
    }

    #[test]
    fn test_config_error_not_found() {
        let err = ConfigError::NotFound;
        assert!(err.to_string().contains("flixcore init"));
    }

    #[test]
    fn test_config_error_missing_api_url() {
        let err = ConfigError::MissingApiUrl;
        assert!(err.to_string().contains("api.base_url"));
    }

    #[test]
    fn test_error_from_store_error() {
        let err: Error = StoreError::Closed.into();

        match err {
            Error::Store(StoreError::Closed) => (),
            _ => panic!("Expected Error::Store(StoreError::Closed)"),
        }
    }

    #[test]
    fn test_error_from_cache_error() {
        let err: Error = CacheError::NoHome.into();

        match err {
            Error::Cache(CacheError::NoHome) => (),
            _ => panic!("Expected Error::Cache(CacheError::NoHome)"),
        }
    }

    #[test]
    fn test_cache_error_from_sqlite_error() {
        let sqlite_err = rusqlite::Error::InvalidQuery;
        let err: CacheError = sqlite_err.into();

        match err {
            CacheError::Sqlite(_) => (),
            _ => panic!("Expected CacheError::Sqlite"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }
}
