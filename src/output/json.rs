//! JSON output formatting
//!
//! Every `--format json` result is wrapped in a `{data, meta}` envelope so
//! scripts can tell which flixcore build produced it and when.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// Wall-clock time the output was rendered (RFC 3339)
    pub timestamp: String,

    /// flixcore version
    pub version: String,
}

impl<T> JsonOutput<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Format data as pretty-printed JSON inside the envelope
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressKey, ProgressRecord};

    fn record(video: &str, watched: f64) -> ProgressRecord {
        ProgressRecord {
            key: ProgressKey::new("u1", "c1", video),
            watched_seconds: watched,
            last_position: watched,
            total_seconds: 600.0,
            is_completed: false,
            updated_at: None,
        }
    }

    #[test]
    fn test_json_output_new() {
        let output = JsonOutput::new(vec!["flixcore-static-v1"]);

        assert_eq!(output.data, vec!["flixcore-static-v1"]);
        assert_eq!(output.meta.version, env!("CARGO_PKG_VERSION"));
        assert!(!output.meta.timestamp.is_empty());
    }

    #[test]
    fn test_format_json_uses_wire_field_names() {
        let result = format_json(&vec![record("v1", 120.0)]).unwrap();

        assert!(result.contains("\"data\""));
        assert!(result.contains("\"meta\""));
        assert!(result.contains("\"videoId\": \"v1\""));
        assert!(result.contains("\"watchedSeconds\": 120.0"));
    }

    #[test]
    fn test_format_json_empty_vec() {
        let items: Vec<ProgressRecord> = vec![];
        let result = format_json(&items).unwrap();

        assert!(result.contains("\"data\": []"));
    }

    #[test]
    fn test_format_json_parses_back() {
        let result = format_json(&vec![record("v1", 1.0), record("v2", 2.0)]).unwrap();
        let parsed: JsonOutput<Vec<ProgressRecord>> = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].key.video_id, "v2");
    }
}
