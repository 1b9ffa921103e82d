//! Appender and Scan Configuration

use serde::{Deserialize, Serialize};

/// Producer identity stamped into the header of every page an appender
/// writes. The rollover threshold itself lives on the volume
/// (`Volume::page_size_bytes`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppenderConfig {
    /// Application tag recorded in each page header.
    pub app: String,

    /// Host tag recorded in each page header.
    pub host: String,
}

impl AppenderConfig {
    pub fn new(app: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            host: host.into(),
        }
    }
}

/// Settings for batched page scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Pages handed to a worker per batch.
    pub batch_pages: usize,

    /// Decode worker count for single-volume scans.
    pub workers: usize,

    /// Skip unreadable pages instead of failing the scan.
    pub tolerant: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_pages: 16,
            workers: 4,
            tolerant: false,
        }
    }
}

impl ScanOptions {
    pub fn tolerant() -> Self {
        Self {
            tolerant: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ScanOptions::default();
        assert_eq!(options.batch_pages, 16);
        assert_eq!(options.workers, 4);
        assert!(!options.tolerant);
        assert!(ScanOptions::tolerant().tolerant);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options: ScanOptions = serde_json::from_str(r#"{"workers": 8}"#).unwrap();
        assert_eq!(options.workers, 8);
        assert_eq!(options.batch_pages, 16);

        let config: AppenderConfig = serde_json::from_str(r#"{"app": "ingest"}"#).unwrap();
        assert_eq!(config.app, "ingest");
        assert_eq!(config.host, "");
    }
}
