//! Session configuration

use std::path::Path;

use ingest_adapters::ImportLimits;
use ingest_adapters::request::{DEFAULT_LARGE_TABLE_THRESHOLD, DEFAULT_MAX_DOCUMENT_BYTES};
use ingest_adapters::sniff::{DEFAULT_SNIFF_LINES, MAX_SNIFF_LINES};
use ingest_ir::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Limits and defaults for one [`IngestSession`](crate::IngestSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Whole-document size guard for JSON, XML and EDI
    pub max_document_bytes: u64,
    /// Unfiltered database imports above this many rows are rejected
    pub large_table_threshold: u64,
    /// Nesting depth flattened before the remainder is serialized as JSON text
    pub flatten_max_depth: usize,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
    /// Non-null cells sampled per column when typing spreadsheets
    pub type_sample_size: usize,
    pub sniff_default_lines: usize,
    pub sniff_max_lines: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            large_table_threshold: DEFAULT_LARGE_TABLE_THRESHOLD,
            flatten_max_depth: DEFAULT_MAX_DEPTH,
            default_page_limit: 100,
            max_page_limit: 1000,
            type_sample_size: 100,
            sniff_default_lines: DEFAULT_SNIFF_LINES,
            sniff_max_lines: MAX_SNIFF_LINES,
        }
    }
}

impl IngestConfig {
    /// Parse a YAML document; absent keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| Error::Config {
            path: None,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| Error::Config {
            path: Some(path.display().to_string()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_page_limit == 0 || self.default_page_limit == 0 {
            return Err(Error::rejected("page limits must be at least 1"));
        }
        if self.sniff_max_lines == 0 {
            return Err(Error::rejected("sniff_max_lines must be at least 1"));
        }
        Ok(())
    }

    /// Limits handed to every adapter.
    pub fn import_limits(&self) -> ImportLimits {
        ImportLimits {
            max_document_bytes: self.max_document_bytes,
            large_table_threshold: self.large_table_threshold,
            flatten_max_depth: self.flatten_max_depth,
            type_sample_size: self.type_sample_size,
        }
    }

    /// Requested page size, defaulted and clamped to `1..=max_page_limit`.
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_limit)
            .clamp(1, self.max_page_limit.max(1))
    }

    pub fn sniff_lines(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.sniff_default_lines)
            .clamp(1, self.sniff_max_lines.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = IngestConfig::from_yaml_str("large_table_threshold: 50\nmax_page_limit: 20\n").unwrap();
        assert_eq!(config.large_table_threshold, 50);
        assert_eq!(config.max_page_limit, 20);
        assert_eq!(config.default_page_limit, 100);
        assert_eq!(config.max_document_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_page_limit_clamps() {
        let config = IngestConfig::default();
        assert_eq!(config.page_limit(None), 100);
        assert_eq!(config.page_limit(Some(0)), 1);
        assert_eq!(config.page_limit(Some(5000)), 1000);
        assert_eq!(config.sniff_lines(Some(10_000)), 500);
        assert_eq!(config.sniff_lines(None), 20);
    }

    #[test]
    fn test_bad_yaml_is_a_config_error() {
        let err = IngestConfig::from_yaml_str("max_page_limit: lots").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        let err = IngestConfig::from_yaml_str("max_page_limit: 0").unwrap_err();
        assert_eq!(err.kind(), ingest_ir::ErrorKind::ValidationRejected);
    }

    #[test]
    fn test_import_limits_follow_config() {
        let config = IngestConfig {
            flatten_max_depth: 2,
            ..IngestConfig::default()
        };
        assert_eq!(config.import_limits().flatten_max_depth, 2);
    }
}
