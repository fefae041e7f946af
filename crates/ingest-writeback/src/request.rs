//! Write-back request and outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Column that always records when the outcome was written.
pub const SHIPPED_AT_COLUMN: &str = "shipped_at";

/// Format of the `shipped_at` value.
pub const SHIPPED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const TRACKING_NUMBER_COLUMN: &str = "tracking_number";

/// An outcome to persist for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackRequest {
    pub row_number: u64,
    /// Outcome columns and their values, in write order.
    pub fields: Vec<(String, String)>,
    /// Defaults to the current time.
    pub shipped_at: Option<DateTime<Utc>>,
}

impl WriteBackRequest {
    pub fn new(row_number: u64) -> Self {
        Self {
            row_number,
            fields: Vec::new(),
            shipped_at: None,
        }
    }

    /// The common case: a tracking number for one row.
    pub fn tracking(row_number: u64, tracking_number: impl Into<String>) -> Self {
        Self::new(row_number).with_field(TRACKING_NUMBER_COLUMN, tracking_number)
    }

    #[must_use]
    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_shipped_at(mut self, shipped_at: DateTime<Utc>) -> Self {
        self.shipped_at = Some(shipped_at);
        self
    }

    /// Fields followed by `shipped_at`, rendered for writing.
    pub fn outcome_columns(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        let shipped_at = self.shipped_at.unwrap_or(now).format(SHIPPED_AT_FORMAT).to_string();
        self.fields
            .iter()
            .filter(|(column, _)| column != SHIPPED_AT_COLUMN)
            .cloned()
            .chain([(SHIPPED_AT_COLUMN.to_string(), shipped_at)])
            .collect()
    }
}

/// What a successful write-back did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBackOutcome {
    pub row_number: u64,
    pub fields: Vec<(String, String)>,
    pub shipped_at: String,
    /// File path or table name that was written.
    pub destination: String,
    pub columns_added: Vec<String>,
}
