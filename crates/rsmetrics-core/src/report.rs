//! The report document produced by one evaluation run.
//!
//! Serialized as:
//!
//! ```json
//! { "timestamp": "...", "provider": "...", "schema": "legacy" | "current",
//!   "name": "...",
//!   "statistics": [{"name", "value", "doc"}],
//!   "metrics": [{"name", "value", "doc"}],
//!   "errors": ["..."] }
//! ```
//!
//! Reports are stored upsert-by-name: a later run with the same provider
//! and tag replaces the earlier report.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Schema;
use crate::registry::{Entry, Evaluation};

/// A complete evaluation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Generation time, RFC 3339.
    pub timestamp: String,
    pub provider: String,
    pub schema: Schema,
    pub name: String,
    pub statistics: Vec<Entry>,
    pub metrics: Vec<Entry>,
    /// Names of computations that failed; their values are null.
    pub errors: Vec<String>,
}

/// Report name for a provider and optional tag: `provider` or
/// `provider - tag`.
pub fn report_name(provider: &str, tag: Option<&str>) -> String {
    match tag.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tag) => format!("{} - {}", provider, tag),
        None => provider.to_string(),
    }
}

impl Report {
    /// Assemble a report from an executed registry.
    pub fn assemble(
        provider: &str,
        schema: Schema,
        tag: Option<&str>,
        evaluation: Evaluation,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            provider: provider.to_string(),
            schema,
            name: report_name(provider, tag),
            statistics: evaluation.statistics,
            metrics: evaluation.metrics,
            errors: evaluation.errors,
        }
    }

    pub fn statistic(&self, name: &str) -> Option<&Value> {
        self.statistics
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.metrics.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            name: self.name.clone(),
            provider: self.provider.clone(),
            schema: self.schema,
            timestamp: self.timestamp.clone(),
            errors: self.errors.len(),
        }
    }
}

/// One line of the stored-report listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub name: String,
    pub provider: String,
    pub schema: Schema,
    pub timestamp: String,
    pub errors: usize,
}
