//! Storage abstraction for rsmetrics.
//!
//! The [`Store`] trait covers everything an evaluation run reads and
//! writes: the five input tables and the report collection. The engine
//! never mutates the input tables.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Item, RawRecommendation, RawUserAction, Taxonomy, Window};
use crate::report::{Report, ReportSummary};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_items`](Store::load_items) | Every stored version of a provider's items |
/// | [`load_user_actions`](Store::load_user_actions) | Raw actions inside a window |
/// | [`load_recommendations`](Store::load_recommendations) | Raw recommendation lists of a provider inside a window |
/// | [`load_categories`](Store::load_categories) | Category taxonomy |
/// | [`load_scientific_domains`](Store::load_scientific_domains) | Scientific domain taxonomy |
/// | [`upsert_report`](Store::upsert_report) | Replace the report with the same name |
/// | [`get_report`](Store::get_report) | Fetch a report by name |
/// | [`list_reports`](Store::list_reports) | Summaries of every stored report |
#[async_trait]
pub trait Store: Send + Sync {
    /// All item versions offered by `provider`. Deduplication is left to
    /// the caller.
    async fn load_items(&self, provider: &str) -> Result<Vec<Item>>;

    async fn load_user_actions(&self, window: &Window) -> Result<Vec<RawUserAction>>;

    async fn load_recommendations(
        &self,
        provider: &str,
        window: &Window,
    ) -> Result<Vec<RawRecommendation>>;

    async fn load_categories(&self) -> Result<Vec<Taxonomy>>;

    async fn load_scientific_domains(&self) -> Result<Vec<Taxonomy>>;

    /// Store a report, replacing any report with the same name.
    async fn upsert_report(&self, report: &Report) -> Result<()>;

    async fn get_report(&self, name: &str) -> Result<Option<Report>>;

    /// Summaries of stored reports, ordered by name.
    async fn list_reports(&self) -> Result<Vec<ReportSummary>>;
}
