//! In-memory [`Store`] implementation for testing.
//!
//! Tables are plain `Vec`s behind `std::sync::RwLock`; reports are keyed by
//! name in a `BTreeMap`, which gives the listing its name order.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Item, RawRecommendation, RawUserAction, Taxonomy, Window};
use crate::report::{Report, ReportSummary};

use super::Store;

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<Item>>,
    user_actions: RwLock<Vec<RawUserAction>>,
    recommendations: RwLock<Vec<RawRecommendation>>,
    categories: RwLock<Vec<Taxonomy>>,
    scientific_domains: RwLock<Vec<Taxonomy>>,
    reports: RwLock<BTreeMap<String, Report>>,
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_items(&self, rows: impl IntoIterator<Item = Item>) -> Result<()> {
        self.items.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }

    pub fn insert_user_actions(&self, rows: impl IntoIterator<Item = RawUserAction>) -> Result<()> {
        self.user_actions.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }

    pub fn insert_recommendations(
        &self,
        rows: impl IntoIterator<Item = RawRecommendation>,
    ) -> Result<()> {
        self.recommendations.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }

    pub fn insert_categories(&self, rows: impl IntoIterator<Item = Taxonomy>) -> Result<()> {
        self.categories.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }

    pub fn insert_scientific_domains(&self, rows: impl IntoIterator<Item = Taxonomy>) -> Result<()> {
        self.scientific_domains.write().map_err(poisoned)?.extend(rows);
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_items(&self, provider: &str) -> Result<Vec<Item>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.iter().filter(|i| i.offered_by(provider)).cloned().collect())
    }

    async fn load_user_actions(&self, window: &Window) -> Result<Vec<RawUserAction>> {
        let actions = self.user_actions.read().map_err(poisoned)?;
        Ok(actions
            .iter()
            .filter(|a| window.contains(a.timestamp))
            .cloned()
            .collect())
    }

    async fn load_recommendations(
        &self,
        provider: &str,
        window: &Window,
    ) -> Result<Vec<RawRecommendation>> {
        let recs = self.recommendations.read().map_err(poisoned)?;
        Ok(recs
            .iter()
            .filter(|r| r.provider == provider && window.contains(r.timestamp))
            .cloned()
            .collect())
    }

    async fn load_categories(&self) -> Result<Vec<Taxonomy>> {
        Ok(self.categories.read().map_err(poisoned)?.clone())
    }

    async fn load_scientific_domains(&self) -> Result<Vec<Taxonomy>> {
        Ok(self.scientific_domains.read().map_err(poisoned)?.clone())
    }

    async fn upsert_report(&self, report: &Report) -> Result<()> {
        self.reports
            .write()
            .map_err(poisoned)?
            .insert(report.name.clone(), report.clone());
        Ok(())
    }

    async fn get_report(&self, name: &str) -> Result<Option<Report>> {
        Ok(self.reports.read().map_err(poisoned)?.get(name).cloned())
    }

    async fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        let reports = self.reports.read().map_err(poisoned)?;
        Ok(reports.values().map(Report::summary).collect())
    }
}
