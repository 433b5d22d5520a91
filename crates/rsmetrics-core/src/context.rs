//! The read-only context every computation receives.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{Item, Recommendation, Schema, Taxonomy, Timestamped, User, UserAction};
use crate::paths::PathRules;

/// Default number of entries in top-k aggregations.
pub const DEFAULT_TOP_K: usize = 5;

/// Canonical tables of one evaluation run.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    /// Active, deduplicated items.
    pub items: Vec<Item>,
    /// Registered users derived from the actions in the window.
    pub users: Vec<User>,
    /// Actions in the window, before catalog filtering.
    pub user_actions_all: Vec<UserAction>,
    /// Actions in the window whose resources are in the catalog.
    pub user_actions: Vec<UserAction>,
    /// Recommendations in the window, catalog and user filtered.
    pub recommendations: Vec<Recommendation>,
    pub categories: Vec<Taxonomy>,
    pub scientific_domains: Vec<Taxonomy>,
}

/// Shared, read-only input of every statistic and metric.
///
/// Built once per run; computations only read from it.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub schema: Schema,
    pub provider: String,
    pub top_k: usize,
    pub paths: PathRules,
    pub tables: Tables,
    item_index: HashMap<String, usize>,
}

impl EvalContext {
    pub fn new(schema: Schema, provider: &str, tables: Tables, paths: PathRules) -> Self {
        let item_index = tables
            .items
            .iter()
            .enumerate()
            .map(|(pos, item)| (item.id.clone(), pos))
            .collect();
        Self {
            schema,
            provider: provider.to_string(),
            top_k: DEFAULT_TOP_K,
            paths,
            tables,
            item_index,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn items(&self) -> &[Item] {
        &self.tables.items
    }

    pub fn users(&self) -> &[User] {
        &self.tables.users
    }

    pub fn user_actions_all(&self) -> &[UserAction] {
        &self.tables.user_actions_all
    }

    pub fn user_actions(&self) -> &[UserAction] {
        &self.tables.user_actions
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.tables.recommendations
    }

    /// Look up an active item by id.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.item_index.get(id).map(|&pos| &self.tables.items[pos])
    }

    /// Earliest and latest event time across filtered actions and
    /// recommendations.
    pub fn event_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let times = self
            .tables
            .user_actions
            .iter()
            .map(Timestamped::timestamp)
            .chain(self.tables.recommendations.iter().map(Timestamped::timestamp));
        times.fold(None, |span, ts| match span {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
    }
}
