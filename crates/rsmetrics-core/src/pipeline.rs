//! One evaluation run, end to end.
//!
//! ```text
//! Store ──load──▶ RawTables ──prepare──▶ EvalContext ──Registry::execute──▶ Report
//!                            normalize
//!                            dedup / type / lifetime
//!                            window
//!                            derive users
//!                            catalog + identity filter
//!                            insufficient-data check
//! ```
//!
//! The run is sequential. Loading is the only async step; everything after
//! it is pure, in-memory work.

use chrono::Utc;

use crate::context::{EvalContext, Tables, DEFAULT_TOP_K};
use crate::error::EvaluationError;
use crate::filter::{derive_users, filter_recommendations, filter_user_actions, within_window};
use crate::models::{Item, ItemType, RawRecommendation, RawUserAction, Schema, Taxonomy, Window};
use crate::normalize::{
    active_items, latest_items, normalize_recommendations, normalize_user_actions,
    RecommendationShape,
};
use crate::paths::PathRules;
use crate::registry::Registry;
use crate::report::Report;
use crate::store::Store;

/// Everything that parameterizes one run.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    pub provider: String,
    pub schema: Schema,
    pub window: Window,
    pub tag: Option<String>,
    /// Allowed item types; empty allows every type.
    pub item_types: Vec<ItemType>,
    pub shape: RecommendationShape,
    pub top_k: usize,
    pub paths: PathRules,
}

impl EvaluationOptions {
    /// Options with an unbounded window, no tag and the schema's built-in
    /// path rules.
    pub fn new(provider: &str, schema: Schema) -> Self {
        Self {
            provider: provider.to_string(),
            schema,
            window: Window::unbounded(),
            tag: None,
            item_types: Vec::new(),
            shape: RecommendationShape::default(),
            top_k: DEFAULT_TOP_K,
            paths: PathRules::default_for(schema),
        }
    }
}

/// Input tables as read from the store.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub items: Vec<Item>,
    pub user_actions: Vec<RawUserAction>,
    pub recommendations: Vec<RawRecommendation>,
    pub categories: Vec<Taxonomy>,
    pub scientific_domains: Vec<Taxonomy>,
}

/// Read every input table for a run.
pub async fn load(
    store: &dyn Store,
    options: &EvaluationOptions,
) -> Result<RawTables, EvaluationError> {
    tracing::info!("Loading items for provider {}...", options.provider);
    let items = store.load_items(&options.provider).await?;
    tracing::info!("Loading user actions...");
    let user_actions = store.load_user_actions(&options.window).await?;
    tracing::info!("Loading recommendations...");
    let recommendations = store
        .load_recommendations(&options.provider, &options.window)
        .await?;
    tracing::info!("Loading taxonomies...");
    let categories = store.load_categories().await?;
    let scientific_domains = store.load_scientific_domains().await?;
    tracing::debug!(
        items = items.len(),
        user_actions = user_actions.len(),
        recommendations = recommendations.len(),
        categories = categories.len(),
        scientific_domains = scientific_domains.len(),
        "Loaded input tables"
    );
    Ok(RawTables {
        items,
        user_actions,
        recommendations,
        categories,
        scientific_domains,
    })
}

/// Normalize and filter raw tables into the computation context.
///
/// Fails with [`EvaluationError::InsufficientData`] when any of items,
/// users, user actions or recommendations ends up empty; each empty table
/// is logged.
pub fn prepare(raw: RawTables, options: &EvaluationOptions) -> Result<EvalContext, EvaluationError> {
    let schema = options.schema;

    let items = active_items(latest_items(raw.items), &options.window, &options.item_types);

    let user_actions_all = within_window(
        normalize_user_actions(schema, &raw.user_actions),
        &options.window,
    );
    let recommendations = within_window(
        normalize_recommendations(schema, &raw.recommendations, options.shape),
        &options.window,
    );

    let users = derive_users(&user_actions_all);
    let user_actions = filter_user_actions(&user_actions_all, &items);
    let recommendations = filter_recommendations(&recommendations, &users, &items);

    let mut missing = Vec::new();
    for (table, empty, message) in [
        ("user_actions", user_actions.is_empty(), "No user actions found"),
        ("recommendations", recommendations.is_empty(), "No recommendations found"),
        ("items", items.is_empty(), "No items found"),
        ("users", users.is_empty(), "No users found"),
    ] {
        if empty {
            tracing::error!(table, "{}", message);
            missing.push(table.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(EvaluationError::InsufficientData(missing));
    }

    tracing::info!(
        items = items.len(),
        users = users.len(),
        user_actions = user_actions.len(),
        recommendations = recommendations.len(),
        "Prepared evaluation tables"
    );

    let tables = Tables {
        items,
        users,
        user_actions_all,
        user_actions,
        recommendations,
        categories: raw.categories,
        scientific_domains: raw.scientific_domains,
    };
    Ok(EvalContext::new(schema, &options.provider, tables, options.paths.clone())
        .with_top_k(options.top_k))
}

/// Run a full evaluation and assemble the report. Nothing is persisted.
pub async fn evaluate(
    store: &dyn Store,
    options: &EvaluationOptions,
    registry: &Registry,
) -> Result<Report, EvaluationError> {
    let raw = load(store, options).await?;
    let ctx = prepare(raw, options)?;
    let evaluation = registry.execute(&ctx);
    if !evaluation.errors.is_empty() {
        tracing::warn!(
            failed = evaluation.errors.len(),
            "Some computations failed: {}",
            evaluation.errors.join(", ")
        );
    }
    Ok(Report::assemble(
        &options.provider,
        options.schema,
        options.tag.as_deref(),
        evaluation,
        Utc::now(),
    ))
}
