//! Recommender quality metrics.
//!
//! | Metric | Population | Rounding |
//! |--------|-----------|----------|
//! | `catalog_coverage`, `user_coverage` | all / registered recommendations | 2 |
//! | `diversity` (Shannon entropy, bits) | recommendations of known items | 4 |
//! | `diversity_gini` | recommendations of known items, zero-padded to the catalog | 4 |
//! | `novelty` | recommended items with at least one registered view | 4 |
//! | `accuracy` | registered users × catalog items | 4 |
//! | `hit_rate` | registered users | 5 |
//! | `click_through_rate` (%) | actions leaving a recommendation surface | 2 |
//! | `top5_*` | registered views / registered recommendations | 2 (perc) |
//!
//! Top-k rankings sort by count descending; equal counts are ordered by
//! ascending id.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::json;

use crate::context::EvalContext;
use crate::error::ComputationError;
use crate::models::{Item, Schema, Taxonomy, User};
use crate::paths::RECOMMENDATION_PANEL;
use crate::registry::{ComputeResult, Computation, Registry};
use crate::statistics::{percentage, round_to};

/// Separator of hierarchical taxonomy names in the current schema.
pub const HIERARCHY_SEPARATOR: char = '>';

// ─── Algorithms ─────────────────────────────────────────────────────

/// Shannon entropy (base 2) of a count distribution.
///
/// `None` when all counts are zero.
pub fn shannon_entropy(counts: &[usize]) -> Option<f64> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return None;
    }
    let total = total as f64;
    let entropy = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>();
    Some(if entropy > 0.0 { entropy } else { 0.0 })
}

/// Gini index of recommendation counts over a catalog of `num_items`.
///
/// Items never recommended contribute zero counts. `None` when all counts
/// are zero; 0 for a catalog of a single item.
pub fn gini_index(counts: &[usize], num_items: usize) -> Option<f64> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return None;
    }
    let n = num_items.max(counts.len());
    if n <= 1 {
        return Some(0.0);
    }
    let mut sorted: Vec<usize> = vec![0; n - counts.len()];
    let mut recommended = counts.to_vec();
    recommended.sort_unstable();
    sorted.extend(recommended);

    let total = total as f64;
    let n_f = n as f64;
    let sum: f64 = sorted
        .iter()
        .enumerate()
        .map(|(j, &c)| (2.0 * (j as f64 + 1.0) - n_f - 1.0) * (c as f64 / total))
        .sum();
    Some((sum / (n_f - 1.0)).clamp(0.0, 1.0))
}

/// Mean self-information of the recommended items, from their view counts.
///
/// Items with no views are excluded from the population. `None` if no
/// recommended item was viewed.
pub fn novelty_score<'a, I>(recommended: I, views: &HashMap<&str, usize>) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let total: usize = views.values().sum();
    if total == 0 {
        return None;
    }
    let mut population = 0usize;
    let mut information = 0.0;
    for item in recommended {
        let viewed = views.get(item).copied().unwrap_or(0);
        if viewed == 0 {
            continue;
        }
        let p = viewed as f64 / total as f64;
        information += -p.log2();
        population += 1;
    }
    if population == 0 {
        None
    } else {
        Some(information / population as f64)
    }
}

/// Fraction of users with at least one accessed item among their
/// recommendations. `None` for no users.
pub fn hit_rate_score(users: &[User], recommended: &HashMap<&str, HashSet<&str>>) -> Option<f64> {
    if users.is_empty() {
        return None;
    }
    let hits = users
        .iter()
        .filter(|user| {
            recommended.get(user.id.as_str()).is_some_and(|recs| {
                user.accessed_resources
                    .iter()
                    .any(|id| recs.contains(id.as_str()))
            })
        })
        .count();
    Some(hits as f64 / users.len() as f64)
}

/// Mean per-user agreement between accessed and recommended membership
/// over the catalog.
///
/// For each user, the score is the fraction of catalog items that are
/// either both accessed and recommended or neither. `None` for no users or
/// an empty catalog.
pub fn accuracy_score(
    catalog: &[&str],
    users: &[User],
    recommended: &HashMap<&str, HashSet<&str>>,
) -> Option<f64> {
    if users.is_empty() || catalog.is_empty() {
        return None;
    }
    let empty = HashSet::new();
    let total: f64 = users
        .iter()
        .map(|user| {
            let recs = recommended.get(user.id.as_str()).unwrap_or(&empty);
            let matches = catalog
                .iter()
                .filter(|id| user.accessed_resources.contains(**id) == recs.contains(**id))
                .count();
            matches as f64 / catalog.len() as f64
        })
        .sum();
    Some(total / users.len() as f64)
}

/// One row of a top-k ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub value: usize,
    pub perc: f64,
}

/// Top `k` entries of a count map: count descending, then id ascending.
pub fn top_k(counts: &BTreeMap<String, usize>, k: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.iter().map(|(id, c)| (id.clone(), *c)).collect();
    // stable: BTreeMap order (ascending id) survives among equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(k);
    ranked
}

// ─── Populations ────────────────────────────────────────────────────

fn recommendation_counts(ctx: &EvalContext) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for id in ctx.recommendations().iter().filter_map(|r| r.resource_id.id()) {
        *counts.entry(id).or_insert(0) += 1;
    }
    counts
}

/// Known items recommended to each registered user.
fn recommended_per_user(ctx: &EvalContext) -> HashMap<&str, HashSet<&str>> {
    let mut map: HashMap<&str, HashSet<&str>> = HashMap::new();
    for r in ctx.recommendations().iter().filter(|r| r.registered) {
        if let Some(id) = r.resource_id.id() {
            map.entry(r.user_id.as_str()).or_default().insert(id);
        }
    }
    map
}

/// Target ids of item views by registered users.
fn viewed_item_ids(ctx: &EvalContext) -> Vec<&str> {
    ctx.user_actions()
        .iter()
        .filter(|a| a.registered && ctx.paths.is_view(a))
        .filter_map(|a| a.target_resource_id.id())
        .collect()
}

/// Item ids of recommendations to registered users.
fn recommended_item_ids(ctx: &EvalContext) -> Vec<&str> {
    ctx.recommendations()
        .iter()
        .filter(|r| r.registered)
        .filter_map(|r| r.resource_id.id())
        .collect()
}

fn empty(what: &'static str) -> ComputationError {
    ComputationError::EmptyPopulation(what)
}

// ─── Coverage ───────────────────────────────────────────────────────

pub fn catalog_coverage(ctx: &EvalContext) -> ComputeResult {
    let recommended = recommendation_counts(ctx).len();
    Ok(json!(percentage(recommended, ctx.items().len())))
}

pub fn user_coverage(ctx: &EvalContext) -> ComputeResult {
    let recommended = recommended_per_user(ctx);
    let covered = ctx
        .users()
        .iter()
        .filter(|u| recommended.contains_key(u.id.as_str()))
        .count();
    Ok(json!(percentage(covered, ctx.users().len())))
}

// ─── Diversity and novelty ──────────────────────────────────────────

pub fn diversity(ctx: &EvalContext) -> ComputeResult {
    let counts: Vec<usize> = recommendation_counts(ctx).into_values().collect();
    let entropy = shannon_entropy(&counts).ok_or_else(|| empty("no recommended items"))?;
    Ok(json!(round_to(entropy, 4)))
}

pub fn diversity_gini(ctx: &EvalContext) -> ComputeResult {
    let counts: Vec<usize> = recommendation_counts(ctx).into_values().collect();
    let gini = gini_index(&counts, ctx.items().len()).ok_or_else(|| empty("no recommended items"))?;
    Ok(json!(round_to(gini, 4)))
}

pub fn novelty(ctx: &EvalContext) -> ComputeResult {
    let mut views: HashMap<&str, usize> = HashMap::new();
    for id in viewed_item_ids(ctx) {
        *views.entry(id).or_insert(0) += 1;
    }
    let recommended = recommendation_counts(ctx).into_keys();
    let score = novelty_score(recommended, &views).ok_or_else(|| empty("no viewed recommended items"))?;
    Ok(json!(round_to(score, 4)))
}

// ─── Accuracy and hit rate ──────────────────────────────────────────

pub fn accuracy(ctx: &EvalContext) -> ComputeResult {
    let catalog: Vec<&str> = ctx.items().iter().map(|i| i.id.as_str()).collect();
    let score = accuracy_score(&catalog, ctx.users(), &recommended_per_user(ctx))
        .ok_or_else(|| empty("no users or items"))?;
    Ok(json!(round_to(score, 4)))
}

pub fn hit_rate(ctx: &EvalContext) -> ComputeResult {
    let score =
        hit_rate_score(ctx.users(), &recommended_per_user(ctx)).ok_or_else(|| empty("no users"))?;
    Ok(json!(round_to(score, 5)))
}

// ─── Click-through rate ─────────────────────────────────────────────

pub fn click_through_rate(ctx: &EvalContext) -> ComputeResult {
    let from_surface: Vec<_> = ctx
        .user_actions()
        .iter()
        .filter(|a| ctx.paths.is_recommendation_surface(&a.source_path))
        .collect();
    let clicks = from_surface
        .iter()
        .filter(|a| a.panel == RECOMMENDATION_PANEL)
        .count();
    Ok(json!(percentage(clicks, from_surface.len())))
}

// ─── Top-k ──────────────────────────────────────────────────────────

fn top_items(ctx: &EvalContext, ids: Vec<&str>) -> ComputeResult {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id.to_string()).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();
    let ranked: Vec<Ranked> = top_k(&counts, ctx.top_k)
        .into_iter()
        .map(|(id, value)| {
            let item = ctx.item(&id);
            Ranked {
                name: item.map(|i| i.name.clone()).unwrap_or_default(),
                path: item.map(|i| i.path.clone()),
                id,
                value,
                perc: percentage(value, total),
            }
        })
        .collect();
    Ok(json!(ranked))
}

#[derive(Clone, Copy)]
enum Facet {
    Category,
    ScientificDomain,
}

impl Facet {
    fn label(self) -> &'static str {
        match self {
            Facet::Category => "category",
            Facet::ScientificDomain => "scientific_domain",
        }
    }

    fn values(self, item: &Item) -> Option<&Vec<String>> {
        match self {
            Facet::Category => item.category.as_ref(),
            Facet::ScientificDomain => item.scientific_domain.as_ref(),
        }
    }

    fn taxonomy(self, ctx: &EvalContext) -> &[Taxonomy] {
        match self {
            Facet::Category => &ctx.tables.categories,
            Facet::ScientificDomain => &ctx.tables.scientific_domains,
        }
    }
}

/// Explode the facet values of the given items into `(id, name)` labels.
///
/// Legacy values are taxonomy ids resolved through the taxonomy table;
/// current values are names, with hierarchical entries dropped.
fn facet_labels(
    ctx: &EvalContext,
    facet: Facet,
    ids: &[&str],
) -> Result<Vec<(String, String)>, ComputationError> {
    let names: HashMap<&str, &str> = facet
        .taxonomy(ctx)
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let mut labels = Vec::new();
    for id in ids {
        let Some(values) = ctx.item(id).and_then(|i| facet.values(i)) else {
            continue;
        };
        for value in values {
            match ctx.schema {
                Schema::Legacy => {
                    if names.is_empty() {
                        return Err(ComputationError::MissingTaxonomy(facet.label()));
                    }
                    let name = names.get(value.as_str()).copied().unwrap_or(value.as_str());
                    labels.push((value.clone(), name.to_string()));
                }
                Schema::Current => {
                    if value.contains(HIERARCHY_SEPARATOR) {
                        continue;
                    }
                    labels.push((value.clone(), value.clone()));
                }
            }
        }
    }
    Ok(labels)
}

fn top_facet(ctx: &EvalContext, facet: Facet, ids: Vec<&str>) -> ComputeResult {
    let labels = facet_labels(ctx, facet, &ids)?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut names: HashMap<String, String> = HashMap::new();
    for (id, name) in labels {
        *counts.entry(id.clone()).or_insert(0) += 1;
        names.entry(id).or_insert(name);
    }
    let total: usize = counts.values().sum();
    let ranked: Vec<Ranked> = top_k(&counts, ctx.top_k)
        .into_iter()
        .map(|(id, value)| Ranked {
            name: names.get(&id).cloned().unwrap_or_else(|| id.clone()),
            path: None,
            id,
            value,
            perc: percentage(value, total),
        })
        .collect();
    Ok(json!(ranked))
}

pub fn top5_items_viewed(ctx: &EvalContext) -> ComputeResult {
    top_items(ctx, viewed_item_ids(ctx))
}

pub fn top5_items_recommended(ctx: &EvalContext) -> ComputeResult {
    top_items(ctx, recommended_item_ids(ctx))
}

pub fn top5_categories_viewed(ctx: &EvalContext) -> ComputeResult {
    top_facet(ctx, Facet::Category, viewed_item_ids(ctx))
}

pub fn top5_categories_recommended(ctx: &EvalContext) -> ComputeResult {
    top_facet(ctx, Facet::Category, recommended_item_ids(ctx))
}

pub fn top5_scientific_domains_viewed(ctx: &EvalContext) -> ComputeResult {
    top_facet(ctx, Facet::ScientificDomain, viewed_item_ids(ctx))
}

pub fn top5_scientific_domains_recommended(ctx: &EvalContext) -> ComputeResult {
    top_facet(ctx, Facet::ScientificDomain, recommended_item_ids(ctx))
}

/// Register every metric, in report order.
pub fn register(registry: &mut Registry) {
    let all = [
        Computation::metric(
            "catalog_coverage",
            "The percentage (%) of catalog items that were recommended at least once",
            catalog_coverage,
        ),
        Computation::metric(
            "user_coverage",
            "The percentage (%) of registered users that received at least one recommendation",
            user_coverage,
        ),
        Computation::metric(
            "diversity",
            "The Shannon entropy (bits) of the distribution of recommendations over items; higher is more diverse",
            diversity,
        ),
        Computation::metric(
            "diversity_gini",
            "The Gini index of the distribution of recommendations over the catalog; 0 is uniform, 1 is fully concentrated",
            diversity_gini,
        ),
        Computation::metric(
            "novelty",
            "The mean self-information (bits) of recommended items, based on how often registered users viewed them",
            novelty,
        ),
        Computation::metric(
            "accuracy",
            "The mean fraction of catalog items on which a user's accessed and recommended sets agree",
            accuracy,
        ),
        Computation::metric(
            "hit_rate",
            "The ratio of user hits to the total number of registered users (user hit: a user that accessed at least one item that was also recommended to them)",
            hit_rate,
        ),
        Computation::metric(
            "click_through_rate",
            "The percentage (%) of actions on recommendation surfaces that originated from the recommendation panel",
            click_through_rate,
        ),
        Computation::metric(
            "top5_items_viewed",
            "The most viewed items by registered users",
            top5_items_viewed,
        ),
        Computation::metric(
            "top5_items_recommended",
            "The most recommended items to registered users",
            top5_items_recommended,
        ),
        Computation::metric(
            "top5_categories_viewed",
            "The categories of the most viewed items by registered users",
            top5_categories_viewed,
        ),
        Computation::metric(
            "top5_categories_recommended",
            "The categories of the most recommended items to registered users",
            top5_categories_recommended,
        ),
        Computation::metric(
            "top5_scientific_domains_viewed",
            "The scientific domains of the most viewed items by registered users",
            top5_scientific_domains_viewed,
        ),
        Computation::metric(
            "top5_scientific_domains_recommended",
            "The scientific domains of the most recommended items to registered users",
            top5_scientific_domains_recommended,
        ),
    ];
    for computation in all {
        registry.register(computation);
    }
}
