//! Schema reconciliation.
//!
//! Converts raw records of either schema into canonical records:
//!
//! | Schema | Registered when | Anonymous identity |
//! |--------|-----------------|--------------------|
//! | `current` | `aai_uid` is set | `unique_id` (per session) |
//! | `legacy` | `user_id != -1` | `"0"` (single bucket) |
//!
//! Resource ids are normalized to their string form, with every flavour of
//! "not resolved" (`null`, `-1`, empty) mapped to [`ResourceRef::Unknown`].
//! Item versions are collapsed latest-wins before anything joins on them.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::models::{
    Item, ItemType, RawRecommendation, RawUserAction, Recommendation, ResourceRef, Schema,
    UserAction, Window,
};

/// Legacy marker for an anonymous user.
pub const LEGACY_ANONYMOUS: &str = "-1";

/// Identity all legacy anonymous events collapse to.
pub const LEGACY_ANONYMOUS_BUCKET: &str = "0";

/// How raw recommendation documents are unwound into single-item rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecommendationShape {
    /// One row per entry of `resource_ids`.
    #[default]
    Unwind,
    /// Zip `resource_ids` with `resource_scores`, one row per pair.
    ZipScores,
}

/// Whether a primary identity value marks a registered user.
///
/// A missing value is always anonymous, under either schema.
pub fn is_registered(schema: Schema, primary: Option<&str>) -> bool {
    match (schema, primary.map(str::trim)) {
        (_, None) => false,
        (Schema::Current, Some(p)) => !p.is_empty(),
        (Schema::Legacy, Some(p)) => !p.is_empty() && p != LEGACY_ANONYMOUS,
    }
}

/// Classify one identity pair into `(identity, registered)`.
pub fn classify(schema: Schema, primary: Option<&str>, fallback: &str) -> (String, bool) {
    if is_registered(schema, primary) {
        let id = primary.map(str::trim).unwrap_or_default();
        return (id.to_string(), true);
    }
    match schema {
        Schema::Current => (fallback.to_string(), false),
        Schema::Legacy => (LEGACY_ANONYMOUS_BUCKET.to_string(), false),
    }
}

/// Stable surrogate for an anonymous event that carries no session token.
///
/// Derived from the event content so repeated runs agree on it.
pub fn synthetic_identity(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("anon-{}", &digest[..16])
}

/// Normalize a raw resource id.
///
/// Numeric ids stored as floats lose their trailing `.0` before the
/// unknown markers are checked, so `-1.0` is unknown too.
pub fn resource_ref(raw: Option<&str>) -> ResourceRef {
    let Some(raw) = raw.map(str::trim) else {
        return ResourceRef::Unknown;
    };
    let raw = strip_float_suffix(raw);
    if raw.is_empty() || raw == LEGACY_ANONYMOUS || raw == "None" || raw == "null" {
        return ResourceRef::Unknown;
    }
    ResourceRef::Known(raw.to_string())
}

fn strip_float_suffix(raw: &str) -> &str {
    match raw.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit() || c == '-') => {
            head
        }
        _ => raw,
    }
}

/// Normalize raw actions, preserving order.
pub fn normalize_user_actions(schema: Schema, raw: &[RawUserAction]) -> Vec<UserAction> {
    raw.iter()
        .map(|ra| {
            let primary = ra.identity.primary(schema);
            let fallback = ra.identity.unique_id.clone().unwrap_or_else(|| {
                synthetic_identity(&[
                    &ra.timestamp.to_rfc3339(),
                    &ra.source_path,
                    &ra.target_path,
                ])
            });
            let (user_id, registered) = classify(schema, primary.as_deref(), &fallback);
            UserAction {
                user_id,
                registered,
                source_resource_id: resource_ref(ra.source_resource_id.as_deref()),
                target_resource_id: resource_ref(ra.target_resource_id.as_deref()),
                source_path: ra.source_path.clone(),
                target_path: ra.target_path.clone(),
                panel: ra.panel.clone(),
                reward: ra.reward,
                timestamp: ra.timestamp,
            }
        })
        .collect()
}

/// Normalize and unwind raw recommendation documents, preserving order.
pub fn normalize_recommendations(
    schema: Schema,
    raw: &[RawRecommendation],
    shape: RecommendationShape,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for rr in raw {
        let primary = rr.identity.primary(schema);
        let fallback = rr.identity.unique_id.clone().unwrap_or_else(|| {
            synthetic_identity(&[&rr.timestamp.to_rfc3339(), &rr.provider])
        });
        let (user_id, registered) = classify(schema, primary.as_deref(), &fallback);

        let rows: Vec<(Option<&str>, Option<f64>)> = match (shape, &rr.resource_scores) {
            (RecommendationShape::ZipScores, Some(scores)) => rr
                .resource_ids
                .iter()
                .zip(scores.iter())
                .map(|(id, score)| (id.as_deref(), Some(*score)))
                .collect(),
            _ => rr.resource_ids.iter().map(|id| (id.as_deref(), None)).collect(),
        };

        for (id, score) in rows {
            out.push(Recommendation {
                user_id: user_id.clone(),
                registered,
                resource_id: resource_ref(id),
                score,
                provider: rr.provider.clone(),
                timestamp: rr.timestamp,
            });
        }
    }
    out
}

/// Collapse item versions, keeping the most recent by `timestamp`.
///
/// Ids are normalized first. Output order follows each id's first
/// appearance; on equal timestamps the earlier row wins.
pub fn latest_items(items: Vec<Item>) -> Vec<Item> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Item> = Vec::new();
    for mut item in items {
        if let ResourceRef::Known(id) = resource_ref(Some(&item.id)) {
            item.id = id;
        }
        match index.get(&item.id) {
            Some(&pos) => {
                if item.timestamp > out[pos].timestamp {
                    out[pos] = item;
                }
            }
            None => {
                index.insert(item.id.clone(), out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Items that belong to the active catalog: allowed type and a lifetime
/// overlapping the window. An empty `item_types` list allows every type.
pub fn active_items(items: Vec<Item>, window: &Window, item_types: &[ItemType]) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item_types.is_empty() || item_types.contains(&item.item_type))
        .filter(|item| window.overlaps(item.created_on, item.deleted_on))
        .collect()
}
