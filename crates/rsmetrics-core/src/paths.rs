//! Navigation path rules.
//!
//! Two pattern sets are configured per schema:
//!
//! - **search pages**: landing or search listings. Navigating *to* one of
//!   these is not an item view.
//! - **recommendation surfaces**: pages that render the recommendation
//!   panel. Actions *from* these pages form the click-through denominator.
//!
//! Patterns are globs matched against the path with any trailing `/`
//! removed.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use crate::models::{Schema, UserAction};

/// Panel marker of actions that originate from the recommendation panel.
pub const RECOMMENDATION_PANEL: &str = "recommendation_panel";

/// Glob patterns for one schema, as written in configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PathPatterns {
    #[serde(default)]
    pub search_pages: Vec<String>,
    #[serde(default)]
    pub recommendation_surfaces: Vec<String>,
}

impl PathPatterns {
    /// Built-in patterns for a schema.
    pub fn default_for(schema: Schema) -> Self {
        match schema {
            Schema::Legacy => Self {
                search_pages: vec!["/services".to_string()],
                recommendation_surfaces: vec![
                    "/services".to_string(),
                    "/services/c/*".to_string(),
                ],
            },
            Schema::Current => Self {
                search_pages: vec!["*search%2F*".to_string()],
                recommendation_surfaces: vec![
                    "*search%2F*".to_string(),
                    "/search/*".to_string(),
                ],
            },
        }
    }
}

/// Compiled path rules.
#[derive(Debug, Clone)]
pub struct PathRules {
    search_pages: GlobSet,
    recommendation_surfaces: GlobSet,
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid path pattern: '{}'", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn trim_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}

impl PathRules {
    pub fn compile(patterns: &PathPatterns) -> Result<Self> {
        Ok(Self {
            search_pages: build_set(&patterns.search_pages)?,
            recommendation_surfaces: build_set(&patterns.recommendation_surfaces)?,
        })
    }

    /// Rules compiled from the built-in patterns of a schema.
    pub fn default_for(schema: Schema) -> Self {
        // The built-in patterns are valid globs.
        Self::compile(&PathPatterns::default_for(schema)).unwrap_or_else(|_| Self::empty())
    }

    /// Rules that match nothing.
    pub fn empty() -> Self {
        Self {
            search_pages: GlobSet::empty(),
            recommendation_surfaces: GlobSet::empty(),
        }
    }

    pub fn is_search_page(&self, path: &str) -> bool {
        self.search_pages.is_match(trim_path(path))
    }

    pub fn is_recommendation_surface(&self, path: &str) -> bool {
        self.recommendation_surfaces.is_match(trim_path(path))
    }

    /// Whether the action counts as a view of its target item.
    ///
    /// The target must be a known item, must not be a search page, and must
    /// not be a self-transition.
    pub fn is_view(&self, action: &UserAction) -> bool {
        !action.target_resource_id.is_unknown()
            && !self.is_search_page(&action.target_path)
            && !is_self_transition(&action.source_path, &action.target_path)
    }
}

/// Path component of an absolute URL (`scheme://host/path` becomes
/// `/path`); relative paths are returned as is.
fn strip_origin(path: &str) -> &str {
    match path.find("://") {
        Some(pos) => {
            let rest = &path[pos + 3..];
            let start = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            &rest[start..]
        }
        None => path,
    }
}

/// Top-level resource segment of a path: its first two segments, with any
/// origin, query string or anchor removed. `/services/alpha/details#about`
/// and `https://host/services/alpha?x=1` both become `/services/alpha`.
pub fn resource_root(path: &str) -> Option<String> {
    let path = strip_origin(path);
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let segments: Vec<&str> = path[..end].split('/').filter(|s| !s.is_empty()).take(2).collect();
    if segments.is_empty() {
        None
    } else {
        Some(format!("/{}", segments.join("/")))
    }
}

/// Whether source and target resolve to the same top-level resource.
pub fn is_self_transition(source_path: &str, target_path: &str) -> bool {
    match (resource_root(source_path), resource_root(target_path)) {
        (Some(s), Some(t)) => s == t,
        _ => false,
    }
}
