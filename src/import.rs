//! JSON import of collaborator dumps into the input tables.
//!
//! `rsmetrics import <table> <file>` reads a JSON array of flat documents,
//! the shape the batch and stream collectors write, and appends them to one
//! table. Field types are accepted as loosely as those collectors produce
//! them:
//!
//! | Field | Accepted |
//! |-------|----------|
//! | `user_id` | integer, float, numeric string, null |
//! | `aai_uid` | string (empty = null), null |
//! | `unique_id` | any scalar, stringified |
//! | resource ids | integer, float (`12.0`), string, `-1`, null |
//! | timestamps | RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, unix seconds, `{"$date": ...}` |
//!
//! Rows are appended; item history is kept and deduplicated at evaluation.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde_json::{Map, Value};
use std::path::Path;

use rsmetrics_core::models::{
    Item, ItemType, RawIdentity, RawRecommendation, RawUserAction, Taxonomy,
};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{SqliteStore, TaxonomyTable};

/// Input table targeted by an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportTable {
    Items,
    #[value(name = "user_actions")]
    UserActions,
    Recommendations,
    Category,
    #[value(name = "scientific_domain")]
    ScientificDomain,
}

impl ImportTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportTable::Items => "items",
            ImportTable::UserActions => "user_actions",
            ImportTable::Recommendations => "recommendations",
            ImportTable::Category => "category",
            ImportTable::ScientificDomain => "scientific_domain",
        }
    }
}

/// Run the import command.
pub async fn run_import(config: &Config, table: ImportTable, file: &Path) -> Result<()> {
    let docs = read_documents(file)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let written = match table {
        ImportTable::Items => store.insert_items(&parse_all(&docs, parse_item)?).await?,
        ImportTable::UserActions => {
            store
                .insert_user_actions(&parse_all(&docs, parse_user_action)?)
                .await?
        }
        ImportTable::Recommendations => {
            store
                .insert_recommendations(&parse_all(&docs, parse_recommendation)?)
                .await?
        }
        ImportTable::Category => {
            store
                .upsert_taxonomy(TaxonomyTable::Category, &parse_all(&docs, parse_taxonomy)?)
                .await?
        }
        ImportTable::ScientificDomain => {
            store
                .upsert_taxonomy(
                    TaxonomyTable::ScientificDomain,
                    &parse_all(&docs, parse_taxonomy)?,
                )
                .await?
        }
    };

    tracing::info!(table = table.as_str(), rows = written, "Import complete");
    println!("import {}", table.as_str());
    println!("  file: {}", file.display());
    println!("  rows written: {}", written);
    store.pool().close().await;
    Ok(())
}

/// Read a JSON array of objects from `file`.
pub fn read_documents(file: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read import file: {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", file.display()))?;
    let Value::Array(entries) = value else {
        bail!("Import file must contain a JSON array: {}", file.display());
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::Object(map) => Ok(map),
            _ => bail!("Document #{} is not a JSON object", i),
        })
        .collect()
}

fn parse_all<T>(
    docs: &[Map<String, Value>],
    parse: fn(&Map<String, Value>) -> Result<T>,
) -> Result<Vec<T>> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| parse(doc).with_context(|| format!("Invalid document #{}", i)))
        .collect()
}

// ─── Field parsers ──────────────────────────────────────────────────

/// A scalar rendered as a string; null and absent map to `None`.
pub fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Legacy integer identity.
pub fn user_id(value: Option<&Value>) -> Result<Option<i64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
                _ => bail!("user_id is not an integer: {}", n),
            },
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let head = trimmed.strip_suffix(".0").unwrap_or(trimmed);
            head.parse::<i64>()
                .map(Some)
                .with_context(|| format!("user_id is not an integer: '{}'", s))
        }
        Some(other) => bail!("user_id has an unsupported type: {}", other),
    }
}

/// Parse a timestamp in any of the accepted forms.
pub fn timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Ok(naive.and_utc());
                }
            }
            bail!("Unrecognised timestamp: '{}'", s)
        }
        Value::Number(n) => {
            let secs = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .context("Invalid numeric timestamp")?;
            DateTime::from_timestamp(secs, 0).with_context(|| format!("Timestamp out of range: {}", secs))
        }
        Value::Object(map) => match map.get("$date") {
            Some(inner) => timestamp(inner),
            None => bail!("Unrecognised timestamp object"),
        },
        other => bail!("Unrecognised timestamp: {}", other),
    }
}

fn optional_timestamp(value: Option<&Value>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => timestamp(v).map(Some),
    }
}

fn required_timestamp(doc: &Map<String, Value>) -> Result<DateTime<Utc>> {
    timestamp(doc.get("timestamp").context("Missing field: timestamp")?)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Null => None,
        Value::Array(entries) => Some(
            entries
                .iter()
                .filter_map(|v| scalar_string(Some(v)))
                .collect(),
        ),
        scalar => scalar_string(Some(scalar)).map(|s| vec![s]),
    }
}

fn text(doc: &Map<String, Value>, field: &str) -> String {
    scalar_string(doc.get(field)).unwrap_or_default()
}

fn identity(doc: &Map<String, Value>) -> Result<RawIdentity> {
    Ok(RawIdentity {
        user_id: user_id(doc.get("user_id"))?,
        aai_uid: scalar_string(doc.get("aai_uid")).filter(|s| !s.trim().is_empty()),
        unique_id: scalar_string(doc.get("unique_id")),
    })
}

// ─── Documents ──────────────────────────────────────────────────────

pub fn parse_item(doc: &Map<String, Value>) -> Result<Item> {
    let id = scalar_string(doc.get("id")).context("Missing field: id")?;
    let created_on = optional_timestamp(doc.get("created_on"))?;
    // Catalog snapshots without an ingestion time fall back to creation time
    let ingested = match doc.get("timestamp") {
        Some(v) if !v.is_null() => timestamp(v)?,
        _ => created_on.unwrap_or(DateTime::UNIX_EPOCH),
    };
    Ok(Item {
        id,
        name: text(doc, "name"),
        path: text(doc, "path"),
        item_type: doc
            .get("type")
            .and_then(Value::as_str)
            .map(ItemType::parse)
            .unwrap_or(ItemType::Other),
        category: string_list(doc.get("category")),
        scientific_domain: string_list(doc.get("scientific_domain")),
        created_on,
        deleted_on: optional_timestamp(doc.get("deleted_on"))?,
        provider: string_list(doc.get("provider")).unwrap_or_default(),
        timestamp: ingested,
    })
}

pub fn parse_user_action(doc: &Map<String, Value>) -> Result<RawUserAction> {
    let reward = match doc.get("reward") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v.as_f64().context("reward is not a number")?,
    };
    Ok(RawUserAction {
        identity: identity(doc)?,
        source_resource_id: scalar_string(doc.get("source_resource_id")),
        target_resource_id: scalar_string(doc.get("target_resource_id")),
        source_path: text(doc, "source_path"),
        target_path: text(doc, "target_path"),
        panel: text(doc, "panel"),
        reward,
        timestamp: required_timestamp(doc)?,
    })
}

pub fn parse_recommendation(doc: &Map<String, Value>) -> Result<RawRecommendation> {
    let resource_ids = match doc.get("resource_ids") {
        Some(Value::Array(entries)) => entries.iter().map(|v| scalar_string(Some(v))).collect(),
        // single-item documents
        _ => vec![scalar_string(doc.get("resource_id"))],
    };
    let resource_scores = match doc.get("resource_scores") {
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .map(|v| v.as_f64().context("resource_scores entry is not a number"))
                .collect::<Result<Vec<f64>>>()?,
        ),
        _ => None,
    };
    Ok(RawRecommendation {
        identity: identity(doc)?,
        resource_ids,
        resource_scores,
        provider: scalar_string(doc.get("provider")).context("Missing field: provider")?,
        timestamp: required_timestamp(doc)?,
    })
}

pub fn parse_taxonomy(doc: &Map<String, Value>) -> Result<Taxonomy> {
    Ok(Taxonomy {
        id: scalar_string(doc.get("id")).context("Missing field: id")?,
        name: text(doc, "name"),
    })
}
