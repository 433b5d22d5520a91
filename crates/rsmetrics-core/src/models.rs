//! Data models shared by every stage of an evaluation run.
//!
//! Two families of types live here:
//!
//! - **Raw records** ([`RawUserAction`], [`RawRecommendation`]) as they come
//!   out of the store, still carrying both schemas' identity fields.
//! - **Canonical records** ([`UserAction`], [`Recommendation`], [`User`],
//!   [`Item`], [`Taxonomy`]) produced by [`normalize`](crate::normalize) and
//!   [`filter`](crate::filter), which the computation library reads.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identity/resource schema of the ingested records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    /// Integer `user_id`, `-1` marks an anonymous action.
    Legacy,
    /// String `aai_uid`, null marks an anonymous action identified by `unique_id`.
    Current,
}

impl Schema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::Legacy => "legacy",
            Schema::Current => "current",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Schema {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" => Ok(Schema::Legacy),
            "current" => Ok(Schema::Current),
            other => bail!("Unknown schema: '{}'. Must be legacy or current.", other),
        }
    }
}

/// Resource type of a published item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Service,
    DataSource,
    Training,
    Guideline,
    Other,
}

impl ItemType {
    /// Lenient parse used for stored values: anything unrecognised is `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "service" | "services" => ItemType::Service,
            "data_source" | "data_sources" => ItemType::DataSource,
            "training" | "trainings" => ItemType::Training,
            "guideline" | "guidelines" => ItemType::Guideline,
            _ => ItemType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Service => "service",
            ItemType::DataSource => "data_source",
            ItemType::Training => "training",
            ItemType::Guideline => "guideline",
            ItemType::Other => "other",
        }
    }
}

/// A reference from an event to a catalog item.
///
/// Paths that could not be resolved to a known item are kept as
/// [`ResourceRef::Unknown`] rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceRef {
    Known(String),
    Unknown,
}

impl ResourceRef {
    /// The item id, if the reference resolved to one.
    pub fn id(&self) -> Option<&str> {
        match self {
            ResourceRef::Known(id) => Some(id),
            ResourceRef::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ResourceRef::Unknown)
    }
}

/// Types that carry an event time, used for window filtering and bucketing.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// The active evaluation window.
///
/// Both bounds are inclusive. A window built from dates extends its upper
/// bound to the last microsecond of the end day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    /// A window with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a window from calendar dates (UTC).
    ///
    /// Fails if `end` is before `start`.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                bail!("End date ({}) must not be before start date ({})", e, s);
            }
        }
        let start = start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt));
        let end = end
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
            .map(|dt| Utc.from_utc_datetime(&dt));
        Ok(Self { start, end })
    }

    /// Whether an event at `ts` falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }

    /// Whether an item alive between `created_on` and `deleted_on` overlaps
    /// the window. Missing lifetime bounds are open.
    pub fn overlaps(
        &self,
        created_on: Option<DateTime<Utc>>,
        deleted_on: Option<DateTime<Utc>>,
    ) -> bool {
        let created_ok = match (created_on, self.end) {
            (Some(c), Some(e)) => c <= e,
            _ => true,
        };
        let deleted_ok = match (deleted_on, self.start) {
            (Some(d), Some(s)) => d >= s,
            _ => true,
        };
        created_ok && deleted_ok
    }
}

/// A published catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Category ids (legacy) or names (current).
    pub category: Option<Vec<String>>,
    /// Scientific domain ids (legacy) or names (current).
    pub scientific_domain: Option<Vec<String>>,
    pub created_on: Option<DateTime<Utc>>,
    pub deleted_on: Option<DateTime<Utc>>,
    pub provider: Vec<String>,
    /// Ingestion time of this version of the item.
    pub timestamp: DateTime<Utc>,
}

impl Item {
    /// Whether the item belongs to a provider's catalog. Items without a
    /// provider list are shared by every provider.
    pub fn offered_by(&self, provider: &str) -> bool {
        self.provider.is_empty() || self.provider.iter().any(|p| p == provider)
    }
}

/// An id/name pair from the category or scientific domain taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: String,
    pub name: String,
}

/// Identity fields of a raw event, covering both schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIdentity {
    /// Legacy identity. `-1` (or absence) means anonymous.
    pub user_id: Option<i64>,
    /// Current identity. Null or empty means anonymous.
    pub aai_uid: Option<String>,
    /// Per-session token, present on current-schema events.
    pub unique_id: Option<String>,
}

impl RawIdentity {
    /// The registered-marker field for the given schema.
    pub fn primary(&self, schema: Schema) -> Option<String> {
        match schema {
            Schema::Legacy => self.user_id.map(|id| id.to_string()),
            Schema::Current => self.aai_uid.clone(),
        }
    }
}

/// A navigation event as stored, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUserAction {
    pub identity: RawIdentity,
    pub source_resource_id: Option<String>,
    pub target_resource_id: Option<String>,
    pub source_path: String,
    pub target_path: String,
    pub panel: String,
    pub reward: f64,
    pub timestamp: DateTime<Utc>,
}

/// A served recommendation list as stored, before unwinding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecommendation {
    pub identity: RawIdentity,
    pub resource_ids: Vec<Option<String>>,
    /// Parallel score list, present for providers that serve ranked lists.
    pub resource_scores: Option<Vec<f64>>,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

/// A canonical navigation event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAction {
    pub user_id: String,
    pub registered: bool,
    pub source_resource_id: ResourceRef,
    pub target_resource_id: ResourceRef,
    pub source_path: String,
    pub target_path: String,
    pub panel: String,
    pub reward: f64,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for UserAction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A canonical (unwound) recommendation of a single item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub user_id: String,
    pub registered: bool,
    pub resource_id: ResourceRef,
    pub score: Option<f64>,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for Recommendation {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A registered user derived from the actions in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    /// Items navigated from or to, the unknown sentinel excluded.
    pub accessed_resources: BTreeSet<String>,
}
