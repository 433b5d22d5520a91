//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as unix seconds; multi-valued fields (categories,
//! scientific domains, provider lists, recommended ids and scores) as JSON
//! text. Reports are stored whole as JSON, keyed by name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use rsmetrics_core::models::{
    Item, ItemType, RawIdentity, RawRecommendation, RawUserAction, Schema, Taxonomy, Window,
};
use rsmetrics_core::report::{Report, ReportSummary};
use rsmetrics_core::store::Store;

/// Taxonomy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyTable {
    Category,
    ScientificDomain,
}

impl TaxonomyTable {
    pub fn table(&self) -> &'static str {
        match self {
            TaxonomyTable::Category => "category",
            TaxonomyTable::ScientificDomain => "scientific_domain",
        }
    }
}

/// SQLite implementation of the [`Store`] trait.
///
/// Besides the trait, it offers the bulk inserts used by `rsmetrics import`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_items(&self, items: &[Item]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items (id, name, path, type, category, scientific_domain,
                                   created_on, deleted_on, provider, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.name)
            .bind(&item.path)
            .bind(item.item_type.as_str())
            .bind(to_json_opt(&item.category)?)
            .bind(to_json_opt(&item.scientific_domain)?)
            .bind(item.created_on.map(|t| t.timestamp()))
            .bind(item.deleted_on.map(|t| t.timestamp()))
            .bind(serde_json::to_string(&item.provider)?)
            .bind(item.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len())
    }

    pub async fn insert_user_actions(&self, actions: &[RawUserAction]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for action in actions {
            sqlx::query(
                r#"
                INSERT INTO user_actions (user_id, aai_uid, unique_id, source_resource_id,
                                          target_resource_id, source_path, target_path,
                                          panel, reward, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(action.identity.user_id)
            .bind(&action.identity.aai_uid)
            .bind(&action.identity.unique_id)
            .bind(&action.source_resource_id)
            .bind(&action.target_resource_id)
            .bind(&action.source_path)
            .bind(&action.target_path)
            .bind(&action.panel)
            .bind(action.reward)
            .bind(action.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(actions.len())
    }

    pub async fn insert_recommendations(&self, recs: &[RawRecommendation]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for rec in recs {
            sqlx::query(
                r#"
                INSERT INTO recommendations (user_id, aai_uid, unique_id, resource_ids,
                                             resource_scores, provider, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(rec.identity.user_id)
            .bind(&rec.identity.aai_uid)
            .bind(&rec.identity.unique_id)
            .bind(serde_json::to_string(&rec.resource_ids)?)
            .bind(to_json_opt(&rec.resource_scores)?)
            .bind(&rec.provider)
            .bind(rec.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(recs.len())
    }

    /// Insert or rename taxonomy entries.
    pub async fn upsert_taxonomy(&self, table: TaxonomyTable, entries: &[Taxonomy]) -> Result<usize> {
        let sql = format!(
            "INSERT INTO {} (id, name) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            table.table()
        );
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(&sql)
                .bind(&entry.id)
                .bind(&entry.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }

    async fn load_taxonomy(&self, table: TaxonomyTable) -> Result<Vec<Taxonomy>> {
        let rows = sqlx::query(&format!("SELECT id, name FROM {} ORDER BY id", table.table()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Taxonomy {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn from_json_opt<T: serde::de::DeserializeOwned>(raw: Option<String>, column: &str) -> Result<Option<T>> {
    raw.map(|s| serde_json::from_str(&s).with_context(|| format!("Invalid JSON in column {}", column)))
        .transpose()
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("Timestamp out of range: {}", ts))
}

fn window_bounds(window: &Window) -> (Option<i64>, Option<i64>) {
    (
        window.start.map(|t| t.timestamp()),
        window.end.map(|t| t.timestamp()),
    )
}

fn identity(row: &SqliteRow) -> RawIdentity {
    RawIdentity {
        user_id: row.get("user_id"),
        aai_uid: row.get("aai_uid"),
        unique_id: row.get("unique_id"),
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let item_type: String = row.get("type");
    let provider: String = row.get("provider");
    Ok(Item {
        id: row.get("id"),
        name: row.get("name"),
        path: row.get("path"),
        item_type: ItemType::parse(&item_type),
        category: from_json_opt(row.get("category"), "items.category")?,
        scientific_domain: from_json_opt(row.get("scientific_domain"), "items.scientific_domain")?,
        created_on: row.get::<Option<i64>, _>("created_on").map(from_ts).transpose()?,
        deleted_on: row.get::<Option<i64>, _>("deleted_on").map(from_ts).transpose()?,
        provider: serde_json::from_str(&provider).context("Invalid JSON in column items.provider")?,
        timestamp: from_ts(row.get("timestamp"))?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_items(&self, provider: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, path, type, category, scientific_domain,
                   created_on, deleted_on, provider, timestamp
            FROM items
            ORDER BY row_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let item = item_from_row(row)?;
            if item.offered_by(provider) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn load_user_actions(&self, window: &Window) -> Result<Vec<RawUserAction>> {
        let (start, end) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT user_id, aai_uid, unique_id, source_resource_id, target_resource_id,
                   source_path, target_path, panel, reward, timestamp
            FROM user_actions
            WHERE (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp <= ?)
            ORDER BY timestamp, row_id
            "#,
        )
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RawUserAction {
                    identity: identity(row),
                    source_resource_id: row.get("source_resource_id"),
                    target_resource_id: row.get("target_resource_id"),
                    source_path: row.get("source_path"),
                    target_path: row.get("target_path"),
                    panel: row.get("panel"),
                    reward: row.get("reward"),
                    timestamp: from_ts(row.get("timestamp"))?,
                })
            })
            .collect()
    }

    async fn load_recommendations(
        &self,
        provider: &str,
        window: &Window,
    ) -> Result<Vec<RawRecommendation>> {
        let (start, end) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT user_id, aai_uid, unique_id, resource_ids, resource_scores, provider, timestamp
            FROM recommendations
            WHERE provider = ?
              AND (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp <= ?)
            ORDER BY timestamp, row_id
            "#,
        )
        .bind(provider)
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let ids: String = row.get("resource_ids");
                Ok(RawRecommendation {
                    identity: identity(row),
                    resource_ids: serde_json::from_str(&ids)
                        .context("Invalid JSON in column recommendations.resource_ids")?,
                    resource_scores: from_json_opt(
                        row.get("resource_scores"),
                        "recommendations.resource_scores",
                    )?,
                    provider: row.get("provider"),
                    timestamp: from_ts(row.get("timestamp"))?,
                })
            })
            .collect()
    }

    async fn load_categories(&self) -> Result<Vec<Taxonomy>> {
        self.load_taxonomy(TaxonomyTable::Category).await
    }

    async fn load_scientific_domains(&self) -> Result<Vec<Taxonomy>> {
        self.load_taxonomy(TaxonomyTable::ScientificDomain).await
    }

    async fn upsert_report(&self, report: &Report) -> Result<()> {
        let body = serde_json::to_string(report)?;
        sqlx::query(
            r#"
            INSERT INTO reports (name, provider, schema, timestamp, error_count, body)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                provider = excluded.provider,
                schema = excluded.schema,
                timestamp = excluded.timestamp,
                error_count = excluded.error_count,
                body = excluded.body
            "#,
        )
        .bind(&report.name)
        .bind(&report.provider)
        .bind(report.schema.as_str())
        .bind(&report.timestamp)
        .bind(report.errors.len() as i64)
        .bind(&body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_report(&self, name: &str) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT body FROM reports WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let body: String = row.get("body");
                let report = serde_json::from_str(&body)
                    .with_context(|| format!("Stored report '{}' is not valid JSON", name))?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    async fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        let rows = sqlx::query(
            "SELECT name, provider, schema, timestamp, error_count FROM reports ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let schema: String = row.get("schema");
                let errors: i64 = row.get("error_count");
                Ok(ReportSummary {
                    name: row.get("name"),
                    provider: row.get("provider"),
                    schema: schema.parse::<Schema>()?,
                    timestamp: row.get("timestamp"),
                    errors: errors.max(0) as usize,
                })
            })
            .collect()
    }
}
