use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Item versions; the engine keeps the latest per id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            path TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL,
            category TEXT,
            scientific_domain TEXT,
            created_on INTEGER,
            deleted_on INTEGER,
            provider TEXT NOT NULL DEFAULT '[]',
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_actions (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            aai_uid TEXT,
            unique_id TEXT,
            source_resource_id TEXT,
            target_resource_id TEXT,
            source_path TEXT NOT NULL DEFAULT '',
            target_path TEXT NOT NULL DEFAULT '',
            panel TEXT NOT NULL DEFAULT '',
            reward REAL NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per served list; resource_ids / resource_scores are JSON arrays
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommendations (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            aai_uid TEXT,
            unique_id TEXT,
            resource_ids TEXT NOT NULL DEFAULT '[]',
            resource_scores TEXT,
            provider TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in ["category", "scientific_domain"] {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, name TEXT NOT NULL)",
            table
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            name TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            schema TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            error_count INTEGER NOT NULL DEFAULT 0,
            body TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_id ON items(id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_actions_timestamp ON user_actions(timestamp)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recommendations_provider_timestamp \
         ON recommendations(provider, timestamp)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("Schema migrations applied");
    Ok(())
}
