//! Stored report listing and retrieval (`rsmetrics reports`, `rsmetrics show`).

use anyhow::{bail, Result};

use rsmetrics_core::report::ReportSummary;
use rsmetrics_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Print a table of stored reports.
pub async fn run_reports(config: &Config) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let reports = store.list_reports().await?;
    store.pool().close().await;

    println!("rsmetrics: stored reports");
    println!("=========================");
    println!();
    if reports.is_empty() {
        println!("  (no reports)");
        return Ok(());
    }
    print!("{}", format_table(&reports));
    println!();
    println!("  {} report(s)", reports.len());
    Ok(())
}

fn format_table(reports: &[ReportSummary]) -> String {
    let width = |label: &str, field: fn(&ReportSummary) -> &str| {
        reports
            .iter()
            .map(|r| field(r).chars().count())
            .max()
            .unwrap_or(0)
            .max(label.len())
    };
    let name_w = width("NAME", |r| r.name.as_str());
    let provider_w = width("PROVIDER", |r| r.provider.as_str());
    let mut out = format!(
        "  {:<name_w$}  {:<provider_w$}  {:<8}  {:<22}  {}\n",
        "NAME", "PROVIDER", "SCHEMA", "TIMESTAMP", "ERRORS",
    );
    for r in reports {
        out.push_str(&format!(
            "  {:<name_w$}  {:<provider_w$}  {:<8}  {:<22}  {}\n",
            r.name,
            r.provider,
            r.schema.as_str(),
            r.timestamp,
            r.errors,
        ));
    }
    out
}

/// Print one stored report as JSON.
pub async fn run_show(config: &Config, name: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let report = store.get_report(name).await?;
    store.pool().close().await;

    match report {
        Some(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        None => bail!("No report named '{}'", name),
    }
}
