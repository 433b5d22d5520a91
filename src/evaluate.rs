//! The `evaluate` command: run the engine for one provider and persist the
//! report.

use anyhow::{Context, Result};
use chrono::NaiveDate;

use rsmetrics_core::models::{Schema, Window};
use rsmetrics_core::pipeline::{self, EvaluationOptions};
use rsmetrics_core::registry::Registry;
use rsmetrics_core::report::Report;
use rsmetrics_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Command-line parameters of one run.
#[derive(Debug, Clone, Default)]
pub struct EvaluateArgs {
    pub provider: Option<String>,
    pub tag: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub legacy: bool,
    pub no_store: bool,
}

fn parse_date(raw: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid {} date '{}': expected YYYY-MM-DD", flag, s))
    })
    .transpose()
}

/// Resolve configuration and flags into engine options.
///
/// Every configuration error surfaces here, before any table is read.
pub fn build_options(config: &Config, args: &EvaluateArgs) -> Result<EvaluationOptions> {
    let provider = config.provider(args.provider.as_deref())?;
    let schema = if args.legacy {
        Schema::Legacy
    } else {
        Schema::Current
    };
    let window = Window::from_dates(
        parse_date(args.start.as_deref(), "--start")?,
        parse_date(args.end.as_deref(), "--end")?,
    )?;

    let mut options = EvaluationOptions::new(&provider.name, schema);
    options.window = window;
    options.tag = args.tag.clone();
    options.item_types = provider.item_types.clone();
    options.shape = provider.shape();
    options.top_k = config.evaluation.top_k;
    options.paths = config.paths.rules(schema)?;
    Ok(options)
}

/// Run an evaluation against any store, persisting the report unless
/// `no_store` is set.
pub async fn evaluate_with(
    store: &dyn Store,
    options: &EvaluationOptions,
    no_store: bool,
) -> Result<Report> {
    let registry = Registry::standard();
    tracing::info!(
        provider = %options.provider,
        schema = %options.schema,
        computations = registry.len(),
        "Starting evaluation"
    );
    let report = pipeline::evaluate(store, options, &registry).await?;
    if no_store {
        tracing::info!(name = %report.name, "Report not stored (--no-store)");
    } else {
        store
            .upsert_report(&report)
            .await
            .with_context(|| format!("Failed to store report '{}'", report.name))?;
        tracing::info!(name = %report.name, "Report stored");
    }
    Ok(report)
}

/// Run the evaluate command and print the report as JSON.
pub async fn run_evaluate(config: &Config, args: &EvaluateArgs) -> Result<()> {
    let options = build_options(config, args)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let result = evaluate_with(&store, &options, args.no_store).await;
    store.pool().close().await;
    let report = result?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
