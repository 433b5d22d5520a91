//! Library-level evaluation runs against both store implementations.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use rsmetrics::migrate;
use rsmetrics::sqlite_store::{SqliteStore, TaxonomyTable};
use rsmetrics_core::context::EvalContext;
use rsmetrics_core::error::{ComputationError, EvaluationError};
use rsmetrics_core::models::{
    Item, ItemType, RawIdentity, RawRecommendation, RawUserAction, Schema, Taxonomy, Window,
};
use rsmetrics_core::normalize::RecommendationShape;
use rsmetrics_core::pipeline::{evaluate, EvaluationOptions};
use rsmetrics_core::registry::{Computation, ComputeResult, Registry};
use rsmetrics_core::store::memory::InMemoryStore;
use rsmetrics_core::store::Store;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn item(id: &str, name: &str, categories: &[&str], domains: &[&str]) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        path: format!("/services/{}", name.to_lowercase()),
        item_type: ItemType::Service,
        category: Some(categories.iter().map(|s| s.to_string()).collect()),
        scientific_domain: Some(domains.iter().map(|s| s.to_string()).collect()),
        created_on: Some(ts("2023-01-01T00:00:00Z")),
        deleted_on: None,
        provider: vec!["marketplace_rs".to_string()],
        timestamp: ts("2023-06-01T00:00:00Z"),
    }
}

fn legacy_action(user: i64, source: Option<&str>, target: &str, to: &str, at: &str) -> RawUserAction {
    RawUserAction {
        identity: RawIdentity {
            user_id: Some(user),
            ..Default::default()
        },
        source_resource_id: source.map(str::to_string),
        target_resource_id: Some(target.to_string()),
        source_path: "/services".to_string(),
        target_path: to.to_string(),
        panel: "services_list".to_string(),
        reward: 0.0,
        timestamp: ts(at),
    }
}

fn legacy_rec(user: i64, ids: &[&str], scores: Option<Vec<f64>>, at: &str) -> RawRecommendation {
    RawRecommendation {
        identity: RawIdentity {
            user_id: Some(user),
            ..Default::default()
        },
        resource_ids: ids.iter().map(|s| Some(s.to_string())).collect(),
        resource_scores: scores,
        provider: "marketplace_rs".to_string(),
        timestamp: ts(at),
    }
}

struct Fixture {
    items: Vec<Item>,
    actions: Vec<RawUserAction>,
    recs: Vec<RawRecommendation>,
    categories: Vec<Taxonomy>,
    domains: Vec<Taxonomy>,
}

/// Legacy snapshot: user A accessed {10, 20} and was recommended {20, 30};
/// user B accessed {40} and was recommended {50}.
fn fixture() -> Fixture {
    Fixture {
        items: vec![
            item("10", "Ten", &["1"], &["100"]),
            item("20", "Twenty", &["1", "2"], &["100"]),
            item("30", "Thirty", &["2"], &["101"]),
            item("40", "Forty", &["3"], &["101"]),
            item("50", "Fifty", &["3"], &["100"]),
        ],
        actions: vec![
            legacy_action(1, None, "10", "/services/ten", "2024-01-01T10:00:00Z"),
            legacy_action(1, Some("10"), "20", "/services/twenty", "2024-01-01T11:00:00Z"),
            legacy_action(2, None, "40", "/services/forty", "2024-01-03T10:00:00Z"),
            legacy_action(-1, None, "30", "/services/thirty", "2024-01-02T10:00:00Z"),
        ],
        recs: vec![
            legacy_rec(1, &["20", "30"], Some(vec![0.9, 0.4]), "2024-01-01T09:00:00Z"),
            legacy_rec(2, &["50"], Some(vec![0.8]), "2024-01-03T09:00:00Z"),
            legacy_rec(-1, &["10"], None, "2024-01-02T09:00:00Z"),
        ],
        categories: vec![
            Taxonomy { id: "1".to_string(), name: "Compute".to_string() },
            Taxonomy { id: "2".to_string(), name: "Storage".to_string() },
            Taxonomy { id: "3".to_string(), name: "Network".to_string() },
        ],
        domains: vec![
            Taxonomy { id: "100".to_string(), name: "Physics".to_string() },
            Taxonomy { id: "101".to_string(), name: "Biology".to_string() },
        ],
    }
}

fn memory_store(f: Fixture) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_items(f.items).unwrap();
    store.insert_user_actions(f.actions).unwrap();
    store.insert_recommendations(f.recs).unwrap();
    store.insert_categories(f.categories).unwrap();
    store.insert_scientific_domains(f.domains).unwrap();
    store
}

async fn sqlite_store(tmp: &TempDir, f: Fixture) -> SqliteStore {
    let pool = rsmetrics::db::connect_path(&tmp.path().join("rsmetrics.sqlite"))
        .await
        .unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = SqliteStore::new(pool);
    store.insert_items(&f.items).await.unwrap();
    store.insert_user_actions(&f.actions).await.unwrap();
    store.insert_recommendations(&f.recs).await.unwrap();
    store
        .upsert_taxonomy(TaxonomyTable::Category, &f.categories)
        .await
        .unwrap();
    store
        .upsert_taxonomy(TaxonomyTable::ScientificDomain, &f.domains)
        .await
        .unwrap();
    store
}

fn options() -> EvaluationOptions {
    let mut options = EvaluationOptions::new("marketplace_rs", Schema::Legacy);
    options.window = Window::from_dates(
        NaiveDate::from_ymd_opt(2024, 1, 1),
        NaiveDate::from_ymd_opt(2024, 1, 3),
    )
    .unwrap();
    options.tag = Some("jan".to_string());
    options
}

fn value<'a>(entries: &'a [rsmetrics_core::registry::Entry], name: &str) -> &'a Value {
    &entries
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("'{}' missing", name))
        .value
}

async fn check_legacy_report(store: &dyn Store) {
    let report = evaluate(store, &options(), &Registry::standard())
        .await
        .unwrap();

    assert_eq!(report.name, "marketplace_rs - jan");
    assert_eq!(report.schema, Schema::Legacy);
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);

    assert_eq!(value(&report.metrics, "hit_rate"), &json!(0.5));
    assert_eq!(value(&report.statistics, "users"), &json!(2));
    assert_eq!(value(&report.statistics, "users_anonymous"), &json!(1));
    assert_eq!(value(&report.statistics, "recommendations"), &json!(4));
    assert_eq!(value(&report.statistics, "recommendations_registered_perc"), &json!(75.0));
    assert_eq!(value(&report.statistics, "recommendations_anonymous_perc"), &json!(25.0));

    let per_day = value(&report.statistics, "recommendations_per_day");
    assert_eq!(
        per_day,
        &json!([
            {"date": "2024-01-01", "value": 2},
            {"date": "2024-01-02", "value": 1},
            {"date": "2024-01-03", "value": 1}
        ])
    );
    assert_eq!(
        value(&report.statistics, "recommendations_per_month"),
        &json!([{"date": "2024-01", "value": 4}])
    );

    // 40 is the only item never recommended
    assert_eq!(value(&report.metrics, "catalog_coverage"), &json!(80.0));
    assert_eq!(value(&report.metrics, "user_coverage"), &json!(100.0));

    // each user agrees with the recommender on 3 of 5 items
    assert_eq!(value(&report.metrics, "accuracy"), &json!(0.6));

    let categories = value(&report.metrics, "top5_categories_recommended");
    assert_eq!(categories[0]["name"], "Storage");
    assert_eq!(categories[0]["value"], 2);

    let stored_before = store.get_report("marketplace_rs - jan").await.unwrap();
    assert!(stored_before.is_none());
    store.upsert_report(&report).await.unwrap();
    let stored = store.get_report("marketplace_rs - jan").await.unwrap().unwrap();
    assert_eq!(stored, report);
    let listed = store.list_reports().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].errors, 0);
}

#[tokio::test]
async fn legacy_report_in_memory() {
    let store = memory_store(fixture());
    check_legacy_report(&store).await;
}

#[tokio::test]
async fn legacy_report_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp, fixture()).await;
    check_legacy_report(&store).await;
}

#[tokio::test]
async fn both_stores_agree() {
    let tmp = TempDir::new().unwrap();
    let sqlite = sqlite_store(&tmp, fixture()).await;
    let memory = memory_store(fixture());

    let mut a = evaluate(&sqlite, &options(), &Registry::standard()).await.unwrap();
    let mut b = evaluate(&memory, &options(), &Registry::standard()).await.unwrap();
    a.timestamp.clear();
    b.timestamp.clear();
    assert_eq!(a, b);
}

#[tokio::test]
async fn zipped_scores_unwind_to_the_shorter_list() {
    let mut f = fixture();
    f.recs = vec![legacy_rec(1, &["20", "30", "40"], Some(vec![0.9, 0.4]), "2024-01-01T09:00:00Z")];
    let store = memory_store(f);

    let mut options = options();
    options.shape = RecommendationShape::ZipScores;
    let report = evaluate(&store, &options, &Registry::standard()).await.unwrap();
    let stats = &report.statistics;
    assert_eq!(value(stats, "recommendations"), &json!(2));

    options.shape = RecommendationShape::Unwind;
    let report = evaluate(&store, &options, &Registry::standard()).await.unwrap();
    assert_eq!(value(&report.statistics, "recommendations"), &json!(3));
}

fn forced_failure(_: &EvalContext) -> ComputeResult {
    Err(ComputationError::Failed("forced".to_string()))
}

#[tokio::test]
async fn one_failure_leaves_other_values_unchanged() {
    let store = memory_store(fixture());
    let clean = evaluate(&store, &options(), &Registry::standard()).await.unwrap();

    let mut registry = Registry::standard();
    registry.register(Computation::metric("hit_rate", "forced failure", forced_failure));
    let faulty = evaluate(&store, &options(), &registry).await.unwrap();

    assert_eq!(faulty.errors, vec!["hit_rate".to_string()]);
    assert_eq!(faulty.statistics, clean.statistics);
    for (a, b) in faulty.metrics.iter().zip(clean.metrics.iter()) {
        assert_eq!(a.name, b.name);
        if a.name == "hit_rate" {
            assert_eq!(a.value, Value::Null);
        } else {
            assert_eq!(a.value, b.value, "{} changed", a.name);
        }
    }
}

#[tokio::test]
async fn missing_taxonomy_fails_only_legacy_category_metrics() {
    let mut f = fixture();
    f.categories.clear();
    let store = memory_store(f);
    let report = evaluate(&store, &options(), &Registry::standard()).await.unwrap();
    assert_eq!(
        report.errors,
        vec![
            "top5_categories_viewed".to_string(),
            "top5_categories_recommended".to_string()
        ]
    );
    assert_eq!(value(&report.metrics, "hit_rate"), &json!(0.5));
}

#[tokio::test]
async fn window_without_events_is_insufficient() {
    let store = memory_store(fixture());
    let mut options = options();
    options.window = Window::from_dates(
        NaiveDate::from_ymd_opt(2025, 1, 1),
        NaiveDate::from_ymd_opt(2025, 1, 31),
    )
    .unwrap();
    match evaluate(&store, &options, &Registry::standard()).await {
        Err(EvaluationError::InsufficientData(tables)) => {
            assert!(tables.contains(&"user_actions".to_string()));
            assert!(tables.contains(&"recommendations".to_string()));
            assert!(tables.contains(&"users".to_string()));
        }
        other => panic!("unexpected: {:?}", other.map(|r| r.name)),
    }
}

#[tokio::test]
async fn other_providers_are_ignored() {
    let mut f = fixture();
    let mut foreign = legacy_rec(1, &["10"], None, "2024-01-01T09:30:00Z");
    foreign.provider = "athena".to_string();
    f.recs.push(foreign);
    let store = memory_store(f);
    let report = evaluate(&store, &options(), &Registry::standard()).await.unwrap();
    assert_eq!(value(&report.statistics, "recommendations"), &json!(4));
}
