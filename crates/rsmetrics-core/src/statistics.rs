//! Descriptive statistics: counts, registered/anonymous splits, and
//! zero-filled time series.
//!
//! Percentage pairs are computed as `registered = round(r * 100 / total, 2)`
//! and `anonymous = round(100 - registered, 2)`, so they always sum to 100.
//! Both are 0 when `total` is 0.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::context::EvalContext;
use crate::error::ComputationError;
use crate::models::{Timestamped, UserAction};
use crate::paths::RECOMMENDATION_PANEL;
use crate::registry::{ComputeResult, Computation, Registry};

/// Reward of an action that led to an order.
pub const ORDER_REWARD: f64 = 1.0;

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `part / total * 100`, rounded to 2 decimals; 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(part as f64 * 100.0 / total as f64, 2)
    }
}

/// Complement of a registered percentage; 0 when `total` is 0.
pub fn complement(registered_perc: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(100.0 - registered_perc, 2)
    }
}

/// One bucket of a time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub date: String,
    pub value: usize,
}

/// Count events per calendar day between `first` and `last`, inclusive,
/// emitting a zero bucket for every day without events.
pub fn per_day<I>(timestamps: I, first: NaiveDate, last: NaiveDate) -> Vec<Bucket>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for day in first.iter_days().take_while(|d| *d <= last) {
        counts.insert(day, 0);
    }
    for ts in timestamps {
        if let Some(count) = counts.get_mut(&ts.date_naive()) {
            *count += 1;
        }
    }
    counts
        .into_iter()
        .map(|(day, value)| Bucket {
            date: day.format("%Y-%m-%d").to_string(),
            value,
        })
        .collect()
}

/// Sum daily buckets per calendar month.
pub fn per_month(days: &[Bucket]) -> Vec<Bucket> {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for bucket in days {
        let month = bucket.date.get(..7).unwrap_or(&bucket.date).to_string();
        *months.entry(month).or_insert(0) += bucket.value;
    }
    months
        .into_iter()
        .map(|(date, value)| Bucket { date, value })
        .collect()
}

fn span_days(ctx: &EvalContext) -> Result<(NaiveDate, NaiveDate), ComputationError> {
    ctx.event_span()
        .map(|(lo, hi)| (lo.date_naive(), hi.date_naive()))
        .ok_or(ComputationError::EmptyPopulation("no events in window"))
}

fn series<T: Timestamped>(ctx: &EvalContext, rows: &[T]) -> Result<Vec<Bucket>, ComputationError> {
    let (first, last) = span_days(ctx)?;
    Ok(per_day(rows.iter().map(Timestamped::timestamp), first, last))
}

fn to_value<T: Serialize>(value: T) -> ComputeResult {
    serde_json::to_value(value).map_err(|e| ComputationError::Failed(e.to_string()))
}

fn count_where(actions: &[UserAction], pred: impl Fn(&UserAction) -> bool) -> usize {
    actions.iter().filter(|a| pred(*a)).count()
}

// ─── Dates ──────────────────────────────────────────────────────────

pub fn start(ctx: &EvalContext) -> ComputeResult {
    let (lo, _) = ctx
        .event_span()
        .ok_or(ComputationError::EmptyPopulation("no events in window"))?;
    Ok(json!(lo.format("%Y-%m-%d %H:%M:%S").to_string()))
}

pub fn end(ctx: &EvalContext) -> ComputeResult {
    let (_, hi) = ctx
        .event_span()
        .ok_or(ComputationError::EmptyPopulation("no events in window"))?;
    Ok(json!(hi.format("%Y-%m-%d %H:%M:%S").to_string()))
}

// ─── Users and items ────────────────────────────────────────────────

pub fn users_count(ctx: &EvalContext) -> usize {
    ctx.users().len()
}

/// Distinct identities (registered and anonymous) among filtered actions.
pub fn users_all_count(ctx: &EvalContext) -> usize {
    ctx.user_actions()
        .iter()
        .map(|a| (a.registered, a.user_id.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct anonymous identities among filtered actions.
pub fn users_anonymous_count(ctx: &EvalContext) -> usize {
    ctx.user_actions()
        .iter()
        .filter(|a| !a.registered)
        .map(|a| a.user_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

pub fn users(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(users_count(ctx)))
}

pub fn users_anonymous(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(users_anonymous_count(ctx)))
}

pub fn users_all(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(users_all_count(ctx)))
}

pub fn items(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(ctx.items().len()))
}

// ─── User actions ───────────────────────────────────────────────────

pub fn user_actions_all(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(ctx.user_actions_all().len()))
}

pub fn user_actions(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(ctx.user_actions().len()))
}

fn registered_actions(ctx: &EvalContext) -> usize {
    count_where(ctx.user_actions(), |a| a.registered)
}

pub fn user_actions_registered(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(registered_actions(ctx)))
}

pub fn user_actions_anonymous(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(ctx.user_actions().len() - registered_actions(ctx)))
}

pub fn user_actions_registered_perc(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(percentage(registered_actions(ctx), ctx.user_actions().len())))
}

pub fn user_actions_anonymous_perc(ctx: &EvalContext) -> ComputeResult {
    let total = ctx.user_actions().len();
    let registered = percentage(registered_actions(ctx), total);
    Ok(json!(complement(registered, total)))
}

fn is_order(action: &UserAction) -> bool {
    (action.reward - ORDER_REWARD).abs() < f64::EPSILON
}

fn order_actions(ctx: &EvalContext) -> usize {
    count_where(ctx.user_actions(), is_order)
}

fn order_actions_registered(ctx: &EvalContext) -> usize {
    count_where(ctx.user_actions(), |a| a.registered && is_order(a))
}

pub fn user_actions_order(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(order_actions(ctx)))
}

pub fn user_actions_order_registered(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(order_actions_registered(ctx)))
}

pub fn user_actions_order_anonymous(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(order_actions(ctx) - order_actions_registered(ctx)))
}

pub fn user_actions_order_registered_perc(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(percentage(order_actions_registered(ctx), order_actions(ctx))))
}

pub fn user_actions_order_anonymous_perc(ctx: &EvalContext) -> ComputeResult {
    let total = order_actions(ctx);
    let registered = percentage(order_actions_registered(ctx), total);
    Ok(json!(complement(registered, total)))
}

fn panel_actions(ctx: &EvalContext) -> usize {
    count_where(ctx.user_actions(), |a| a.panel == RECOMMENDATION_PANEL)
}

pub fn user_actions_panel(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(panel_actions(ctx)))
}

pub fn user_actions_panel_perc(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(percentage(panel_actions(ctx), ctx.user_actions().len())))
}

/// Actions that count as item views (search pages and self-transitions
/// excluded), registered and anonymous.
pub fn item_views(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(count_where(ctx.user_actions(), |a| ctx.paths.is_view(a))))
}

// ─── Recommendations ────────────────────────────────────────────────

fn registered_recommendations(ctx: &EvalContext) -> usize {
    ctx.recommendations().iter().filter(|r| r.registered).count()
}

pub fn recommendations(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(ctx.recommendations().len()))
}

pub fn recommendations_registered(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(registered_recommendations(ctx)))
}

pub fn recommendations_anonymous(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(
        ctx.recommendations().len() - registered_recommendations(ctx)
    ))
}

pub fn recommendations_registered_perc(ctx: &EvalContext) -> ComputeResult {
    Ok(json!(percentage(
        registered_recommendations(ctx),
        ctx.recommendations().len()
    )))
}

pub fn recommendations_anonymous_perc(ctx: &EvalContext) -> ComputeResult {
    let total = ctx.recommendations().len();
    let registered = percentage(registered_recommendations(ctx), total);
    Ok(json!(complement(registered, total)))
}

// ─── Time series ────────────────────────────────────────────────────

pub fn user_actions_per_day(ctx: &EvalContext) -> ComputeResult {
    to_value(series(ctx, ctx.user_actions())?)
}

pub fn user_actions_per_month(ctx: &EvalContext) -> ComputeResult {
    to_value(per_month(&series(ctx, ctx.user_actions())?))
}

pub fn recommendations_per_day(ctx: &EvalContext) -> ComputeResult {
    to_value(series(ctx, ctx.recommendations())?)
}

pub fn recommendations_per_month(ctx: &EvalContext) -> ComputeResult {
    to_value(per_month(&series(ctx, ctx.recommendations())?))
}

/// Register every statistic, in report order.
pub fn register(registry: &mut Registry) {
    let all = [
        Computation::statistic("start", "The first event time found in user actions and recommendations", start),
        Computation::statistic("end", "The last event time found in user actions and recommendations", end),
        Computation::statistic("users", "The total number of unique registered users found in user actions", users),
        Computation::statistic("users_anonymous", "The total number of unique anonymous sessions found in user actions", users_anonymous),
        Computation::statistic("users_all", "The total number of unique identities (registered and anonymous) found in user actions", users_all),
        Computation::statistic("items", "The total number of unique published items in the catalog", items),
        Computation::statistic("user_actions_all", "The total number of user actions in the window, before catalog filtering", user_actions_all),
        Computation::statistic("user_actions", "The total number of user actions", user_actions),
        Computation::statistic("user_actions_registered", "The total number of user actions occurred by registered users", user_actions_registered),
        Computation::statistic("user_actions_anonymous", "The total number of user actions occurred by anonymous users", user_actions_anonymous),
        Computation::statistic("user_actions_registered_perc", "The percentage (%) of user actions occurred by registered users to the total user actions", user_actions_registered_perc),
        Computation::statistic("user_actions_anonymous_perc", "The percentage (%) of user actions occurred by anonymous users to the total user actions", user_actions_anonymous_perc),
        Computation::statistic("user_actions_order", "The total number of user actions that led to an order", user_actions_order),
        Computation::statistic("user_actions_order_registered", "The total number of user actions that led to an order by registered users", user_actions_order_registered),
        Computation::statistic("user_actions_order_anonymous", "The total number of user actions that led to an order by anonymous users", user_actions_order_anonymous),
        Computation::statistic("user_actions_order_registered_perc", "The percentage (%) of order actions occurred by registered users to the total order actions", user_actions_order_registered_perc),
        Computation::statistic("user_actions_order_anonymous_perc", "The percentage (%) of order actions occurred by anonymous users to the total order actions", user_actions_order_anonymous_perc),
        Computation::statistic("user_actions_panel", "The total number of user actions associated with the recommendation panel", user_actions_panel),
        Computation::statistic("user_actions_panel_perc", "The percentage (%) of user actions associated with the recommendation panel to the total user actions", user_actions_panel_perc),
        Computation::statistic("item_views", "The total number of item views (search pages and self-transitions excluded)", item_views),
        Computation::statistic("recommendations", "The total number of recommendations", recommendations),
        Computation::statistic("recommendations_registered", "The total number of recommendations for registered users", recommendations_registered),
        Computation::statistic("recommendations_anonymous", "The total number of recommendations for anonymous users", recommendations_anonymous),
        Computation::statistic("recommendations_registered_perc", "The percentage (%) of recommendations for registered users to the total recommendations", recommendations_registered_perc),
        Computation::statistic("recommendations_anonymous_perc", "The percentage (%) of recommendations for anonymous users to the total recommendations", recommendations_anonymous_perc),
        Computation::statistic("user_actions_per_day", "The number of user actions per day", user_actions_per_day),
        Computation::statistic("user_actions_per_month", "The number of user actions per month", user_actions_per_month),
        Computation::statistic("recommendations_per_day", "The number of recommendations per day", recommendations_per_day),
        Computation::statistic("recommendations_per_month", "The number of recommendations per month", recommendations_per_month),
    ];
    for computation in all {
        registry.register(computation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Tables;
    use crate::models::{Recommendation, ResourceRef, Schema};
    use crate::paths::PathRules;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn action(user: &str, registered: bool, reward: f64, panel: &str, at: &str) -> UserAction {
        UserAction {
            user_id: user.to_string(),
            registered,
            source_resource_id: ResourceRef::Unknown,
            target_resource_id: ResourceRef::Known("1".to_string()),
            source_path: "/services".to_string(),
            target_path: "/services/alpha".to_string(),
            panel: panel.to_string(),
            reward,
            timestamp: ts(at),
        }
    }

    fn rec(user: &str, registered: bool, at: &str) -> Recommendation {
        Recommendation {
            user_id: user.to_string(),
            registered,
            resource_id: ResourceRef::Known("1".to_string()),
            score: None,
            provider: "p".to_string(),
            timestamp: ts(at),
        }
    }

    fn ctx(actions: Vec<UserAction>, recs: Vec<Recommendation>) -> EvalContext {
        let tables = Tables {
            user_actions_all: actions.clone(),
            user_actions: actions,
            recommendations: recs,
            ..Default::default()
        };
        EvalContext::new(Schema::Current, "p", tables, PathRules::default_for(Schema::Legacy))
    }

    #[test]
    fn rounding() {
        assert!((round_to(33.33333, 2) - 33.33).abs() < 1e-9);
        assert!((round_to(2.0 / 3.0, 5) - 0.66667).abs() < 1e-9);
    }

    #[test]
    fn percentage_pairs_sum_to_hundred() {
        for (part, total) in [(1usize, 3usize), (2, 3), (0, 7), (7, 7), (5, 11)] {
            let reg = percentage(part, total);
            let anon = complement(reg, total);
            assert!((reg + anon - 100.0).abs() < 1e-9, "{} / {}", part, total);
        }
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(complement(percentage(0, 0), 0), 0.0);
    }

    #[test]
    fn per_day_fills_gaps() {
        let days = per_day(
            vec![ts("2024-01-01T08:00:00Z"), ts("2024-01-03T20:00:00Z")],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        );
        assert_eq!(
            days,
            vec![
                Bucket { date: "2024-01-01".to_string(), value: 1 },
                Bucket { date: "2024-01-02".to_string(), value: 0 },
                Bucket { date: "2024-01-03".to_string(), value: 1 },
            ]
        );
    }

    #[test]
    fn per_day_single_day_collapses() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();
        let days = per_day(vec![ts("2024-05-05T01:00:00Z"), ts("2024-05-05T02:00:00Z")], day, day);
        assert_eq!(days, vec![Bucket { date: "2024-05-05".to_string(), value: 2 }]);
    }

    #[test]
    fn per_month_sums_days() {
        let days = per_day(
            vec![ts("2024-01-31T08:00:00Z"), ts("2024-02-01T08:00:00Z"), ts("2024-02-02T08:00:00Z")],
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
        );
        let months = per_month(&days);
        assert_eq!(
            months,
            vec![
                Bucket { date: "2024-01".to_string(), value: 1 },
                Bucket { date: "2024-02".to_string(), value: 2 },
            ]
        );
    }

    #[test]
    fn series_span_covers_both_tables() {
        let ctx = ctx(
            vec![action("a", true, 0.0, "other", "2024-01-01T00:00:00Z")],
            vec![rec("a", true, "2024-01-03T00:00:00Z")],
        );
        let value = user_actions_per_day(&ctx).unwrap();
        let days = value.as_array().unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0]["value"], json!(1));
        assert_eq!(days[2]["value"], json!(0));
        assert_eq!(start(&ctx).unwrap(), json!("2024-01-01 00:00:00"));
        assert_eq!(end(&ctx).unwrap(), json!("2024-01-03 00:00:00"));
    }

    #[test]
    fn empty_window_series_fails() {
        let ctx = ctx(vec![], vec![]);
        assert!(user_actions_per_day(&ctx).is_err());
        assert!(start(&ctx).is_err());
    }

    #[test]
    fn action_counts_and_splits() {
        let ctx = ctx(
            vec![
                action("a", true, 1.0, "recommendation_panel", "2024-01-01T00:00:00Z"),
                action("a", true, 0.3, "other", "2024-01-01T00:00:00Z"),
                action("s1", false, 1.0, "other", "2024-01-01T00:00:00Z"),
                action("s2", false, 0.0, "recommendation_panel", "2024-01-01T00:00:00Z"),
            ],
            vec![
                rec("a", true, "2024-01-01T00:00:00Z"),
                rec("s1", false, "2024-01-01T00:00:00Z"),
                rec("s1", false, "2024-01-01T00:00:00Z"),
            ],
        );
        assert_eq!(user_actions_registered(&ctx).unwrap(), json!(2));
        assert_eq!(user_actions_anonymous(&ctx).unwrap(), json!(2));
        assert_eq!(user_actions_registered_perc(&ctx).unwrap(), json!(50.0));
        assert_eq!(user_actions_order(&ctx).unwrap(), json!(2));
        assert_eq!(user_actions_order_registered(&ctx).unwrap(), json!(1));
        assert_eq!(user_actions_order_anonymous_perc(&ctx).unwrap(), json!(50.0));
        assert_eq!(user_actions_panel(&ctx).unwrap(), json!(2));
        assert_eq!(user_actions_panel_perc(&ctx).unwrap(), json!(50.0));
        assert_eq!(users_anonymous(&ctx).unwrap(), json!(2));
        assert_eq!(users_all(&ctx).unwrap(), json!(3));
        assert_eq!(recommendations_registered_perc(&ctx).unwrap(), json!(33.33));
        assert_eq!(recommendations_anonymous_perc(&ctx).unwrap(), json!(66.67));
        assert_eq!(item_views(&ctx).unwrap(), json!(4));
    }

    #[test]
    fn zero_denominator_percentages() {
        let ctx = ctx(vec![], vec![]);
        assert_eq!(user_actions_registered_perc(&ctx).unwrap(), json!(0.0));
        assert_eq!(user_actions_anonymous_perc(&ctx).unwrap(), json!(0.0));
        assert_eq!(user_actions_order_anonymous_perc(&ctx).unwrap(), json!(0.0));
        assert_eq!(recommendations_anonymous_perc(&ctx).unwrap(), json!(0.0));
    }
}
