//! # rsmetrics core
//!
//! The evaluation engine of rsmetrics: it reconciles the two event schemas
//! into canonical tables, filters them against the active catalog and
//! window, runs every registered statistic and metric with per-computation
//! failure isolation, and assembles the report.
//!
//! This crate contains no sqlx, filesystem I/O or runtime setup; storage
//! is reached through the [`store::Store`] trait.
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Raw and canonical records, schema tag, window |
//! | [`normalize`] | Identity classification, resource ids, item dedup |
//! | [`filter`] | Window and catalog filtering, user derivation |
//! | [`paths`] | Search-page / recommendation-surface rules |
//! | [`context`] | Read-only input of every computation |
//! | [`registry`] | Computation registry and isolated executor |
//! | [`statistics`] | Counts, ratios and time series |
//! | [`metrics`] | Coverage, diversity, novelty, accuracy, hit rate, CTR, top-k |
//! | [`report`] | The report document |
//! | [`store`] | Storage trait and in-memory store |
//! | [`pipeline`] | Load → prepare → execute → assemble |

pub mod context;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod statistics;
pub mod store;
