//! # rsmetrics
//!
//! Offline evaluation of recommender systems: reads navigation events,
//! served recommendations and the item catalog from SQLite, computes a
//! catalog of statistics and quality metrics for one provider, and stores
//! the result as a named report.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────────┐
//! │ JSON dumps   │──▶│ SQLite       │──▶│ rsmetrics-core         │
//! │ (import)     │   │ input tables │   │ normalize → filter →   │
//! └──────────────┘   └──────────────┘   │ registry → report      │
//!                           ▲           └───────────┬────────────┘
//!                           └──── reports ◀─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rsmetrics init
//! rsmetrics import items ./dumps/items.json
//! rsmetrics import user_actions ./dumps/user_actions.json
//! rsmetrics import recommendations ./dumps/recommendations.json
//! rsmetrics evaluate --provider marketplace_rs --start 2024-01-01 --end 2024-01-31
//! rsmetrics reports
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`import`] | JSON import of input tables |
//! | [`evaluate`] | The `evaluate` command |
//! | [`reports`] | Stored report listing and display |

pub mod config;
pub mod db;
pub mod evaluate;
pub mod import;
pub mod migrate;
pub mod reports;
pub mod sqlite_store;
