use thiserror::Error;

/// Why a single statistic or metric could not produce a value.
///
/// These never abort a run: the executor records the computation name in
/// the report's `errors` list and emits a null value in its place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    /// The population the value is averaged or normalized over is empty.
    #[error("empty population: {0}")]
    EmptyPopulation(&'static str),

    /// A legacy-schema aggregation needs a taxonomy table that was not loaded.
    #[error("missing taxonomy table: {0}")]
    MissingTaxonomy(&'static str),

    /// The computation panicked; the payload message is kept.
    #[error("computation panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// Fatal errors that stop a run before a report is produced.
#[derive(Error, Debug)]
pub enum EvaluationError {
    /// Reading from the store failed.
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),

    /// One or more of the core tables is empty after filtering.
    #[error("not enough data: {}", .0.join(", "))]
    InsufficientData(Vec<String>),
}
