//! Computation registry and executor.
//!
//! Every statistic and metric is a [`Computation`]: a name, a [`Kind`], a
//! line of documentation and a plain function of the [`EvalContext`]. The
//! set is enumerated explicitly in [`Registry::standard`]; there is no
//! discovery.
//!
//! # Failure isolation
//!
//! [`Registry::execute`] runs each computation on its own. A computation
//! that returns an error, or panics, yields a null value and its name is
//! appended to [`Evaluation::errors`]. Every other computation still runs.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐
//! │ Registry     │───▶│ run_isolated │───▶│ Evaluation          │
//! │ (ordered)    │    │ Ok / Err /   │    │ statistics, metrics │
//! └──────────────┘    │ panic        │    │ errors              │
//!                     └──────────────┘    └─────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::ComputationError;
use crate::{metrics, statistics};

/// Result type of a single computation.
pub type ComputeResult = Result<Value, ComputationError>;

/// Signature shared by all computations.
pub type ComputeFn = fn(&EvalContext) -> ComputeResult;

/// Report section a computation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Statistic,
    Metric,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Statistic => "statistic",
            Kind::Metric => "metric",
        }
    }
}

/// A registered statistic or metric.
#[derive(Debug, Clone, Copy)]
pub struct Computation {
    pub name: &'static str,
    pub kind: Kind,
    pub doc: &'static str,
    pub compute: ComputeFn,
}

impl Computation {
    pub const fn statistic(name: &'static str, doc: &'static str, compute: ComputeFn) -> Self {
        Self {
            name,
            kind: Kind::Statistic,
            doc,
            compute,
        }
    }

    pub const fn metric(name: &'static str, doc: &'static str, compute: ComputeFn) -> Self {
        Self {
            name,
            kind: Kind::Metric,
            doc,
            compute,
        }
    }
}

/// One `{name, value, doc}` entry of a report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub value: Value,
    pub doc: String,
}

/// Outcome of executing a registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub statistics: Vec<Entry>,
    pub metrics: Vec<Entry>,
    /// Names of the computations that failed, in execution order.
    pub errors: Vec<String>,
}

/// Ordered set of computations.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    computations: Vec<Computation>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full catalog: all statistics, then all metrics.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        statistics::register(&mut registry);
        metrics::register(&mut registry);
        registry
    }

    /// Add a computation. A computation with the same name is replaced in
    /// place, keeping its position.
    pub fn register(&mut self, computation: Computation) -> &mut Self {
        match self
            .computations
            .iter_mut()
            .find(|c| c.name == computation.name)
        {
            Some(existing) => *existing = computation,
            None => self.computations.push(computation),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Computation> {
        self.computations.iter()
    }

    pub fn len(&self) -> usize {
        self.computations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computations.is_empty()
    }

    /// Run every computation against `ctx`.
    pub fn execute(&self, ctx: &EvalContext) -> Evaluation {
        let mut evaluation = Evaluation::default();
        for computation in self.iter() {
            tracing::debug!(
                "Evaluating {}: {}...",
                computation.kind.as_str(),
                computation.name
            );
            let value = match run_isolated(computation, ctx) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(
                        computation = computation.name,
                        "{} {} failed: {}",
                        computation.kind.as_str(),
                        computation.name,
                        err
                    );
                    evaluation.errors.push(computation.name.to_string());
                    Value::Null
                }
            };
            let entry = Entry {
                name: computation.name.to_string(),
                value,
                doc: computation.doc.to_string(),
            };
            match computation.kind {
                Kind::Statistic => evaluation.statistics.push(entry),
                Kind::Metric => evaluation.metrics.push(entry),
            }
        }
        evaluation
    }
}

/// Run one computation, converting a panic into a [`ComputationError`].
pub fn run_isolated(computation: &Computation, ctx: &EvalContext) -> ComputeResult {
    match panic::catch_unwind(AssertUnwindSafe(|| (computation.compute)(ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ComputationError::Panicked(message))
        }
    }
}
