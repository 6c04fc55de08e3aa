//! Per-case map/reduce over an event log
//!
//! Each trace is validated and evaluated independently. Results are collected
//! into case-id order, and cross-case tables are merged with [`Merge`], so the
//! output never depends on evaluation order. With the `parallel` feature the
//! per-case step runs on the rayon thread pool.

use crate::error::{CaseError, CaseFailure};
use crate::types::{EventLog, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-case results plus the cases that could not be analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResults<T> {
    pub results: BTreeMap<String, T>,
    #[serde(default)]
    pub unanalyzable: Vec<CaseFailure>,
}

impl<T> Default for CaseResults<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            unanalyzable: Vec::new(),
        }
    }
}

impl<T> CaseResults<T> {
    pub fn get(&self, case_id: &str) -> Option<&T> {
        self.results.get(case_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.results.values()
    }
}

/// Associative, commutative combination of partial aggregates
pub trait Merge {
    fn merge(&mut self, other: Self);
}

impl<K: Ord> Merge for BTreeMap<K, u64> {
    fn merge(&mut self, other: Self) {
        for (key, count) in other {
            *self.entry(key).or_insert(0) += count;
        }
    }
}

impl<T> Merge for Vec<T> {
    fn merge(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

fn evaluate<T, F>(trace: &Trace, f: &F) -> Result<T, CaseError>
where
    F: Fn(&Trace) -> Result<T, CaseError>,
{
    trace.validate()?;
    f(trace)
}

fn record_failures(failures: &mut [CaseFailure]) {
    failures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    for failure in failures.iter() {
        tracing::warn!(case_id = %failure.case_id, reason = %failure.reason, "skipping unanalyzable case");
    }
}

/// Evaluate `f` on every valid trace, keyed by case id
pub fn map_cases<T, F>(log: &EventLog, f: F) -> CaseResults<T>
where
    T: Send,
    F: Fn(&Trace) -> Result<T, CaseError> + Sync,
{
    let traces: Vec<&Trace> = log.traces().collect();

    #[cfg(feature = "parallel")]
    let outcomes: Vec<(&str, Result<T, CaseError>)> = traces
        .par_iter()
        .map(|trace| (trace.case_id(), evaluate(*trace, &f)))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<(&str, Result<T, CaseError>)> = traces
        .iter()
        .map(|trace| (trace.case_id(), evaluate(*trace, &f)))
        .collect();

    let mut collected = CaseResults::default();
    for (case_id, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                collected.results.insert(case_id.to_string(), value);
            }
            Err(e) => collected.unanalyzable.push(CaseFailure::new(case_id, &e)),
        }
    }
    record_failures(&mut collected.unanalyzable);
    collected
}

/// Fold every valid trace into a single aggregate.
///
/// Invalid traces contribute nothing and are returned as failures.
pub fn fold_cases<A, F>(log: &EventLog, f: F) -> (A, Vec<CaseFailure>)
where
    A: Merge + Default + Send,
    F: Fn(&Trace) -> A + Sync,
{
    let partial = |trace: &Trace| -> (A, Vec<CaseFailure>) {
        match trace.validate() {
            Ok(()) => (f(trace), Vec::new()),
            Err(e) => (A::default(), vec![CaseFailure::new(trace.case_id(), &e)]),
        }
    };
    let combine = |mut left: (A, Vec<CaseFailure>), right: (A, Vec<CaseFailure>)| {
        left.0.merge(right.0);
        left.1.merge(right.1);
        left
    };

    let traces: Vec<&Trace> = log.traces().collect();

    #[cfg(feature = "parallel")]
    let (aggregate, mut failures) = traces
        .par_iter()
        .map(|trace| partial(*trace))
        .reduce(|| (A::default(), Vec::new()), combine);

    #[cfg(not(feature = "parallel"))]
    let (aggregate, mut failures) = traces
        .iter()
        .map(|trace| partial(*trace))
        .fold((A::default(), Vec::new()), combine);

    record_failures(&mut failures);
    (aggregate, failures)
}
