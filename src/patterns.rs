//! Variant, sequence, rework and anomaly analysis
//!
//! A *variant* is the exact ordered list of activity names in a trace. Per-case
//! tables are built independently and merged, and every ranking breaks ties on
//! the element itself so results never depend on case order.

use crate::cases::{fold_cases, Merge};
use crate::error::CaseFailure;
use crate::model::AnalysisConfig;
use crate::types::{EventLog, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reason attached to variants flagged for their length
pub const UNUSUAL_LENGTH: &str = "Unusual length";

/// A reported variant with its supporting cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEntry {
    /// "Variant 1", "Variant 2", ...
    pub label: String,
    pub activities: Vec<String>,
    pub count: u64,
}

/// Cases whose variant fell outside the top entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherVariants {
    pub label: String,
    pub case_count: u64,
    pub variant_count: usize,
}

/// Frequency of one directly-follows pair across the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceCount {
    pub from: String,
    pub to: String,
    pub count: u64,
}

impl SequenceCount {
    pub fn label(&self) -> String {
        format!("{} → {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReworkCount {
    pub activity: String,
    pub count: u64,
}

/// A single-case variant whose length is far from the median
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub case_id: String,
    pub variant: Vec<String>,
    pub length: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub path: Vec<String>,
    pub count: u64,
}

/// Paths with consecutive repeats collapsed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningPaths {
    pub total_paths: usize,
    pub top: Vec<LearningPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub total_cases: u64,
    pub total_variants: usize,
    pub variants: Vec<VariantEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_variants: Option<OtherVariants>,
    pub common_sequences: Vec<SequenceCount>,
    pub rework: Vec<ReworkCount>,
    pub median_trace_length: f64,
    pub anomalies: Vec<Anomaly>,
    pub learning_paths: LearningPaths,
    /// Cases left out of every table above
    #[serde(default)]
    pub unanalyzable: Vec<CaseFailure>,
}

impl PatternReport {
    /// Supporting cases of every variant, reported or bucketed
    pub fn variant_case_total(&self) -> u64 {
        self.variants.iter().map(|v| v.count).sum::<u64>()
            + self.other_variants.as_ref().map_or(0, |o| o.case_count)
    }

    pub fn rework_for(&self, activity: &str) -> u64 {
        self.rework
            .iter()
            .find(|r| r.activity == activity)
            .map_or(0, |r| r.count)
    }
}

#[derive(Default)]
struct PatternTally {
    variants: BTreeMap<Vec<String>, Vec<String>>,
    bigrams: BTreeMap<(String, String), u64>,
    rework: BTreeMap<String, u64>,
    lengths: Vec<usize>,
    paths: BTreeMap<Vec<String>, u64>,
}

impl Merge for PatternTally {
    fn merge(&mut self, other: Self) {
        for (variant, cases) in other.variants {
            self.variants.entry(variant).or_default().merge(cases);
        }
        self.bigrams.merge(other.bigrams);
        self.rework.merge(other.rework);
        self.lengths.merge(other.lengths);
        self.paths.merge(other.paths);
    }
}

/// Per-activity count of repeats after the first occurrence
pub fn rework_counts(activities: &[&str]) -> BTreeMap<String, u64> {
    let mut seen = std::collections::BTreeSet::new();
    let mut rework = BTreeMap::new();
    for &activity in activities {
        if !seen.insert(activity) {
            *rework.entry(activity.to_string()).or_insert(0) += 1;
        }
    }
    rework
}

/// Activities with consecutive repeats collapsed
pub fn collapse_repeats(activities: &[&str]) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    for &activity in activities {
        if path.last().map(String::as_str) != Some(activity) {
            path.push(activity.to_string());
        }
    }
    path
}

/// Median of the lengths; the mean of the two middle values for even counts
pub fn median_length(lengths: &[usize]) -> f64 {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 0 => (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0,
        _ => sorted[n / 2] as f64,
    }
}

/// Analyzer with configurable report sizes and anomaly threshold
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    top_variants: usize,
    top_sequences: usize,
    top_learning_paths: usize,
    anomaly_length_threshold: f64,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl PatternAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            top_variants: config.top_variants,
            top_sequences: config.top_sequences,
            top_learning_paths: config.top_learning_paths,
            anomaly_length_threshold: config.anomaly_length_threshold,
        }
    }

    pub fn analyze(&self, log: &EventLog) -> PatternReport {
        let (tally, unanalyzable) = fold_cases(log, Self::tally_trace);

        let total_cases = tally.variants.values().map(|c| c.len() as u64).sum();
        let median_trace_length = median_length(&tally.lengths);

        let mut anomalies: Vec<Anomaly> = tally
            .variants
            .iter()
            .filter(|(_, cases)| cases.len() == 1)
            .filter(|(variant, _)| {
                (variant.len() as f64 - median_trace_length).abs() > self.anomaly_length_threshold
            })
            .map(|(variant, cases)| Anomaly {
                case_id: cases[0].clone(),
                variant: variant.clone(),
                length: variant.len(),
                reason: UNUSUAL_LENGTH.to_string(),
            })
            .collect();
        anomalies.sort_by(|a, b| a.case_id.cmp(&b.case_id));

        let total_variants = tally.variants.len();
        let mut ranked: Vec<(Vec<String>, u64)> = tally
            .variants
            .into_iter()
            .map(|(variant, cases)| (variant, cases.len() as u64))
            .collect();
        sort_by_count(&mut ranked);

        let rest = ranked.split_off(self.top_variants.min(ranked.len()));
        let other_variants = (!rest.is_empty()).then(|| OtherVariants {
            label: format!("Other ({} variants)", rest.len()),
            case_count: rest.iter().map(|(_, c)| c).sum(),
            variant_count: rest.len(),
        });
        let variants = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (activities, count))| VariantEntry {
                label: format!("Variant {}", i + 1),
                activities,
                count,
            })
            .collect();

        let mut bigrams: Vec<((String, String), u64)> = tally.bigrams.into_iter().collect();
        sort_by_count(&mut bigrams);
        bigrams.truncate(self.top_sequences);
        let common_sequences = bigrams
            .into_iter()
            .map(|((from, to), count)| SequenceCount { from, to, count })
            .collect();

        let mut rework: Vec<(String, u64)> = tally
            .rework
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();
        sort_by_count(&mut rework);
        let rework = rework
            .into_iter()
            .map(|(activity, count)| ReworkCount { activity, count })
            .collect();

        let total_paths = tally.paths.len();
        let mut paths: Vec<(Vec<String>, u64)> = tally.paths.into_iter().collect();
        sort_by_count(&mut paths);
        paths.truncate(self.top_learning_paths);
        let learning_paths = LearningPaths {
            total_paths,
            top: paths
                .into_iter()
                .map(|(path, count)| LearningPath { path, count })
                .collect(),
        };

        tracing::debug!(
            cases = total_cases,
            variants = total_variants,
            anomalies = anomalies.len(),
            skipped = unanalyzable.len(),
            "analyzed patterns"
        );

        PatternReport {
            total_cases,
            total_variants,
            variants,
            other_variants,
            common_sequences,
            rework,
            median_trace_length,
            anomalies,
            learning_paths,
            unanalyzable,
        }
    }

    fn tally_trace(trace: &Trace) -> PatternTally {
        let activities = trace.activities();
        let mut tally = PatternTally::default();

        tally.variants.insert(
            activities.iter().map(|a| a.to_string()).collect(),
            vec![trace.case_id().to_string()],
        );
        for (from, to) in trace.transitions() {
            *tally
                .bigrams
                .entry((from.to_string(), to.to_string()))
                .or_insert(0) += 1;
        }
        tally.rework = rework_counts(&activities);
        tally.lengths.push(activities.len());
        tally.paths.insert(collapse_repeats(&activities), 1);
        tally
    }
}

// Count descending, then key ascending
fn sort_by_count<K: Ord>(entries: &mut [(K, u64)]) {
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

/// Variants, common sequences, rework and anomalies with default settings
pub fn analyze_patterns(log: &EventLog) -> PatternReport {
    PatternAnalyzer::default().analyze(log)
}
