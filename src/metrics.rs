//! Case-level performance metrics
//!
//! Computes duration, activity diversity, interaction totals and substring-based
//! activity ratios for each case, plus per-session and per-activity summaries.
//!
//! The ratios here match activity names by *substring* (any activity containing
//! "Deeds" counts toward `deeds`). Behavioral conformance uses exact category
//! membership instead; the two policies are kept separate on purpose.

use crate::cases::{fold_cases, map_cases, CaseResults, Merge};
use crate::error::CaseFailure;
use crate::model::AnalysisConfig;
use crate::types::{EventLog, Trace};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Session label for cases whose events carry no session
pub const UNKNOWN_SESSION: &str = "unknown";

/// Performance metrics for a single case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMetrics {
    pub case_id: String,
    pub student_id: Option<String>,
    pub session: Option<String>,
    pub total_events: usize,
    /// Hours between first and last event (0 when fewer than two events)
    pub duration_hours: f64,
    pub unique_activities: usize,
    /// unique_activities / total_events
    pub activity_diversity: f64,
    /// Left plus right clicks
    pub total_clicks: u64,
    pub total_keystrokes: u64,
    pub total_mouse_movement: u64,
    pub total_idle_time_minutes: f64,
    /// Share of events whose activity contains each configured substring
    pub substring_ratios: BTreeMap<String, f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Calculator for per-case metrics
#[derive(Debug, Clone)]
pub struct CaseMetricsCalculator {
    substring_categories: BTreeMap<String, String>,
}

impl Default for CaseMetricsCalculator {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl CaseMetricsCalculator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            substring_categories: config.substring_categories.clone(),
        }
    }

    /// Compute metrics for every case in the log
    pub fn compute(&self, log: &EventLog) -> CaseResults<CaseMetrics> {
        let results = map_cases(log, |trace| Ok(self.case_metrics(trace)));
        tracing::debug!(cases = results.len(), "computed case metrics");
        results
    }

    /// Compute metrics for one trace
    pub fn case_metrics(&self, trace: &Trace) -> CaseMetrics {
        let total_events = trace.len();
        let unique_activities = trace
            .events()
            .iter()
            .map(|e| e.activity.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let mut total_clicks = 0;
        let mut total_keystrokes = 0;
        let mut total_mouse_movement = 0;
        let mut total_idle_ms = 0.0;
        for event in trace.events() {
            total_clicks += event.counters.clicks();
            total_keystrokes += event.counters.keystroke.unwrap_or(0);
            total_mouse_movement += event.counters.mouse_movement.unwrap_or(0);
            total_idle_ms += event.counters.idle_time_ms.unwrap_or(0.0);
        }

        let substring_ratios = self
            .substring_categories
            .iter()
            .map(|(label, needle)| {
                let matching = trace
                    .events()
                    .iter()
                    .filter(|e| e.activity.contains(needle.as_str()))
                    .count();
                (label.clone(), ratio(matching, total_events))
            })
            .collect();

        let first = trace.first();
        CaseMetrics {
            case_id: trace.case_id().to_string(),
            student_id: first.and_then(|e| e.student_id.clone()),
            session: first.and_then(|e| e.session.clone()),
            total_events,
            duration_hours: trace.duration_sec() / 3600.0,
            unique_activities,
            activity_diversity: ratio(unique_activities, total_events),
            total_clicks,
            total_keystrokes,
            total_mouse_movement,
            total_idle_time_minutes: total_idle_ms / 1000.0 / 60.0,
            substring_ratios,
            start_time: first.map(|e| e.timestamp),
            end_time: trace.last().map(|e| e.timestamp),
        }
    }
}

/// Compute per-case metrics with the default substring categories
pub fn compute_case_metrics(log: &EventLog) -> CaseResults<CaseMetrics> {
    CaseMetricsCalculator::default().compute(log)
}

/// `part / whole`, or 0 when `whole` is 0
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Averages over the cases of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub case_count: usize,
    pub avg_duration_hours: f64,
    pub avg_events: f64,
    pub avg_activity_diversity: f64,
    pub avg_clicks: f64,
    pub avg_keystrokes: f64,
    pub avg_idle_time_minutes: f64,
    pub avg_substring_ratios: BTreeMap<String, f64>,
}

/// Group case metrics by session and average them
pub fn summarize_sessions(
    metrics: &CaseResults<CaseMetrics>,
) -> BTreeMap<String, SessionSummary> {
    let mut by_session: BTreeMap<String, Vec<&CaseMetrics>> = BTreeMap::new();
    for m in metrics.values() {
        let label = m.session.clone().unwrap_or_else(|| UNKNOWN_SESSION.to_string());
        by_session.entry(label).or_default().push(m);
    }

    by_session
        .into_iter()
        .map(|(session, cases)| {
            let mean = |f: &dyn Fn(&CaseMetrics) -> f64| -> f64 {
                cases.iter().map(|&m| f(m)).sum::<f64>() / cases.len() as f64
            };

            let labels: BTreeSet<&String> = cases
                .iter()
                .flat_map(|m| m.substring_ratios.keys())
                .collect();
            let avg_substring_ratios = labels
                .into_iter()
                .map(|label| {
                    let avg = mean(&|m| m.substring_ratios.get(label).copied().unwrap_or(0.0));
                    (label.clone(), avg)
                })
                .collect();

            let summary = SessionSummary {
                case_count: cases.len(),
                avg_duration_hours: mean(&|m| m.duration_hours),
                avg_events: mean(&|m| m.total_events as f64),
                avg_activity_diversity: mean(&|m| m.activity_diversity),
                avg_clicks: mean(&|m| m.total_clicks as f64),
                avg_keystrokes: mean(&|m| m.total_keystrokes as f64),
                avg_idle_time_minutes: mean(&|m| m.total_idle_time_minutes),
                avg_substring_ratios,
            };
            (session, summary)
        })
        .collect()
}

/// Statistics over precomputed event durations of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub count: usize,
    pub mean_sec: f64,
    pub median_sec: f64,
    /// Sample standard deviation; absent with fewer than two observations
    pub std_dev_sec: Option<f64>,
}

/// Log-wide activity frequencies, hour-of-day distribution and durations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityProfile {
    pub frequency: BTreeMap<String, u64>,
    /// Event count per UTC hour (0-23)
    pub hourly_distribution: BTreeMap<u32, u64>,
    pub durations: BTreeMap<String, DurationSummary>,
    /// Cases whose events were not counted
    #[serde(default)]
    pub unanalyzable: Vec<CaseFailure>,
}

#[derive(Default)]
struct ActivityTally {
    frequency: BTreeMap<String, u64>,
    hourly: BTreeMap<u32, u64>,
    durations: BTreeMap<String, Vec<f64>>,
}

impl Merge for ActivityTally {
    fn merge(&mut self, other: Self) {
        self.frequency.merge(other.frequency);
        self.hourly.merge(other.hourly);
        for (activity, values) in other.durations {
            self.durations.entry(activity).or_default().merge(values);
        }
    }
}

/// Profile activity usage across the whole log
pub fn profile_activities(log: &EventLog) -> ActivityProfile {
    let (tally, unanalyzable) = fold_cases(log, |trace| {
        let mut tally = ActivityTally::default();
        for event in trace.events() {
            *tally.frequency.entry(event.activity.clone()).or_insert(0) += 1;
            *tally.hourly.entry(event.timestamp.hour()).or_insert(0) += 1;
            if let Some(d) = event.duration_sec.filter(|d| d.is_finite()) {
                tally
                    .durations
                    .entry(event.activity.clone())
                    .or_default()
                    .push(d);
            }
        }
        tally
    });

    let durations = tally
        .durations
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(activity, values)| (activity, summarize_durations(values)))
        .collect();

    ActivityProfile {
        frequency: tally.frequency,
        hourly_distribution: tally.hourly,
        durations,
        unanalyzable,
    }
}

fn summarize_durations(mut values: Vec<f64>) -> DurationSummary {
    // Sorted first so the summation order is fixed
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };
    let std_dev = if n > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(variance.sqrt())
    } else {
        None
    };

    DurationSummary {
        count: n,
        mean_sec: mean,
        median_sec: median,
        std_dev_sec: std_dev,
    }
}
