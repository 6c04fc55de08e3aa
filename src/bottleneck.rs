//! Processing-time and waiting-time bottlenecks
//!
//! Traces are split into maximal runs of the same activity. A run's processing
//! time is the span from its first to its last event; the waiting time of a
//! transition is the gap between one run's last event and the next run's first.

use crate::cases::{fold_cases, Merge};
use crate::error::CaseFailure;
use crate::types::{Event, EventLog, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of entries kept in each ranking by [`detect_bottlenecks`]
pub const DEFAULT_TOP_BOTTLENECKS: usize = 5;

/// Human-readable duration: seconds, minutes, hours or days with one decimal
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1} seconds", seconds)
    } else if seconds < 3600.0 {
        format!("{:.1} minutes", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1} hours", seconds / 3600.0)
    } else {
        format!("{:.1} days", seconds / 86400.0)
    }
}

/// One ranked activity or transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckEntry {
    /// Activity name, or "A → B" for a transition
    pub element: String,
    pub mean_seconds: f64,
    pub formatted: String,
    pub occurrences: u64,
}

/// Slowest activities and transitions of the log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckRanking {
    /// By mean processing time
    pub activities: Vec<BottleneckEntry>,
    /// By mean waiting time
    pub transitions: Vec<BottleneckEntry>,
    /// Cases left out of the tallies
    #[serde(default)]
    pub unanalyzable: Vec<CaseFailure>,
}

/// A maximal run of one activity within a trace
#[derive(Debug, Clone, Copy)]
pub struct ActivityRun<'a> {
    pub first: &'a Event,
    pub last: &'a Event,
    pub len: usize,
}

impl<'a> ActivityRun<'a> {
    pub fn activity(&self) -> &'a str {
        &self.first.activity
    }

    fn processing_ms(&self) -> i64 {
        (self.last.timestamp - self.first.timestamp).num_milliseconds()
    }
}

/// Split a trace into maximal runs of identical consecutive activity
pub fn activity_runs(trace: &Trace) -> Vec<ActivityRun<'_>> {
    let mut runs: Vec<ActivityRun<'_>> = Vec::new();
    for event in trace.events() {
        match runs.last_mut() {
            Some(run) if run.last.activity == event.activity => {
                run.last = event;
                run.len += 1;
            }
            _ => runs.push(ActivityRun {
                first: event,
                last: event,
                len: 1,
            }),
        }
    }
    runs
}

// Millisecond totals keep the merge exact regardless of order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DurationTally {
    total_ms: i64,
    count: u64,
}

impl DurationTally {
    fn record(&mut self, ms: i64) {
        self.total_ms += ms;
        self.count += 1;
    }

    fn mean_seconds(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / 1000.0 / self.count as f64
        }
    }
}

#[derive(Default)]
struct BottleneckTally {
    processing: BTreeMap<String, DurationTally>,
    waiting: BTreeMap<(String, String), DurationTally>,
}

impl Merge for BottleneckTally {
    fn merge(&mut self, other: Self) {
        for (activity, t) in other.processing {
            let slot = self.processing.entry(activity).or_default();
            slot.total_ms += t.total_ms;
            slot.count += t.count;
        }
        for (pair, t) in other.waiting {
            let slot = self.waiting.entry(pair).or_default();
            slot.total_ms += t.total_ms;
            slot.count += t.count;
        }
    }
}

/// Detector with a configurable ranking size
#[derive(Debug, Clone)]
pub struct BottleneckDetector {
    top_n: usize,
}

impl Default for BottleneckDetector {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_BOTTLENECKS)
    }
}

impl BottleneckDetector {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn detect(&self, log: &EventLog) -> BottleneckRanking {
        let (tally, unanalyzable) = fold_cases(log, Self::tally_trace);

        let activities = rank(tally.processing.into_iter(), self.top_n);
        let transitions = rank(
            tally
                .waiting
                .into_iter()
                .map(|((from, to), t)| (format!("{} → {}", from, to), t)),
            self.top_n,
        );

        tracing::debug!(
            activities = activities.len(),
            transitions = transitions.len(),
            "ranked bottlenecks"
        );
        BottleneckRanking {
            activities,
            transitions,
            unanalyzable,
        }
    }

    fn tally_trace(trace: &Trace) -> BottleneckTally {
        let mut tally = BottleneckTally::default();
        let runs = activity_runs(trace);

        for run in &runs {
            tally
                .processing
                .entry(run.activity().to_string())
                .or_default()
                .record(run.processing_ms());
        }
        for pair in runs.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let wait = (next.first.timestamp - current.last.timestamp).num_milliseconds();
            tally
                .waiting
                .entry((current.activity().to_string(), next.activity().to_string()))
                .or_default()
                .record(wait);
        }
        tally
    }
}

fn rank(
    tallies: impl Iterator<Item = (String, DurationTally)>,
    top_n: usize,
) -> Vec<BottleneckEntry> {
    let mut entries: Vec<BottleneckEntry> = tallies
        .map(|(element, t)| {
            let mean_seconds = t.mean_seconds();
            BottleneckEntry {
                formatted: format_duration(mean_seconds),
                element,
                mean_seconds,
                occurrences: t.count,
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        b.mean_seconds
            .total_cmp(&a.mean_seconds)
            .then_with(|| a.element.cmp(&b.element))
    });
    entries.truncate(top_n);
    entries
}

/// Top five activities by processing time and transitions by waiting time
pub fn detect_bottlenecks(log: &EventLog) -> BottleneckRanking {
    BottleneckDetector::default().detect(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn event(case_id: &str, activity: &str, minutes: i64) -> Event {
        Event::new(case_id, activity, t0() + Duration::minutes(minutes))
    }

    #[test]
    fn test_run_processing_and_waiting_time() {
        let log = EventLog::from_events(vec![
            event("c", "Deeds", 0),
            event("c", "Deeds", 1),
            event("c", "Study", 10),
        ]);
        let ranking = detect_bottlenecks(&log);

        assert_eq!(
            ranking.activities,
            vec![
                BottleneckEntry {
                    element: "Deeds".to_string(),
                    mean_seconds: 60.0,
                    formatted: "1.0 minutes".to_string(),
                    occurrences: 1,
                },
                BottleneckEntry {
                    element: "Study".to_string(),
                    mean_seconds: 0.0,
                    formatted: "0.0 seconds".to_string(),
                    occurrences: 1,
                },
            ]
        );
        assert_eq!(
            ranking.transitions,
            vec![BottleneckEntry {
                element: "Deeds → Study".to_string(),
                mean_seconds: 540.0,
                formatted: "9.0 minutes".to_string(),
                occurrences: 1,
            }]
        );
    }

    #[test]
    fn test_runs_are_split_on_activity_change() {
        let trace = Trace::new(
            "c",
            vec![
                event("c", "A", 0),
                event("c", "A", 1),
                event("c", "B", 2),
                event("c", "A", 3),
            ],
        );
        let runs = activity_runs(&trace);
        let shape: Vec<(&str, usize)> = runs.iter().map(|r| (r.activity(), r.len)).collect();
        assert_eq!(shape, vec![("A", 2), ("B", 1), ("A", 1)]);
    }

    #[test]
    fn test_means_aggregate_across_cases() {
        let log = EventLog::from_events(vec![
            event("a", "Deeds", 0),
            event("a", "Deeds", 2),
            event("b", "Deeds", 0),
            event("b", "Deeds", 4),
        ]);
        let ranking = detect_bottlenecks(&log);
        assert_eq!(ranking.activities[0].mean_seconds, 180.0);
        assert_eq!(ranking.activities[0].occurrences, 2);
        assert!(ranking.transitions.is_empty());
    }

    #[test]
    fn test_ties_break_by_name_and_truncate() {
        let events = ["F", "E", "D", "C", "B", "A"]
            .iter()
            .enumerate()
            .map(|(i, a)| event(&format!("case{}", i), a, 0))
            .collect::<Vec<_>>();
        let ranking = detect_bottlenecks(&EventLog::from_events(events));
        let names: Vec<&str> = ranking
            .activities
            .iter()
            .map(|e| e.element.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_degenerate_traces() {
        let log = EventLog::from_events(vec![event("solo", "X", 0)]);
        let ranking = detect_bottlenecks(&log);
        assert_eq!(ranking.activities.len(), 1);
        assert_eq!(ranking.activities[0].mean_seconds, 0.0);
        assert!(detect_bottlenecks(&EventLog::new()).activities.is_empty());
    }

    #[test]
    fn test_foreign_event_case_is_reported() {
        let log = EventLog::from_traces(vec![
            Trace::new("bad", vec![event("other", "Deeds", 0)]),
            Trace::new("good", vec![event("good", "Deeds", 0), event("good", "Deeds", 3)]),
        ]);
        let ranking = detect_bottlenecks(&log);

        assert_eq!(ranking.activities.len(), 1);
        assert_eq!(ranking.activities[0].occurrences, 1);
        assert_eq!(ranking.activities[0].mean_seconds, 180.0);
        assert_eq!(ranking.unanalyzable.len(), 1);
        assert_eq!(ranking.unanalyzable[0].case_id, "bad");
    }

    #[test]
    fn test_empty_trace_contributes_nothing() {
        let log = EventLog::from_traces(vec![
            Trace::new("empty", vec![]),
            Trace::new("c", vec![event("c", "A", 0), event("c", "B", 2)]),
        ]);
        let ranking = detect_bottlenecks(&log);

        assert_eq!(ranking.activities.len(), 2);
        assert_eq!(ranking.transitions.len(), 1);
        assert_eq!(ranking.transitions[0].mean_seconds, 120.0);
        assert!(ranking.unanalyzable.is_empty());
    }

    #[test]
    fn test_format_duration_buckets() {
        assert_eq!(format_duration(59.0), "59.0 seconds");
        assert_eq!(format_duration(90.0), "1.5 minutes");
        assert_eq!(format_duration(5400.0), "1.5 hours");
        assert_eq!(format_duration(172800.0), "2.0 days");
    }
}
