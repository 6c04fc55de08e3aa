//! Log filtering and descriptive statistics

use crate::types::{Event, EventLog, Trace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum events a case needs to survive [`LogFilter::apply`] by default
pub const DEFAULT_MIN_EVENTS_PER_CASE: usize = 5;

/// Drops excluded activities, then cases that are too short
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub min_events_per_case: usize,
    pub exclude_activities: BTreeSet<String>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            min_events_per_case: DEFAULT_MIN_EVENTS_PER_CASE,
            exclude_activities: BTreeSet::new(),
        }
    }
}

impl LogFilter {
    pub fn new(min_events_per_case: usize) -> Self {
        Self {
            min_events_per_case,
            ..Default::default()
        }
    }

    pub fn excluding<I, S>(mut self, activities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_activities
            .extend(activities.into_iter().map(Into::into));
        self
    }

    /// Length is checked after exclusion
    pub fn apply(&self, log: EventLog) -> EventLog {
        let before = log.len();
        let traces = log.into_traces().filter_map(|trace| {
            let case_id = trace.case_id().to_string();
            let kept: Vec<Event> = trace
                .events()
                .iter()
                .filter(|e| !self.exclude_activities.contains(&e.activity))
                .cloned()
                .collect();
            (kept.len() >= self.min_events_per_case).then(|| Trace::new(case_id, kept))
        });
        let filtered = EventLog::from_traces(traces);
        tracing::debug!(
            before,
            after = filtered.len(),
            min_events = self.min_events_per_case,
            "filtered event log"
        );
        filtered
    }
}

/// Descriptive statistics of an event log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStatistics {
    pub total_events: usize,
    pub total_cases: usize,
    pub total_activities: usize,
    pub total_students: usize,
    pub total_sessions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    pub avg_events_per_case: f64,
    pub activity_distribution: BTreeMap<String, u64>,
}

impl LogStatistics {
    pub fn compute(log: &EventLog) -> Self {
        let mut students = BTreeSet::new();
        let mut sessions = BTreeSet::new();
        let mut activity_distribution: BTreeMap<String, u64> = BTreeMap::new();
        let mut first_timestamp: Option<DateTime<Utc>> = None;
        let mut last_timestamp: Option<DateTime<Utc>> = None;

        for event in log.events() {
            *activity_distribution
                .entry(event.activity.clone())
                .or_insert(0) += 1;
            if let Some(s) = &event.student_id {
                students.insert(s.as_str());
            }
            if let Some(s) = &event.session {
                sessions.insert(s.as_str());
            }
            first_timestamp = Some(first_timestamp.map_or(event.timestamp, |t| t.min(event.timestamp)));
            last_timestamp = Some(last_timestamp.map_or(event.timestamp, |t| t.max(event.timestamp)));
        }

        let total_events = log.total_events();
        let total_cases = log.len();
        Self {
            total_events,
            total_cases,
            total_activities: activity_distribution.len(),
            total_students: students.len(),
            total_sessions: sessions.len(),
            first_timestamp,
            last_timestamp,
            avg_events_per_case: if total_cases == 0 {
                0.0
            } else {
                total_events as f64 / total_cases as f64
            },
            activity_distribution,
        }
    }
}
