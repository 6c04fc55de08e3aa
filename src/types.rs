//! Event log data model
//!
//! Events are grouped into traces by case identifier. A trace always holds its
//! events in non-decreasing timestamp order, whatever order they were supplied in.

use crate::error::CaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional interaction counters recorded by the learning platform.
///
/// Absent counters count as zero in every aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionCounters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_click_left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_click_right: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_wheel: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_wheel_click: Option<u64>,
    /// Pointer movement in platform units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_movement: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystroke: Option<u64>,
    /// Idle time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time_ms: Option<f64>,
}

impl InteractionCounters {
    /// Left plus right clicks
    pub fn clicks(&self) -> u64 {
        self.mouse_click_left.unwrap_or(0) + self.mouse_click_right.unwrap_or(0)
    }
}

/// A single timestamped activity performed in a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Activity name (e.g. "Deeds_Es_1_1")
    pub activity: String,
    /// When the activity started
    pub timestamp: DateTime<Utc>,
    /// Case identifier (one student's session)
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
    #[serde(default)]
    pub counters: InteractionCounters,
    /// Precomputed activity duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

impl Event {
    pub fn new(
        case_id: impl Into<String>,
        activity: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            activity: activity.into(),
            timestamp,
            case_id: case_id.into(),
            category: None,
            session: None,
            student_id: None,
            exercise: None,
            counters: InteractionCounters::default(),
            duration_sec: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn with_counters(mut self, counters: InteractionCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_duration(mut self, duration_sec: f64) -> Self {
        self.duration_sec = Some(duration_sec);
        self
    }
}

/// The ordered events of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TraceRecord")]
pub struct Trace {
    case_id: String,
    events: Vec<Event>,
}

// Deserialized traces go through `Trace::new` like built ones
#[derive(Deserialize)]
struct TraceRecord {
    case_id: String,
    events: Vec<Event>,
}

impl From<TraceRecord> for Trace {
    fn from(record: TraceRecord) -> Self {
        Trace::new(record.case_id, record.events)
    }
}

impl Trace {
    /// Build a trace, sorting events by timestamp.
    ///
    /// Events with a blank activity name are dropped; the rest of the case is kept.
    /// The sort is stable, so events sharing a timestamp keep their supplied order.
    pub fn new(case_id: impl Into<String>, mut events: Vec<Event>) -> Self {
        let case_id = case_id.into();
        let before = events.len();
        events.retain(|e| !e.activity.trim().is_empty());
        if events.len() < before {
            tracing::debug!(
                case_id = %case_id,
                dropped = before - events.len(),
                "dropped events without an activity name"
            );
        }
        events.sort_by_key(|e| e.timestamp);
        Self { case_id, events }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Activity names in timestamp order
    pub fn activities(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.activity.as_str()).collect()
    }

    /// Consecutive activity pairs (directly-follows relation)
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.events
            .windows(2)
            .map(|w| (w[0].activity.as_str(), w[1].activity.as_str()))
    }

    /// Seconds between the first and last event; 0 for traces with fewer than two events
    pub fn duration_sec(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) if self.events.len() > 1 => {
                (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        }
    }

    /// Check that every event belongs to this case
    pub fn validate(&self) -> Result<(), CaseError> {
        for (index, event) in self.events.iter().enumerate() {
            if event.case_id != self.case_id {
                return Err(CaseError::ForeignEvent {
                    index,
                    expected: self.case_id.clone(),
                    found: event.case_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A closed batch of traces keyed by case identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    traces: BTreeMap<String, Trace>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group events into traces by their case identifier
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut grouped: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            grouped.entry(event.case_id.clone()).or_default().push(event);
        }

        let traces = grouped
            .into_iter()
            .map(|(case_id, events)| {
                let trace = Trace::new(case_id.clone(), events);
                (case_id, trace)
            })
            .collect();

        Self { traces }
    }

    /// Build a log from ready-made traces. A later trace replaces an earlier one with the same id.
    pub fn from_traces(traces: impl IntoIterator<Item = Trace>) -> Self {
        Self {
            traces: traces
                .into_iter()
                .map(|t| (t.case_id.clone(), t))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn get(&self, case_id: &str) -> Option<&Trace> {
        self.traces.get(case_id)
    }

    /// Traces in case-id order
    pub fn traces(&self) -> impl Iterator<Item = &Trace> + '_ {
        self.traces.values()
    }

    pub fn case_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.traces.keys().map(String::as_str)
    }

    pub fn total_events(&self) -> usize {
        self.traces.values().map(Trace::len).sum()
    }

    /// All events across every trace
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.traces.values().flat_map(|t| t.events.iter())
    }

    pub fn into_traces(self) -> impl Iterator<Item = Trace> {
        self.traces.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, min, sec).unwrap()
    }

    #[test]
    fn test_trace_sorts_events() {
        let trace = Trace::new(
            "c1",
            vec![
                Event::new("c1", "B", at(5, 0)),
                Event::new("c1", "A", at(1, 0)),
                Event::new("c1", "C", at(9, 0)),
            ],
        );
        assert_eq!(trace.activities(), vec!["A", "B", "C"]);
        assert_eq!(trace.duration_sec(), 480.0);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let trace = Trace::new(
            "c1",
            vec![
                Event::new("c1", "X", at(1, 0)),
                Event::new("c1", "Y", at(1, 0)),
            ],
        );
        assert_eq!(trace.activities(), vec!["X", "Y"]);
    }

    #[test]
    fn test_single_event_trace_has_zero_duration() {
        let trace = Trace::new("c1", vec![Event::new("c1", "A", at(1, 0))]);
        assert_eq!(trace.duration_sec(), 0.0);
        assert_eq!(trace.transitions().count(), 0);
    }

    #[test]
    fn test_from_events_groups_by_case() {
        let log = EventLog::from_events(vec![
            Event::new("b", "A", at(2, 0)),
            Event::new("a", "A", at(1, 0)),
            Event::new("b", "B", at(1, 0)),
        ]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.total_events(), 3);
        assert_eq!(log.case_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(log.get("b").unwrap().activities(), vec!["B", "A"]);
    }

    #[test]
    fn test_validate_rejects_foreign_event() {
        let trace = Trace::new(
            "c1",
            vec![
                Event::new("c1", "A", at(1, 0)),
                Event::new("c2", "B", at(2, 0)),
            ],
        );
        assert_eq!(
            trace.validate(),
            Err(CaseError::ForeignEvent {
                index: 1,
                expected: "c1".to_string(),
                found: "c2".to_string(),
            })
        );
    }

    #[test]
    fn test_blank_activity_events_are_dropped() {
        let trace = Trace::new(
            "c1",
            vec![
                Event::new("c1", "A", at(1, 0)),
                Event::new("c1", "  ", at(2, 0)),
                Event::new("c1", "", at(3, 0)),
                Event::new("c1", "B", at(4, 0)),
            ],
        );
        assert_eq!(trace.activities(), vec!["A", "B"]);
        assert_eq!(trace.validate(), Ok(()));

        let log = EventLog::from_events(vec![
            Event::new("c2", "A", at(1, 0)),
            Event::new("c2", " ", at(2, 0)),
        ]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.total_events(), 1);
    }

    #[test]
    fn test_deserialized_trace_is_normalized() {
        let trace = Trace::new(
            "c1",
            vec![
                Event::new("c1", "B", at(5, 0)),
                Event::new("c1", "A", at(1, 0)),
            ],
        );
        let mut json: serde_json::Value = serde_json::to_value(&trace).unwrap();
        json["events"][0]["activity"] = serde_json::Value::from(" ");
        let back: Trace = serde_json::from_value(json).unwrap();
        assert_eq!(back.activities(), vec!["B"]);
    }

    #[test]
    fn test_counters_default_to_zero() {
        let counters = InteractionCounters {
            mouse_click_left: Some(4),
            ..Default::default()
        };
        assert_eq!(counters.clicks(), 4);
        assert_eq!(InteractionCounters::default().clicks(), 0);
    }
}
