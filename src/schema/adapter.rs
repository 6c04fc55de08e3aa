//! Adapter for decoding raw activity records into an [`EventLog`]
//!
//! Records are converted one at a time. A record that fails to decode or
//! validate is listed in the [`IngestReport`] and the rest of the input is
//! still ingested.

use crate::error::AnalysisError;
use crate::schema::raw_event::{RawEvent, RecordError};
use crate::types::{Event, EventLog};
use serde::{Deserialize, Serialize};

/// A record left out of the log, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Position of the record in the input (0-based)
    pub index: usize,
    /// Source line for NDJSON input (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub reason: String,
}

/// Outcome of ingesting a batch of raw records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub log: EventLog,
    pub total_records: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl IngestReport {
    pub fn accepted(&self) -> usize {
        self.total_records - self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Adapter for converting raw records to events
pub struct RawEventAdapter;

impl RawEventAdapter {
    /// Parse a JSON array of raw records.
    ///
    /// Only a document that is not a JSON array is an error; bad elements are skipped.
    pub fn parse_array(json: &str) -> Result<IngestReport, AnalysisError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let records = values.into_iter().map(|v| (None, decode_value(v)));
        Ok(Self::collect(records))
    }

    /// Parse NDJSON (one raw record per line); blank lines are ignored
    pub fn parse_ndjson(ndjson: &str) -> IngestReport {
        let records = ndjson
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_num, line)| {
                let decoded = serde_json::from_str::<RawEvent>(line.trim())
                    .map_err(|e| RecordError::Malformed(e.to_string()));
                (Some(line_num + 1), decoded)
            });
        Self::collect(records)
    }

    /// Convert already-decoded raw records
    pub fn from_records(records: impl IntoIterator<Item = RawEvent>) -> IngestReport {
        Self::collect(records.into_iter().map(|r| (None, Ok(r))))
    }

    fn collect(
        records: impl Iterator<Item = (Option<usize>, Result<RawEvent, RecordError>)>,
    ) -> IngestReport {
        let mut events: Vec<Event> = Vec::new();
        let mut skipped = Vec::new();
        let mut total_records = 0;

        for (index, (line, decoded)) in records.enumerate() {
            total_records += 1;
            match decoded.and_then(RawEvent::into_event) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(index, line = ?line, reason = %e, "skipping raw record");
                    skipped.push(SkippedRecord {
                        index,
                        line,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let log = EventLog::from_events(events);
        tracing::debug!(
            records = total_records,
            skipped = skipped.len(),
            cases = log.len(),
            "ingested raw records"
        );
        IngestReport {
            log,
            total_records,
            skipped,
        }
    }
}

fn decode_value(value: serde_json::Value) -> Result<RawEvent, RecordError> {
    serde_json::from_value(value).map_err(|e| RecordError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_array_skips_bad_records() {
        let json = r#"[
            {"case_id": "c1", "activity": "Study_Es_1_1", "timestamp": "2024-01-15T14:00:00Z"},
            {"case_id": "c1", "timestamp": "2024-01-15T14:01:00Z"},
            {"case_id": "c1", "activity": "Deeds_Es_1_1", "timestamp": "2024-01-15T14:05:00Z"},
            {"case_id": "c2", "activity": "Aulaweb", "timestamp": "not a time"},
            "garbage"
        ]"#;
        let report = RawEventAdapter::parse_array(json).unwrap();

        assert_eq!(report.total_records, 5);
        assert_eq!(report.accepted(), 2);
        assert_eq!(report.log.len(), 1);
        assert_eq!(
            report.log.get("c1").unwrap().activities(),
            vec!["Study_Es_1_1", "Deeds_Es_1_1"]
        );
        let indices: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(report.skipped[0].reason, "missing activity");
    }

    #[test]
    fn test_parse_array_rejects_non_array() {
        assert!(matches!(
            RawEventAdapter::parse_array("{\"case_id\": 1}"),
            Err(AnalysisError::JsonError(_))
        ));
    }

    #[test]
    fn test_parse_ndjson_reports_lines() {
        let ndjson = concat!(
            r#"{"case_id":"c1","activity":"A","timestamp":"2024-01-15T14:00:00Z"}"#,
            "\n\n",
            "{not json}\n",
            r#"{"case_id":"c1","activity":"B","timestamp":"15.01.2024 14:02:00"}"#,
        );
        let report = RawEventAdapter::parse_ndjson(ndjson);

        assert_eq!(report.total_records, 3);
        assert_eq!(report.log.total_events(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.skipped[0].line, Some(3));
        assert!(report.skipped[0].reason.starts_with("malformed record"));
    }

    #[test]
    fn test_from_records() {
        let report = RawEventAdapter::from_records(vec![RawEvent {
            student_id: Some("3".to_string()),
            session: Some("1".to_string()),
            activity: Some("Aulaweb".to_string()),
            timestamp: Some("2024-01-15T14:00:00Z".to_string()),
            ..Default::default()
        }]);
        assert!(report.is_clean());
        assert!(report.log.get("Student_3_Session_1").is_some());
    }
}
