//! Raw activity record as exported by the learning platform
//!
//! Every field is optional so that a single malformed record can be reported
//! and skipped instead of failing the whole document. Column names used by the
//! platform's CSV exports (`start_time`, `idle_time`, `duration`) are accepted
//! as aliases.

use crate::types::{Event, InteractionCounters};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout of the platform's exports, e.g. "14.10.2014 11:03:12"
pub const PLATFORM_TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// One activity record before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, alias = "start_time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_click_left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_click_right: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_wheel: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_wheel_click: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_movement: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystroke: Option<u64>,
    /// Milliseconds
    #[serde(default, alias = "idle_time", skip_serializing_if = "Option::is_none")]
    pub idle_time_ms: Option<f64>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

/// Why a raw record could not become an [`Event`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("missing case_id")]
    MissingCaseId,

    #[error("missing activity")]
    MissingActivity,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("unparseable timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Parse an RFC 3339 timestamp or the platform's naive local format (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, PLATFORM_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RawEvent {
    /// Case id, or "Student_{student}_Session_{session}" when only those are present
    pub fn resolved_case_id(&self) -> Option<String> {
        if let Some(id) = non_blank(&self.case_id) {
            return Some(id.to_string());
        }
        match (non_blank(&self.student_id), non_blank(&self.session)) {
            (Some(student), Some(session)) => {
                Some(format!("Student_{}_Session_{}", student, session))
            }
            _ => None,
        }
    }

    /// Validate and convert into an [`Event`].
    ///
    /// Activity names are trimmed. A missing duration is derived from `end_time`.
    pub fn into_event(self) -> Result<Event, RecordError> {
        let case_id = self.resolved_case_id().ok_or(RecordError::MissingCaseId)?;
        let activity = non_blank(&self.activity)
            .ok_or(RecordError::MissingActivity)?
            .to_string();
        let raw_ts = non_blank(&self.timestamp).ok_or(RecordError::MissingTimestamp)?;
        let timestamp =
            parse_timestamp(raw_ts).ok_or_else(|| RecordError::InvalidTimestamp(raw_ts.to_string()))?;

        let duration_sec = self.duration_sec.filter(|d| d.is_finite()).or_else(|| {
            non_blank(&self.end_time)
                .and_then(parse_timestamp)
                .map(|end| (end - timestamp).num_milliseconds() as f64 / 1000.0)
        });

        let counters = InteractionCounters {
            mouse_click_left: self.mouse_click_left,
            mouse_click_right: self.mouse_click_right,
            mouse_wheel: self.mouse_wheel,
            mouse_wheel_click: self.mouse_wheel_click,
            mouse_movement: self.mouse_movement,
            keystroke: self.keystroke,
            idle_time_ms: self.idle_time_ms.filter(|v| v.is_finite()),
        };

        Ok(Event {
            activity,
            timestamp,
            case_id,
            category: self.category,
            session: self.session,
            student_id: self.student_id,
            exercise: self.exercise,
            counters,
            duration_sec,
        })
    }
}
