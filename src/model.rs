//! Reference model and analysis configuration
//!
//! Both values are immutable inputs passed explicitly into every engine call.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Category label checked against `min_study_ratio`
pub const STUDY_CATEGORY: &str = "study";

/// Category label checked against `min_practice_ratio`
pub const PRACTICE_CATEGORY: &str = "practice";

/// Category label checked against `max_other_ratio`
pub const OTHER_CATEGORY: &str = "other";

/// Marker preceding the exercise number in activity names (e.g. "Deeds_Es_1_2")
pub const DEFAULT_EXERCISE_MARKER: &str = "Es_1_";

/// Fractions of a case's events each category must (or must not) reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_study_ratio: f64,
    pub min_practice_ratio: f64,
    pub max_other_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_study_ratio: 0.1,
            min_practice_ratio: 0.2,
            max_other_ratio: 0.3,
        }
    }
}

/// Expected learning process for a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceModel {
    /// Ordered activity pairs considered on-path
    pub expected_transitions: BTreeSet<(String, String)>,
    /// Category label to member activity names (exact match)
    pub activity_categories: BTreeMap<String, Vec<String>>,
    pub quality_thresholds: QualityThresholds,
    /// Reporting only; not used for scoring
    #[serde(default)]
    pub ideal_sequence: Vec<String>,
    /// Reporting only; not used for scoring
    #[serde(default)]
    pub expected_exercise_progression: Vec<String>,
    #[serde(default = "default_exercise_marker")]
    pub exercise_marker: String,
}

fn default_exercise_marker() -> String {
    DEFAULT_EXERCISE_MARKER.to_string()
}

impl ReferenceModel {
    /// The digital electronics course model used by the EPM platform
    pub fn epm_default() -> Self {
        let expected_transitions = [
            ("Study_Es_1_1", "Deeds_Es_1_1"),
            ("Deeds_Es_1_1", "TextEditor_Es_1_1"),
            ("Study_Es_1_2", "Deeds_Es_1_2"),
            ("Deeds_Es_1_2", "TextEditor_Es_1_2"),
            ("Aulaweb", "Study_Es_1_1"),
            ("TextEditor_Es_1_1", "Study_Es_1_2"),
            ("Properties", "Deeds_Es_1_1"),
            ("Diagram", "TextEditor_Es_1_1"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

        let categories: [(&str, &[&str]); 6] = [
            ("preparation", &["Aulaweb", "Study_Materials"]),
            ("study", &["Study_Es_1_1", "Study_Es_1_2", "Study_Es_1_3"]),
            (
                "practice",
                &["Deeds_Es_1_1", "Deeds_Es_1_2", "Deeds_Es_1_3", "Deeds"],
            ),
            ("verification", &["Diagram", "Properties"]),
            (
                "documentation",
                &[
                    "TextEditor_Es_1_1",
                    "TextEditor_Es_1_2",
                    "TextEditor_Es_1_3",
                    "TextEditor",
                ],
            ),
            ("other", &["FSM_Es", "FSM_Related"]),
        ];
        let activity_categories = categories
            .iter()
            .map(|(label, members)| {
                (
                    label.to_string(),
                    members.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect();

        Self {
            expected_transitions,
            activity_categories,
            quality_thresholds: QualityThresholds::default(),
            ideal_sequence: [
                "Study_Es_1_1",
                "Deeds_Es_1_1",
                "TextEditor_Es_1_1",
                "Study_Es_1_2",
                "Deeds_Es_1_2",
                "TextEditor_Es_1_2",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            expected_exercise_progression: ["Es_1_1", "Es_1_2", "Es_1_3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exercise_marker: default_exercise_marker(),
        }
    }

    /// Parse and validate a model from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let model: ReferenceModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        serde_json::to_string_pretty(self).map_err(|e| AnalysisError::EncodingError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let t = &self.quality_thresholds;
        for (name, value) in [
            ("min_study_ratio", t.min_study_ratio),
            ("min_practice_ratio", t.min_practice_ratio),
            ("max_other_ratio", t.max_other_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::InvalidModel(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.exercise_marker.is_empty() {
            return Err(AnalysisError::InvalidModel(
                "exercise_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_expected(&self, from: &str, to: &str) -> bool {
        self.expected_transitions
            .contains(&(from.to_string(), to.to_string()))
    }
}

/// Tunable thresholds and report sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// `conformance_ratio` below this flags `low_sequence_conformance`
    pub low_sequence_threshold: f64,
    /// Mean of sequence and behavioral score below this flags `overall_low_conformance`
    pub overall_low_threshold: f64,
    /// Single-case variants further than this from the median length are anomalous
    pub anomaly_length_threshold: f64,
    pub top_bottlenecks: usize,
    pub top_variants: usize,
    pub top_sequences: usize,
    pub top_learning_paths: usize,
    /// Ratio label to activity-name substring, used by case metrics
    pub substring_categories: BTreeMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            low_sequence_threshold: 0.3,
            overall_low_threshold: 0.5,
            anomaly_length_threshold: 3.0,
            top_bottlenecks: 5,
            top_variants: 5,
            top_sequences: 10,
            top_learning_paths: 10,
            substring_categories: [
                ("deeds", "Deeds"),
                ("study", "Study"),
                ("texteditor", "TextEditor"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(json)?)
    }
}
