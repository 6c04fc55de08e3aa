//! Conformance checking against a reference model
//!
//! Two independent scores are computed per case:
//!
//! - **Sequence conformance**: share of directly-follows transitions that the
//!   model expects, blended with an exercise-progression check
//!   (`0.7 * ratio + 0.3 * order_correct`).
//! - **Behavioral conformance**: share of quality checks met by the case's
//!   category ratios. Categories match activity names *exactly*.
//!
//! The two results are then combined into per-case deviation tags.

use crate::cases::{map_cases, CaseResults};
use crate::metrics::ratio;
use crate::model::{
    AnalysisConfig, ReferenceModel, OTHER_CATEGORY, PRACTICE_CATEGORY, STUDY_CATEGORY,
};
use crate::types::{EventLog, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight of the transition ratio in the sequence score
const TRANSITION_WEIGHT: f64 = 0.7;

/// Weight of the exercise-order check in the sequence score
const EXERCISE_ORDER_WEIGHT: f64 = 0.3;

/// Score above which a case counts as high conformance in summaries
const HIGH_CONFORMANCE_SCORE: f64 = 0.7;

/// Both scores above this mark a best-practice case
const BEST_PRACTICE_SCORE: f64 = 0.8;

/// Sequence conformance of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConformance {
    pub total_transitions: usize,
    pub expected_transitions: usize,
    /// expected / total, or 0 with no transitions
    pub conformance_ratio: f64,
    pub unexpected_transitions: Vec<(String, String)>,
    /// Distinct exercise tokens in first-seen order
    pub exercises_encountered: Vec<String>,
    pub exercise_order_correct: bool,
    pub conformance_score: f64,
}

/// Outcome of the three quality checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceChecks {
    pub sufficient_study: bool,
    pub sufficient_practice: bool,
    pub limited_other: bool,
}

impl ConformanceChecks {
    pub fn passed(&self) -> usize {
        [self.sufficient_study, self.sufficient_practice, self.limited_other]
            .iter()
            .filter(|&&c| c)
            .count()
    }
}

/// Behavioral conformance of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralConformance {
    pub total_events: usize,
    pub category_ratios: BTreeMap<String, f64>,
    pub checks: ConformanceChecks,
    /// Passed checks / 3
    pub behavioral_score: f64,
}

impl BehavioralConformance {
    /// Ratio of a category; 0 when the model does not define it
    pub fn category_ratio(&self, category: &str) -> f64 {
        self.category_ratios.get(category).copied().unwrap_or(0.0)
    }
}

/// Engine scoring cases against a reference model
#[derive(Debug, Clone)]
pub struct ConformanceEngine<'a> {
    model: &'a ReferenceModel,
    config: &'a AnalysisConfig,
}

impl<'a> ConformanceEngine<'a> {
    pub fn new(model: &'a ReferenceModel, config: &'a AnalysisConfig) -> Self {
        Self { model, config }
    }

    pub fn sequence(&self, log: &EventLog) -> CaseResults<SequenceConformance> {
        let results = map_cases(log, |trace| Ok(self.sequence_for(trace)));
        tracing::debug!(cases = results.len(), "computed sequence conformance");
        results
    }

    pub fn behavioral(&self, log: &EventLog) -> CaseResults<BehavioralConformance> {
        let results = map_cases(log, |trace| Ok(self.behavioral_for(trace)));
        tracing::debug!(cases = results.len(), "computed behavioral conformance");
        results
    }

    pub fn classify(
        &self,
        sequence: &CaseResults<SequenceConformance>,
        behavioral: &CaseResults<BehavioralConformance>,
    ) -> DeviationSet {
        classify_with_thresholds(
            sequence,
            behavioral,
            self.config.low_sequence_threshold,
            self.config.overall_low_threshold,
        )
    }

    /// Sequence conformance of a single trace
    pub fn sequence_for(&self, trace: &Trace) -> SequenceConformance {
        let mut expected = 0;
        let mut unexpected_transitions = Vec::new();
        for (from, to) in trace.transitions() {
            if self.model.is_expected(from, to) {
                expected += 1;
            } else {
                unexpected_transitions.push((from.to_string(), to.to_string()));
            }
        }
        let total_transitions = expected + unexpected_transitions.len();
        let conformance_ratio = ratio(expected, total_transitions);

        let exercises_encountered =
            exercise_progression(trace.activities(), &self.model.exercise_marker);
        let exercise_order_correct = is_non_decreasing(&exercises_encountered);

        let order_term = if exercise_order_correct { 1.0 } else { 0.0 };
        SequenceConformance {
            total_transitions,
            expected_transitions: expected,
            conformance_ratio,
            unexpected_transitions,
            exercises_encountered,
            exercise_order_correct,
            conformance_score: TRANSITION_WEIGHT * conformance_ratio
                + EXERCISE_ORDER_WEIGHT * order_term,
        }
    }

    /// Behavioral conformance of a single trace
    pub fn behavioral_for(&self, trace: &Trace) -> BehavioralConformance {
        let total_events = trace.len();
        let category_ratios: BTreeMap<String, f64> = self
            .model
            .activity_categories
            .iter()
            .map(|(category, members)| {
                let count = trace
                    .events()
                    .iter()
                    .filter(|e| members.iter().any(|m| *m == e.activity))
                    .count();
                (category.clone(), ratio(count, total_events))
            })
            .collect();

        let of = |category: &str| category_ratios.get(category).copied().unwrap_or(0.0);
        let thresholds = &self.model.quality_thresholds;
        let checks = ConformanceChecks {
            sufficient_study: of(STUDY_CATEGORY) >= thresholds.min_study_ratio,
            sufficient_practice: of(PRACTICE_CATEGORY) >= thresholds.min_practice_ratio,
            limited_other: of(OTHER_CATEGORY) <= thresholds.max_other_ratio,
        };

        BehavioralConformance {
            total_events,
            behavioral_score: checks.passed() as f64 / 3.0,
            category_ratios,
            checks,
        }
    }
}

/// Sequence conformance of every case
pub fn compute_sequence_conformance(
    log: &EventLog,
    model: &ReferenceModel,
) -> CaseResults<SequenceConformance> {
    ConformanceEngine::new(model, &AnalysisConfig::default()).sequence(log)
}

/// Behavioral conformance of every case
pub fn compute_behavioral_conformance(
    log: &EventLog,
    model: &ReferenceModel,
) -> CaseResults<BehavioralConformance> {
    ConformanceEngine::new(model, &AnalysisConfig::default()).behavioral(log)
}

/// Tag deviations using the default thresholds (0.3 and 0.5)
pub fn classify_deviations(
    sequence: &CaseResults<SequenceConformance>,
    behavioral: &CaseResults<BehavioralConformance>,
) -> DeviationSet {
    let defaults = AnalysisConfig::default();
    classify_with_thresholds(
        sequence,
        behavioral,
        defaults.low_sequence_threshold,
        defaults.overall_low_threshold,
    )
}

/// Exercise token following the last `marker` in an activity name.
///
/// The token runs up to the next `_`; only all-digit tokens are accepted.
pub fn exercise_token<'s>(activity: &'s str, marker: &str) -> Option<&'s str> {
    if marker.is_empty() || !activity.contains(marker) {
        return None;
    }
    let tail = activity.rsplit(marker).next()?;
    let token = tail.split('_').next()?;
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        Some(token)
    } else {
        None
    }
}

/// Distinct exercise tokens in first-seen order
pub fn exercise_progression<'s>(
    activities: impl IntoIterator<Item = &'s str>,
    marker: &str,
) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for activity in activities {
        if let Some(token) = exercise_token(activity, marker) {
            if !seen.iter().any(|s| s == token) {
                seen.push(token.to_string());
            }
        }
    }
    seen
}

// Compared as strings, so "10" sorts before "2".
fn is_non_decreasing(tokens: &[String]) -> bool {
    tokens.windows(2).all(|w| w[0] <= w[1])
}

/// Kind of process deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationKind {
    LowSequenceConformance,
    PoorExerciseProgression,
    InsufficientStudyTime,
    InsufficientPracticeTime,
    ExcessiveOtherActivities,
    OverallLowConformance,
}

impl DeviationKind {
    pub const ALL: [DeviationKind; 6] = [
        DeviationKind::LowSequenceConformance,
        DeviationKind::PoorExerciseProgression,
        DeviationKind::InsufficientStudyTime,
        DeviationKind::InsufficientPracticeTime,
        DeviationKind::ExcessiveOtherActivities,
        DeviationKind::OverallLowConformance,
    ];
}

/// A deviation with the values that triggered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deviation {
    LowSequenceConformance {
        conformance_ratio: f64,
        unexpected_transitions: Vec<(String, String)>,
    },
    PoorExerciseProgression {
        exercises_encountered: Vec<String>,
    },
    InsufficientStudyTime {
        study_ratio: f64,
    },
    InsufficientPracticeTime {
        practice_ratio: f64,
    },
    ExcessiveOtherActivities {
        other_ratio: f64,
    },
    OverallLowConformance {
        overall_score: f64,
        sequence_score: f64,
        behavioral_score: f64,
    },
}

impl Deviation {
    pub fn kind(&self) -> DeviationKind {
        match self {
            Deviation::LowSequenceConformance { .. } => DeviationKind::LowSequenceConformance,
            Deviation::PoorExerciseProgression { .. } => DeviationKind::PoorExerciseProgression,
            Deviation::InsufficientStudyTime { .. } => DeviationKind::InsufficientStudyTime,
            Deviation::InsufficientPracticeTime { .. } => DeviationKind::InsufficientPracticeTime,
            Deviation::ExcessiveOtherActivities { .. } => DeviationKind::ExcessiveOtherActivities,
            Deviation::OverallLowConformance { .. } => DeviationKind::OverallLowConformance,
        }
    }
}

/// Deviations of every classified case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviationSet {
    /// Number of cases present in both inputs
    pub total_cases: usize,
    /// Cases with at least one deviation
    pub cases: BTreeMap<String, Vec<Deviation>>,
    /// Case ids found in only one of the two inputs
    #[serde(default)]
    pub unmatched: Vec<String>,
}

impl DeviationSet {
    pub fn for_case(&self, case_id: &str) -> &[Deviation] {
        self.cases.get(case_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cases carrying a deviation of `kind`, in case-id order
    pub fn of_kind(&self, kind: DeviationKind) -> Vec<(&str, &Deviation)> {
        self.cases
            .iter()
            .flat_map(|(case_id, devs)| devs.iter().map(move |d| (case_id.as_str(), d)))
            .filter(|(_, d)| d.kind() == kind)
            .collect()
    }

    pub fn count(&self, kind: DeviationKind) -> usize {
        self.cases
            .values()
            .filter(|devs| devs.iter().any(|d| d.kind() == kind))
            .count()
    }
}

fn classify_with_thresholds(
    sequence: &CaseResults<SequenceConformance>,
    behavioral: &CaseResults<BehavioralConformance>,
    low_sequence_threshold: f64,
    overall_low_threshold: f64,
) -> DeviationSet {
    let mut set = DeviationSet::default();

    for (case_id, seq) in sequence.iter() {
        let Some(beh) = behavioral.get(case_id) else {
            set.unmatched.push(case_id.to_string());
            continue;
        };
        set.total_cases += 1;

        let mut deviations = Vec::new();
        if seq.conformance_ratio < low_sequence_threshold {
            deviations.push(Deviation::LowSequenceConformance {
                conformance_ratio: seq.conformance_ratio,
                unexpected_transitions: seq.unexpected_transitions.clone(),
            });
        }
        if !seq.exercise_order_correct {
            deviations.push(Deviation::PoorExerciseProgression {
                exercises_encountered: seq.exercises_encountered.clone(),
            });
        }
        if !beh.checks.sufficient_study {
            deviations.push(Deviation::InsufficientStudyTime {
                study_ratio: beh.category_ratio(STUDY_CATEGORY),
            });
        }
        if !beh.checks.sufficient_practice {
            deviations.push(Deviation::InsufficientPracticeTime {
                practice_ratio: beh.category_ratio(PRACTICE_CATEGORY),
            });
        }
        if !beh.checks.limited_other {
            deviations.push(Deviation::ExcessiveOtherActivities {
                other_ratio: beh.category_ratio(OTHER_CATEGORY),
            });
        }
        let overall_score = (seq.conformance_score + beh.behavioral_score) / 2.0;
        if overall_score < overall_low_threshold {
            deviations.push(Deviation::OverallLowConformance {
                overall_score,
                sequence_score: seq.conformance_score,
                behavioral_score: beh.behavioral_score,
            });
        }

        if !deviations.is_empty() {
            set.cases.insert(case_id.to_string(), deviations);
        }
    }

    set.unmatched.extend(
        behavioral
            .iter()
            .map(|(case_id, _)| case_id)
            .filter(|case_id| sequence.get(case_id).is_none())
            .map(str::to_string),
    );
    set.unmatched.sort();
    if !set.unmatched.is_empty() {
        tracing::warn!(
            count = set.unmatched.len(),
            "cases missing from one conformance result were not classified"
        );
    }

    set
}

/// Follow-up actions suggested by the share of deviating cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// More than 30% of cases lack study time
    EncourageStudyBeforePractice,
    /// More than 20% of cases progress through exercises out of order
    ClarifyExerciseProgression,
    /// More than 40% of cases have low sequence conformance
    ProvideProcessGuidelines,
    /// More than 30% of cases spend too much time on other activities
    ReduceDistractions,
}

/// Count and share of cases with one deviation kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationShare {
    pub cases: usize,
    pub percentage: f64,
}

/// Log-wide conformance statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformanceSummary {
    pub total_cases: usize,
    pub mean_sequence_score: f64,
    pub mean_behavioral_score: f64,
    /// Population standard deviation
    pub std_sequence_score: f64,
    pub std_behavioral_score: f64,
    pub high_sequence_cases: usize,
    pub high_behavioral_cases: usize,
    /// Cases scoring above 0.8 on both axes
    pub best_practice_cases: Vec<String>,
    pub deviations: BTreeMap<DeviationKind, DeviationShare>,
    pub recommendations: Vec<Recommendation>,
}

/// Summarize conformance results and deviations across the log
pub fn summarize_conformance(
    sequence: &CaseResults<SequenceConformance>,
    behavioral: &CaseResults<BehavioralConformance>,
    deviations: &DeviationSet,
) -> ConformanceSummary {
    let seq_scores: Vec<f64> = sequence.values().map(|s| s.conformance_score).collect();
    let beh_scores: Vec<f64> = behavioral.values().map(|b| b.behavioral_score).collect();
    let total_cases = sequence.len();

    let best_practice_cases = sequence
        .iter()
        .filter(|(_, s)| s.conformance_score > BEST_PRACTICE_SCORE)
        .filter(|(case_id, _)| {
            behavioral
                .get(case_id)
                .is_some_and(|b| b.behavioral_score > BEST_PRACTICE_SCORE)
        })
        .map(|(case_id, _)| case_id.to_string())
        .collect();

    let shares: BTreeMap<DeviationKind, DeviationShare> = DeviationKind::ALL
        .iter()
        .map(|&kind| {
            let cases = deviations.count(kind);
            let percentage = ratio(cases, total_cases) * 100.0;
            (kind, DeviationShare { cases, percentage })
        })
        .collect();

    let share_of = |kind: DeviationKind| ratio(deviations.count(kind), total_cases);
    let mut recommendations = Vec::new();
    if share_of(DeviationKind::InsufficientStudyTime) > 0.3 {
        recommendations.push(Recommendation::EncourageStudyBeforePractice);
    }
    if share_of(DeviationKind::PoorExerciseProgression) > 0.2 {
        recommendations.push(Recommendation::ClarifyExerciseProgression);
    }
    if share_of(DeviationKind::LowSequenceConformance) > 0.4 {
        recommendations.push(Recommendation::ProvideProcessGuidelines);
    }
    if share_of(DeviationKind::ExcessiveOtherActivities) > 0.3 {
        recommendations.push(Recommendation::ReduceDistractions);
    }

    ConformanceSummary {
        total_cases,
        mean_sequence_score: mean(&seq_scores),
        mean_behavioral_score: mean(&beh_scores),
        std_sequence_score: population_std(&seq_scores),
        std_behavioral_score: population_std(&beh_scores),
        high_sequence_cases: seq_scores.iter().filter(|&&s| s > HIGH_CONFORMANCE_SCORE).count(),
        high_behavioral_cases: beh_scores.iter().filter(|&&s| s > HIGH_CONFORMANCE_SCORE).count(),
        best_practice_cases,
        deviations: shares,
        recommendations,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Event;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn trace_of(case_id: &str, activities: &[&str]) -> Vec<Event> {
        activities
            .iter()
            .enumerate()
            .map(|(i, a)| Event::new(case_id, *a, t0() + Duration::minutes(i as i64)))
            .collect()
    }

    fn two_step_model() -> ReferenceModel {
        let mut model = ReferenceModel::epm_default();
        model.expected_transitions = [
            ("Study_Es_1_1", "Deeds_Es_1_1"),
            ("Deeds_Es_1_1", "TextEditor_Es_1_1"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        model
    }

    #[test]
    fn test_fully_conforming_case() {
        let log = EventLog::from_events(vec![
            Event::new("A", "Study_Es_1_1", t0()),
            Event::new("A", "Deeds_Es_1_1", t0() + Duration::minutes(5)),
            Event::new("A", "TextEditor_Es_1_1", t0() + Duration::minutes(20)),
            Event::new("B", "Aulaweb", t0()),
        ]);
        let results = compute_sequence_conformance(&log, &two_step_model());
        let a = results.get("A").unwrap();

        assert_eq!(a.total_transitions, 2);
        assert_eq!(a.conformance_ratio, 1.0);
        assert!(a.exercise_order_correct);
        assert!((a.conformance_score - 1.0).abs() < 1e-12);
        assert!(a.unexpected_transitions.is_empty());
    }

    #[test]
    fn test_events_are_sorted_before_scoring() {
        let log = EventLog::from_events(vec![
            Event::new("A", "TextEditor_Es_1_1", t0() + Duration::minutes(20)),
            Event::new("A", "Study_Es_1_1", t0()),
            Event::new("A", "Deeds_Es_1_1", t0() + Duration::minutes(5)),
        ]);
        let results = compute_sequence_conformance(&log, &two_step_model());
        assert_eq!(results.get("A").unwrap().conformance_ratio, 1.0);
    }

    #[test]
    fn test_blank_activity_event_is_skipped_not_the_case() {
        let log = EventLog::from_events(trace_of(
            "A",
            &["Study_Es_1_1", "  ", "Deeds_Es_1_1", "TextEditor_Es_1_1"],
        ));
        let results = compute_sequence_conformance(&log, &two_step_model());
        let a = results.get("A").unwrap();

        assert!(results.unanalyzable.is_empty());
        assert_eq!(a.total_transitions, 2);
        assert_eq!(a.conformance_ratio, 1.0);
        assert!(a.unexpected_transitions.is_empty());
        assert!(compute_behavioral_conformance(&log, &two_step_model())
            .get("A")
            .is_some());
    }

    #[test]
    fn test_single_event_scores_zero_ratio() {
        let log = EventLog::from_events(trace_of("solo", &["Deeds_Es_1_3"]));
        let results = compute_sequence_conformance(&log, &two_step_model());
        let solo = results.get("solo").unwrap();

        assert_eq!(solo.total_transitions, 0);
        assert_eq!(solo.conformance_ratio, 0.0);
        assert!(solo.exercise_order_correct);
        assert!((solo.conformance_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_unexpected_transitions_are_listed() {
        let log = EventLog::from_events(trace_of("c", &["Deeds_Es_1_1", "Study_Es_1_1"]));
        let results = compute_sequence_conformance(&log, &two_step_model());
        assert_eq!(
            results.get("c").unwrap().unexpected_transitions,
            vec![("Deeds_Es_1_1".to_string(), "Study_Es_1_1".to_string())]
        );
    }

    #[test]
    fn test_exercise_token_extraction() {
        assert_eq!(exercise_token("Study_Es_1_2", "Es_1_"), Some("2"));
        assert_eq!(exercise_token("Deeds_Es_1_10_extra", "Es_1_"), Some("10"));
        assert_eq!(exercise_token("Es_1_1_Es_1_3", "Es_1_"), Some("3"));
        assert_eq!(exercise_token("FSM_Es_1_x", "Es_1_"), None);
        assert_eq!(exercise_token("Deeds_Es_1_", "Es_1_"), None);
        assert_eq!(exercise_token("Aulaweb", "Es_1_"), None);
    }

    #[test]
    fn test_exercise_progression_keeps_first_seen_order() {
        let tokens = exercise_progression(
            ["Study_Es_1_2", "Deeds_Es_1_1", "Study_Es_1_2", "Aulaweb"],
            "Es_1_",
        );
        assert_eq!(tokens, vec!["2".to_string(), "1".to_string()]);
        assert!(!is_non_decreasing(&tokens));
    }

    #[test]
    fn test_exercise_order_compares_as_strings() {
        // "10" < "2" lexicographically, so 2 then 10 is out of order
        let log = EventLog::from_events(trace_of("c", &["Study_Es_1_2", "Study_Es_1_10"]));
        let results = compute_sequence_conformance(&log, &two_step_model());
        let c = results.get("c").unwrap();
        assert_eq!(c.exercises_encountered, vec!["2".to_string(), "10".to_string()]);
        assert!(!c.exercise_order_correct);
    }

    #[test]
    fn test_behavioral_uses_exact_membership() {
        // "Deeds_Extra" contains "Deeds" but is not a practice member
        let log = EventLog::from_events(trace_of(
            "c",
            &["Study_Es_1_1", "Deeds_Es_1_1", "Deeds_Extra", "FSM_Es"],
        ));
        let results = compute_behavioral_conformance(&log, &ReferenceModel::epm_default());
        let c = results.get("c").unwrap();

        assert_eq!(c.category_ratio("study"), 0.25);
        assert_eq!(c.category_ratio("practice"), 0.25);
        assert_eq!(c.category_ratio("other"), 0.25);
        assert_eq!(
            c.checks,
            ConformanceChecks {
                sufficient_study: true,
                sufficient_practice: true,
                limited_other: true,
            }
        );
        assert_eq!(c.behavioral_score, 1.0);
    }

    #[test]
    fn test_missing_categories_default_to_zero() {
        let mut model = ReferenceModel::epm_default();
        model.activity_categories.clear();
        let log = EventLog::from_events(trace_of("c", &["Anything"]));
        let c = compute_behavioral_conformance(&log, &model);
        let c = c.get("c").unwrap();

        assert!(!c.checks.sufficient_study);
        assert!(!c.checks.sufficient_practice);
        assert!(c.checks.limited_other);
        assert!((c.behavioral_score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_classify_deviations() {
        let model = ReferenceModel::epm_default();
        let log = EventLog::from_events(
            trace_of("bad", &["FSM_Es", "FSM_Related", "Study_Es_1_2", "Study_Es_1_1"])
                .into_iter()
                .chain(trace_of(
                    "good",
                    &["Aulaweb", "Study_Es_1_1", "Deeds_Es_1_1", "TextEditor_Es_1_1"],
                )),
        );
        let seq = compute_sequence_conformance(&log, &model);
        let beh = compute_behavioral_conformance(&log, &model);
        let set = classify_deviations(&seq, &beh);

        assert_eq!(set.total_cases, 2);
        assert!(set.for_case("good").is_empty());

        let kinds: Vec<DeviationKind> = set.for_case("bad").iter().map(|d| d.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                DeviationKind::LowSequenceConformance,
                DeviationKind::PoorExerciseProgression,
                DeviationKind::InsufficientPracticeTime,
                DeviationKind::ExcessiveOtherActivities,
                DeviationKind::OverallLowConformance,
            ]
        );
        assert_eq!(set.count(DeviationKind::ExcessiveOtherActivities), 1);

        let progression = set.of_kind(DeviationKind::PoorExerciseProgression);
        assert_eq!(
            progression[0].1,
            &Deviation::PoorExerciseProgression {
                exercises_encountered: vec!["2".to_string(), "1".to_string()],
            }
        );
    }

    #[test]
    fn test_configured_thresholds_change_classification() {
        let model = ReferenceModel::epm_default();
        let config = AnalysisConfig {
            low_sequence_threshold: 0.0,
            overall_low_threshold: 0.0,
            ..AnalysisConfig::default()
        };
        let engine = ConformanceEngine::new(&model, &config);
        let log = EventLog::from_events(trace_of("c", &["X", "Y", "Z"]));
        let set = engine.classify(&engine.sequence(&log), &engine.behavioral(&log));

        let kinds: Vec<DeviationKind> = set.for_case("c").iter().map(|d| d.kind()).collect();
        assert!(!kinds.contains(&DeviationKind::LowSequenceConformance));
        assert!(!kinds.contains(&DeviationKind::OverallLowConformance));
    }

    #[test]
    fn test_unmatched_cases_are_reported() {
        let model = ReferenceModel::epm_default();
        let log_a = EventLog::from_events(trace_of("a", &["X"]));
        let log_b = EventLog::from_events(trace_of("b", &["X"]));
        let set = classify_deviations(
            &compute_sequence_conformance(&log_a, &model),
            &compute_behavioral_conformance(&log_b, &model),
        );
        assert_eq!(set.total_cases, 0);
        assert_eq!(set.unmatched, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_summary_and_recommendations() {
        let model = ReferenceModel::epm_default();
        let log = EventLog::from_events(
            trace_of("bad", &["FSM_Es", "FSM_Related", "Study_Es_1_2", "Study_Es_1_1"])
                .into_iter()
                .chain(trace_of(
                    "good",
                    &["Aulaweb", "Study_Es_1_1", "Deeds_Es_1_1", "TextEditor_Es_1_1"],
                )),
        );
        let seq = compute_sequence_conformance(&log, &model);
        let beh = compute_behavioral_conformance(&log, &model);
        let set = classify_deviations(&seq, &beh);
        let summary = summarize_conformance(&seq, &beh, &set);

        assert_eq!(summary.total_cases, 2);
        assert_eq!(summary.best_practice_cases, vec!["good".to_string()]);
        assert_eq!(summary.deviations[&DeviationKind::PoorExerciseProgression].cases, 1);
        assert_eq!(
            summary.deviations[&DeviationKind::PoorExerciseProgression].percentage,
            50.0
        );
        assert_eq!(
            summary.recommendations,
            vec![
                Recommendation::ClarifyExerciseProgression,
                Recommendation::ProvideProcessGuidelines,
                Recommendation::ReduceDistractions,
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_scores_are_bounded(
            activities in proptest::collection::vec(
                prop::sample::select(vec![
                    "Study_Es_1_1", "Deeds_Es_1_1", "TextEditor_Es_1_1",
                    "Study_Es_1_2", "FSM_Es", "Aulaweb", "Deeds",
                ]),
                0..30,
            )
        ) {
            let log = EventLog::from_traces(vec![Trace::new("p", trace_of("p", &activities))]);
            let model = ReferenceModel::epm_default();
            let seq = compute_sequence_conformance(&log, &model);
            let beh = compute_behavioral_conformance(&log, &model);
            let s = seq.get("p").unwrap();
            let b = beh.get("p").unwrap();

            prop_assert!((0.0..=1.0).contains(&s.conformance_score));
            prop_assert!((0.0..=1.0).contains(&b.behavioral_score));
            if s.total_transitions == 0 {
                prop_assert_eq!(s.conformance_ratio, 0.0);
                prop_assert!(s.exercise_order_correct);
            }
        }
    }
}
