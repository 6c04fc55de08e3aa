//! Pipeline orchestration
//!
//! This module provides the public API for a full analysis run. It takes an
//! event log (or raw records) through every component and assembles the
//! results into a single [`AnalysisReport`].

use crate::bottleneck::{BottleneckDetector, BottleneckRanking};
use crate::cases::CaseResults;
use crate::conformance::{
    summarize_conformance, BehavioralConformance, ConformanceEngine, ConformanceSummary,
    DeviationSet, SequenceConformance,
};
use crate::error::AnalysisError;
use crate::metrics::{
    profile_activities, summarize_sessions, ActivityProfile, CaseMetrics, CaseMetricsCalculator,
    SessionSummary,
};
use crate::model::{AnalysisConfig, ReferenceModel};
use crate::patterns::{PatternAnalyzer, PatternReport};
use crate::schema::{IngestReport, LogFilter, LogStatistics, RawEventAdapter, SkippedRecord};
use crate::types::EventLog;
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Which engine produced a report, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Every result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub producer: ReportProducer,
    pub statistics: LogStatistics,
    /// Raw records dropped during ingestion
    #[serde(default)]
    pub skipped_records: Vec<SkippedRecord>,
    pub case_metrics: CaseResults<CaseMetrics>,
    pub sessions: BTreeMap<String, SessionSummary>,
    pub activity_profile: ActivityProfile,
    pub sequence_conformance: CaseResults<SequenceConformance>,
    pub behavioral_conformance: CaseResults<BehavioralConformance>,
    pub deviations: DeviationSet,
    pub conformance_summary: ConformanceSummary,
    pub bottlenecks: BottleneckRanking,
    pub patterns: PatternReport,
}

/// Run every component over `log`.
///
/// Never fails: unanalyzable cases are listed inside the per-case results.
pub fn analyze_log(
    log: &EventLog,
    model: &ReferenceModel,
    config: &AnalysisConfig,
) -> AnalysisReport {
    LogAnalyzer::new(model.clone(), config.clone()).analyze(log)
}

/// Analyze an NDJSON event export with the default model and configuration.
///
/// # Returns
/// The report as compact JSON
///
/// # Example
/// ```ignore
/// let report_json = analyze_ndjson(&std::fs::read_to_string("events.ndjson")?)?;
/// ```
pub fn analyze_ndjson(ndjson: &str) -> Result<String, AnalysisError> {
    let analyzer = LogAnalyzer::default();
    let report = analyzer.run(RawEventAdapter::parse_ndjson(ndjson))?;
    encode_to_json(&report, false)
}

/// Serialize a report as JSON
pub fn encode_to_json(report: &AnalysisReport, pretty: bool) -> Result<String, AnalysisError> {
    let encoded = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    encoded.map_err(|e| AnalysisError::EncodingError(e.to_string()))
}

/// Analyzer holding a reference model, configuration and optional log filter.
///
/// Use this to run several logs against the same model.
pub struct LogAnalyzer {
    model: ReferenceModel,
    config: AnalysisConfig,
    filter: Option<LogFilter>,
    instance_id: String,
}

impl Default for LogAnalyzer {
    fn default() -> Self {
        Self::new(ReferenceModel::epm_default(), AnalysisConfig::default())
    }
}

impl LogAnalyzer {
    pub fn new(model: ReferenceModel, config: AnalysisConfig) -> Self {
        Self {
            model,
            config,
            filter: None,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Filter logs before analysis in [`LogAnalyzer::run`]
    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn model(&self) -> &ReferenceModel {
        &self.model
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Filter and analyze an ingested log, carrying over its skipped records.
    ///
    /// Fails with [`AnalysisError::EmptyLog`] when no case remains.
    pub fn run(&self, ingest: IngestReport) -> Result<AnalysisReport, AnalysisError> {
        let log = match &self.filter {
            Some(filter) => filter.apply(ingest.log),
            None => ingest.log,
        };
        if log.is_empty() {
            return Err(AnalysisError::EmptyLog);
        }

        let mut report = self.analyze(&log);
        report.skipped_records = ingest.skipped;
        Ok(report)
    }

    /// Analyze a log as given
    pub fn analyze(&self, log: &EventLog) -> AnalysisReport {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, cases = log.len(), events = log.total_events(), "starting analysis");

        let case_metrics = CaseMetricsCalculator::new(&self.config).compute(log);
        let sessions = summarize_sessions(&case_metrics);
        let activity_profile = profile_activities(log);

        let engine = ConformanceEngine::new(&self.model, &self.config);
        let sequence_conformance = engine.sequence(log);
        let behavioral_conformance = engine.behavioral(log);
        let deviations = engine.classify(&sequence_conformance, &behavioral_conformance);
        let conformance_summary =
            summarize_conformance(&sequence_conformance, &behavioral_conformance, &deviations);

        let bottlenecks = BottleneckDetector::new(self.config.top_bottlenecks).detect(log);
        let patterns = PatternAnalyzer::new(&self.config).analyze(log);

        tracing::info!(
            run_id = %run_id,
            deviating_cases = deviations.cases.len(),
            unanalyzable = case_metrics.unanalyzable.len(),
            "analysis complete"
        );

        AnalysisReport {
            run_id,
            generated_at: Utc::now(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            statistics: LogStatistics::compute(log),
            skipped_records: Vec::new(),
            case_metrics,
            sessions,
            activity_profile,
            sequence_conformance,
            behavioral_conformance,
            deviations,
            conformance_summary,
            bottlenecks,
            patterns,
        }
    }
}
