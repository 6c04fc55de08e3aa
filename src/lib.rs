//! EPM Lens - Process analytics for educational event logs
//!
//! Lens takes the activity logs students produce on a learning platform and
//! measures them against a reference model of the intended learning process:
//! case metrics → sequence and behavioral conformance → deviation tagging →
//! bottleneck ranking → variant and rework patterns.
//!
//! Every analysis is a pure batch computation over an immutable [`EventLog`]
//! and [`ReferenceModel`]. Enable the `parallel` feature to evaluate cases on
//! the rayon thread pool; results are identical either way.

pub mod bottleneck;
pub mod cases;
pub mod conformance;
pub mod error;
pub mod metrics;
pub mod model;
pub mod patterns;
pub mod pipeline;
pub mod schema;
pub mod types;

pub use bottleneck::{detect_bottlenecks, BottleneckDetector, BottleneckRanking};
pub use cases::CaseResults;
pub use conformance::{
    classify_deviations, compute_behavioral_conformance, compute_sequence_conformance,
    summarize_conformance, ConformanceEngine, Deviation, DeviationKind, DeviationSet,
};
pub use error::{AnalysisError, CaseError, CaseFailure};
pub use metrics::{compute_case_metrics, CaseMetrics, CaseMetricsCalculator};
pub use model::{AnalysisConfig, QualityThresholds, ReferenceModel};
pub use patterns::{analyze_patterns, PatternAnalyzer, PatternReport};
pub use pipeline::{analyze_log, analyze_ndjson, AnalysisReport, LogAnalyzer};
pub use types::{Event, EventLog, InteractionCounters, Trace};

// Schema exports
pub use schema::{IngestReport, LogFilter, LogStatistics, RawEvent, RawEventAdapter};

/// Crate version embedded in every report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "epm-lens";
