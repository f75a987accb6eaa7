//! Pattern analyzers: rolling-window detectors over event or motion samples.

pub mod events;
pub mod flow;
pub mod metrics;
pub mod motion;
pub mod window;

use std::{path::PathBuf, sync::Arc};

use crate::{
    evidence::EvidenceContext,
    models::{DomainSample, EvidenceMetric, PatternType, Severity, SourceKind},
    scoring::ShotScorer,
};

pub use events::EventAnalyzer;
pub use motion::MotionAnalyzer;
pub use window::RollingWindow;

/// What a detection was computed from. Selects the metric schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionBasis {
    EventWindow,
    Motion,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub pattern: PatternType,
    pub severity: Severity,
    pub basis: DetectionBasis,
    pub metrics: Vec<EvidenceMetric>,
}

impl Detection {
    /// Builds a detection, rejecting metrics outside the pattern's schema.
    pub fn new(
        pattern: PatternType,
        severity: Severity,
        basis: DetectionBasis,
        values: &[(&str, f64)],
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            pattern,
            severity,
            basis,
            metrics: metrics::build(pattern, basis, values)?,
        })
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{pattern:?} does not declare metric '{name}'")]
    UnknownMetric { pattern: PatternType, name: String },

    #[error("{pattern:?} metric '{name}' is not finite")]
    NonFiniteMetric { pattern: PatternType, name: String },

    #[error("{pattern:?} is missing required metric '{name}'")]
    MissingMetric { pattern: PatternType, name: String },

    #[error("{pattern:?} is not produced from {basis:?} samples")]
    UnsupportedPattern {
        pattern: PatternType,
        basis: DetectionBasis,
    },
}

/// One analyzer family. The session pipeline feeds every sample through `observe`
/// and calls `evaluate` on its own cadence.
pub trait PatternAnalyzer: Send {
    fn window_secs(&self) -> f64;

    /// Samples of the wrong family are ignored.
    fn observe(&mut self, sample: DomainSample, ts: f64);

    /// One entry per detector that fired. A detector whose metrics fail the schema
    /// yields an error without affecting the others.
    fn evaluate(&self, now: f64) -> Vec<Result<Detection, AnalysisError>>;

    /// Synthesized detection for a session that has produced nothing so far.
    fn fallback(&self, _now: f64) -> Result<Option<Detection>, AnalysisError> {
        Ok(None)
    }

    /// Samples that substantiate a detection centered at `center`.
    fn evidence_context(&self, center: f64) -> EvidenceContext;
}

/// Event logs get the event-schema analyzer; every video kind gets the motion analyzer.
pub fn analyzer_for(
    kind: SourceKind,
    source_uri: &str,
    fps: u32,
    scorer: Arc<ShotScorer>,
    demo_mode: bool,
) -> Box<dyn PatternAnalyzer> {
    match kind {
        SourceKind::EventLog => Box::new(EventAnalyzer::new(scorer, demo_mode)),
        SourceKind::File => Box::new(MotionAnalyzer::new(
            fps,
            Some(PathBuf::from(source_uri)).filter(|p| !p.as_os_str().is_empty()),
        )),
        SourceKind::Device | SourceKind::Network => Box::new(MotionAnalyzer::new(fps, None)),
    }
}
