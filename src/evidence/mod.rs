//! Evidence artifacts attached to alerts: a short clip and an annotated still.

pub mod ffmpeg;
pub mod pitch;
pub mod renderer;

use std::path::PathBuf;

use image::GrayImage;

use crate::models::{EventRecord, EvidenceMetric, PatternType, Severity};

pub use renderer::FsEvidenceRenderer;

#[derive(Debug, Clone)]
pub struct TimedFrame {
    pub ts: f64,
    pub image: GrayImage,
}

/// Samples an analyzer hands over to substantiate one detection.
#[derive(Debug, Clone)]
pub enum EvidenceContext {
    Events(Vec<EventRecord>),
    Video {
        /// Seekable media the frames were decoded from, if any.
        source_media: Option<PathBuf>,
        frames: Vec<TimedFrame>,
        bias: f64,
        fps: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg {step} exited with {status}: {stderr}")]
    Ffmpeg {
        step: &'static str,
        status: String,
        stderr: String,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("no frames available for the clip")]
    NoFrames,

    #[error("ffmpeg produced no output at {0}")]
    EmptyOutput(PathBuf),
}

#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub session_id: String,
    pub alert_id: String,
    pub center_ts: f64,
    pub pattern: PatternType,
    pub severity: Severity,
    pub metrics: Vec<EvidenceMetric>,
    pub context: EvidenceContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLocators {
    pub clip_url: String,
    pub overlay_url: String,
}

/// Produces the clip and overlay for one alert. Runs on the blocking pool.
pub trait EvidenceRenderer: Send + Sync {
    fn render(&self, request: &EvidenceRequest) -> Result<EvidenceLocators, EvidenceError>;
}

/// Text block burnt into the overlay.
pub fn overlay_text(pattern: PatternType, severity: Severity, metrics: &[EvidenceMetric]) -> String {
    let mut lines = vec![
        format!("Pattern: {}", pattern.as_str()),
        format!("Severity: {}", severity.as_str()),
    ];
    for metric in metrics {
        match &metric.unit {
            Some(unit) => lines.push(format!("{}: {:.3} {}", metric.name, metric.value, unit)),
            None => lines.push(format!("{}: {:.3}", metric.name, metric.value)),
        }
    }
    lines.join("\n")
}
