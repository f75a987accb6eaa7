//! Motion detectors over optical-flow samples from decoded video.
//!
//! Flow is computed for every consecutive frame pair and pooled into one
//! [`MotionSample`] per half second of stream time. Frames that are pixel-identical
//! to their predecessor (stalled decoders, paused feeds) are not accumulated.

use image::{DynamicImage, GrayImage};
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use std::path::PathBuf;

use crate::{
    evidence::{EvidenceContext, TimedFrame},
    models::{DomainSample, PatternType, Severity},
};

use super::{
    flow::{grid_lucas_kanade, summarize, FlowSummary},
    AnalysisError, Detection, DetectionBasis, PatternAnalyzer, RollingWindow,
};

pub const MOTION_WINDOW_SECS: f64 = 30.0;
const SAMPLE_INTERVAL_SECS: f64 = 0.5;
const EVIDENCE_FRAME_SECS: f64 = 5.0;

const BIAS_LOOKBACK: usize = 10;
const HIGH_BIAS: f64 = 0.25;
const HIGH_BIAS_SHARE: f64 = 0.6;
const MEDIUM_BIAS: f64 = 0.15;
const MEDIUM_BIAS_SHARE: f64 = 0.4;

const RECENT_SAMPLES: usize = 5;
const MIN_BASELINE_SAMPLES: usize = 5;
const HIGH_SURGE: f64 = 3.0;
const MEDIUM_SURGE: f64 = 2.0;
const MIN_RECENT_INTENSITY: f64 = 0.05;
const MIN_BASELINE_INTENSITY: f64 = 1e-3;

/// Mean absolute pixel difference under which a frame with an unchanged hash is frozen.
const FROZEN_MAD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// `Σfx / Σ|fx|` of median-removed flow, in [-1, 1].
    pub bias: f64,
    /// Mean residual flow magnitude, px/frame.
    pub intensity: f64,
}

#[derive(Debug, Default)]
struct Accumulator {
    started: Option<f64>,
    sum_fx: f64,
    sum_abs_fx: f64,
    intensity_sum: f64,
    pairs: usize,
}

impl Accumulator {
    fn add(&mut self, summary: FlowSummary) {
        self.sum_fx += summary.sum_fx;
        self.sum_abs_fx += summary.sum_abs_fx;
        self.intensity_sum += summary.intensity;
        self.pairs += 1;
    }

    fn take(&mut self, ts: f64) -> Option<MotionSample> {
        let started = *self.started.get_or_insert(ts);
        if ts - started < SAMPLE_INTERVAL_SECS || self.pairs == 0 {
            return None;
        }
        let bias = if self.sum_abs_fx > f64::EPSILON {
            (self.sum_fx / self.sum_abs_fx).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let sample = MotionSample {
            bias,
            intensity: self.intensity_sum / self.pairs as f64,
        };
        *self = Accumulator {
            started: Some(ts),
            ..Default::default()
        };
        Some(sample)
    }
}

struct PreviousFrame {
    index: u64,
    image: GrayImage,
    hash: ImageHash,
}

pub struct MotionAnalyzer {
    fps: u32,
    source_media: Option<PathBuf>,
    previous: Option<PreviousFrame>,
    acc: Accumulator,
    samples: RollingWindow<MotionSample>,
    frames: RollingWindow<GrayImage>,
}

impl MotionAnalyzer {
    /// `source_media` is set for seekable files so evidence can be cut from the original.
    pub fn new(fps: u32, source_media: Option<PathBuf>) -> Self {
        Self {
            fps: fps.max(1),
            source_media,
            previous: None,
            acc: Accumulator::default(),
            samples: RollingWindow::new(MOTION_WINDOW_SECS),
            frames: RollingWindow::new(EVIDENCE_FRAME_SECS),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &MotionSample> {
        self.samples.values()
    }

    fn record_frame(&mut self, index: u64, image: GrayImage, ts: f64) {
        let hash = frame_hash(&image);
        if let Some(prev) = &self.previous {
            if prev.hash.dist(&hash) == 0 && mean_abs_diff(&prev.image, &image) < FROZEN_MAD {
                return;
            }
            let gap = index.saturating_sub(prev.index).max(1);
            if let Some(summary) = summarize(&grid_lucas_kanade(&prev.image, &image), gap) {
                self.acc.add(summary);
            }
        }
        self.previous = Some(PreviousFrame { index, image, hash });

        if let Some(sample) = self.acc.take(ts) {
            self.samples.push(ts, sample);
        }
    }

    fn detect_bias(&self) -> Result<Option<Detection>, AnalysisError> {
        if self.samples.len() < BIAS_LOOKBACK {
            return Ok(None);
        }
        let recent: Vec<f64> = self
            .samples
            .values()
            .rev()
            .take(BIAS_LOOKBACK)
            .map(|s| s.bias)
            .collect();
        let n = recent.len() as f64;
        let share_over = |limit: f64| recent.iter().filter(|b| b.abs() > limit).count() as f64 / n;

        let high_share = share_over(HIGH_BIAS);
        let medium_share = share_over(MEDIUM_BIAS);
        let (severity, share) = if high_share >= HIGH_BIAS_SHARE {
            (Severity::High, high_share)
        } else if medium_share >= MEDIUM_BIAS_SHARE {
            (Severity::Medium, medium_share)
        } else {
            return Ok(None);
        };

        let mean_bias = recent.iter().sum::<f64>() / n;
        Detection::new(
            PatternType::BuildUpBias,
            severity,
            DetectionBasis::Motion,
            &[
                ("flow_x_bias", mean_bias),
                ("biased_sample_share", share),
                ("sample_count", n),
            ],
        )
        .map(Some)
    }

    fn detect_surge(&self) -> Result<Option<Detection>, AnalysisError> {
        let total = self.samples.len();
        if total < RECENT_SAMPLES + MIN_BASELINE_SAMPLES {
            return Ok(None);
        }
        let intensities: Vec<f64> = self.samples.values().map(|s| s.intensity).collect();
        let (baseline, recent) = intensities.split_at(total - RECENT_SAMPLES);
        let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let baseline_mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
        if recent_mean <= MIN_RECENT_INTENSITY {
            return Ok(None);
        }

        let ratio = recent_mean / baseline_mean.max(MIN_BASELINE_INTENSITY);
        let severity = if ratio > HIGH_SURGE {
            Severity::High
        } else if ratio > MEDIUM_SURGE {
            Severity::Medium
        } else {
            return Ok(None);
        };

        Detection::new(
            PatternType::TransitionRisk,
            severity,
            DetectionBasis::Motion,
            &[
                ("recent_intensity", recent_mean),
                ("baseline_intensity", baseline_mean),
                ("intensity_ratio", ratio),
            ],
        )
        .map(Some)
    }
}

fn frame_hash(image: &GrayImage) -> ImageHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();
    hasher.hash_image(&DynamicImage::ImageLuma8(image.clone()))
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    if a.dimensions() != b.dimensions() {
        return f64::MAX;
    }
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    total as f64 / a.as_raw().len().max(1) as f64
}

impl PatternAnalyzer for MotionAnalyzer {
    fn window_secs(&self) -> f64 {
        MOTION_WINDOW_SECS
    }

    fn observe(&mut self, sample: DomainSample, ts: f64) {
        if let DomainSample::Frame(frame) = sample {
            self.frames.push(ts, frame.image.clone());
            self.record_frame(frame.index, frame.image, ts);
        }
    }

    fn evaluate(&self, _now: f64) -> Vec<Result<Detection, AnalysisError>> {
        [self.detect_bias().transpose(), self.detect_surge().transpose()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn evidence_context(&self, _center: f64) -> EvidenceContext {
        EvidenceContext::Video {
            source_media: self.source_media.clone(),
            frames: self
                .frames
                .iter()
                .map(|(ts, image)| TimedFrame {
                    ts: *ts,
                    image: image.clone(),
                })
                .collect(),
            bias: self.samples.values().last().map_or(0.0, |s| s.bias),
            fps: self.fps,
        }
    }
}
