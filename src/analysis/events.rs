//! Event-schema detectors over a 45 s window of match events.

use std::sync::Arc;

use crate::{
    evidence::EvidenceContext,
    models::{DomainSample, EventRecord, PatternType, Severity},
    scoring::{self, ShotScorer},
};

use super::{AnalysisError, Detection, DetectionBasis, PatternAnalyzer, RollingWindow};

pub const EVENT_WINDOW_SECS: f64 = 45.0;
pub const EVIDENCE_RADIUS_SECS: f64 = 5.0;

const PITCH_WIDTH: f64 = 68.0;
const MIN_BUILD_UP_SAMPLES: usize = 8;
const TRANSITION_HORIZON_SECS: f64 = 8.0;
const BOX_ENTRY_X: f64 = 88.0;
const FINAL_THIRD_X: f64 = 70.0;
const MIN_FINAL_THIRD_ENTRIES: usize = 5;
const HIGH_FINAL_THIRD_ENTRIES: usize = 10;
const FALLBACK_AFTER_SECS: f64 = 30.0;

pub type Finding = (Severity, Vec<(&'static str, f64)>);

pub fn detect_build_up_bias(events: &[&EventRecord]) -> Option<Finding> {
    let moves: Vec<&EventRecord> = events
        .iter()
        .copied()
        .filter(|ev| matches!(ev.type_lower().as_str(), "pass" | "carry"))
        .filter(|ev| ev.start_x.is_some() && ev.end_x.is_some())
        .collect();
    if moves.len() < MIN_BUILD_UP_SAMPLES {
        return None;
    }

    let mean_dx = moves.iter().filter_map(|ev| ev.dx()).sum::<f64>() / moves.len() as f64;

    let ys: Vec<f64> = moves.iter().filter_map(|ev| ev.start_y).collect();
    let share = |pred: fn(f64) -> bool| -> f64 {
        if ys.is_empty() {
            0.0
        } else {
            ys.iter().filter(|y| pred(**y)).count() as f64 / ys.len() as f64
        }
    };
    let left_ratio = share(|y| y < PITCH_WIDTH / 3.0);
    let right_ratio = share(|y| y > PITCH_WIDTH * 2.0 / 3.0);
    let outer_ratio = left_ratio.max(right_ratio);

    let severity = if mean_dx.abs() > 8.0 || outer_ratio > 0.6 {
        Severity::High
    } else if mean_dx.abs() > 5.0 || outer_ratio > 0.5 {
        Severity::Medium
    } else {
        return None;
    };

    Some((
        severity,
        vec![
            ("mean_dx", mean_dx),
            ("left_channel_ratio", left_ratio),
            ("right_channel_ratio", right_ratio),
            ("outer_third_ratio", outer_ratio),
            ("event_count", moves.len() as f64),
        ],
    ))
}

fn is_turnover(ev: &EventRecord) -> bool {
    ev.is_unsuccessful() || ev.type_lower().contains("turnover")
}

fn is_attack(ev: &EventRecord) -> bool {
    ev.type_lower() == "shot" || ev.end_x.is_some_and(|x| x > BOX_ENTRY_X)
}

pub fn detect_transition_risk(events: &[&EventRecord]) -> Option<Finding> {
    // Latest turnover wins; on equal times the later sample in window order.
    let turnover = events
        .iter()
        .copied()
        .filter(|ev| is_turnover(ev))
        .fold(None, |best: Option<&EventRecord>, ev| match best {
            Some(b) if b.time_seconds > ev.time_seconds => Some(b),
            _ => Some(ev),
        })?;

    let start = turnover.time_seconds;
    let followups = events
        .iter()
        .filter(|ev| ev.time_seconds > start && ev.time_seconds <= start + TRANSITION_HORIZON_SECS)
        .filter(|ev| is_attack(ev))
        .count();
    if followups == 0 {
        return None;
    }

    let severity = if followups >= 2 {
        Severity::High
    } else {
        Severity::Medium
    };
    let turnover_x = turnover.end_x.or(turnover.start_x).unwrap_or(0.0);
    Some((
        severity,
        vec![
            ("turnover_x", turnover_x),
            ("followup_attack_count", followups as f64),
        ],
    ))
}

pub fn detect_final_third_pressure(events: &[&EventRecord]) -> Option<Finding> {
    let entries = events
        .iter()
        .filter(|ev| ev.end_x.is_some_and(|x| x > FINAL_THIRD_X))
        .count();
    if entries < MIN_FINAL_THIRD_ENTRIES {
        return None;
    }
    let severity = if entries >= HIGH_FINAL_THIRD_ENTRIES {
        Severity::High
    } else {
        Severity::Medium
    };
    Some((severity, vec![("final_third_entries", entries as f64)]))
}

fn fallback_metrics(events: &[&EventRecord], demo_mode: bool) -> Vec<(&'static str, f64)> {
    let count = events.len() as f64;
    if !demo_mode {
        return vec![("event_count", count)];
    }
    let dx: Vec<f64> = events.iter().filter_map(|ev| ev.dx()).collect();
    let mean_dx = if dx.is_empty() {
        0.0
    } else {
        dx.iter().sum::<f64>() / dx.len() as f64
    };
    let entries = events
        .iter()
        .filter(|ev| ev.end_x.is_some_and(|x| x > FINAL_THIRD_X))
        .count();
    let shots = events.iter().filter(|ev| ev.type_lower() == "shot").count();
    vec![
        ("event_count", count),
        ("mean_dx", mean_dx),
        ("final_third_entries", entries as f64),
        ("shot_count", shots as f64),
    ]
}

pub struct EventAnalyzer {
    window: RollingWindow<EventRecord>,
    scorer: Arc<ShotScorer>,
    demo_mode: bool,
}

impl EventAnalyzer {
    pub fn new(scorer: Arc<ShotScorer>, demo_mode: bool) -> Self {
        Self {
            window: RollingWindow::new(EVENT_WINDOW_SECS),
            scorer,
            demo_mode,
        }
    }

    fn events(&self) -> Vec<&EventRecord> {
        self.window.values().collect()
    }
}

impl PatternAnalyzer for EventAnalyzer {
    fn window_secs(&self) -> f64 {
        EVENT_WINDOW_SECS
    }

    fn observe(&mut self, sample: DomainSample, ts: f64) {
        if let DomainSample::Event(event) = sample {
            self.window.push(ts, event);
        }
    }

    fn evaluate(&self, _now: f64) -> Vec<Result<Detection, AnalysisError>> {
        let events = self.events();
        let shot_probability = if self.scorer.is_active() {
            self.scorer
                .predict_proba(&scoring::window_features(&events))
        } else {
            None
        };

        let findings = [
            (PatternType::BuildUpBias, detect_build_up_bias(&events)),
            (PatternType::TransitionRisk, detect_transition_risk(&events)),
            (
                PatternType::FinalThirdPressure,
                detect_final_third_pressure(&events),
            ),
        ];

        let mut detections = Vec::new();
        for (pattern, finding) in findings {
            let Some((mut severity, mut values)) = finding else {
                continue;
            };
            if let Some(p) = shot_probability {
                values.push(("shot_probability", p));
                if pattern == PatternType::FinalThirdPressure
                    && severity == Severity::Medium
                    && self.scorer.should_alert(Some(p))
                {
                    severity = Severity::High;
                }
            }
            detections.push(Detection::new(
                pattern,
                severity,
                DetectionBasis::EventWindow,
                &values,
            ));
        }
        detections
    }

    fn fallback(&self, now: f64) -> Result<Option<Detection>, AnalysisError> {
        if now < FALLBACK_AFTER_SECS || self.window.is_empty() {
            return Ok(None);
        }
        let values = fallback_metrics(&self.events(), self.demo_mode);
        Detection::new(
            PatternType::BuildUpBias,
            Severity::Medium,
            DetectionBasis::Fallback,
            &values,
        )
        .map(Some)
    }

    fn evidence_context(&self, center: f64) -> EvidenceContext {
        EvidenceContext::Events(
            self.window
                .around(center, EVIDENCE_RADIUS_SECS)
                .cloned()
                .collect(),
        )
    }
}
