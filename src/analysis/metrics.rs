//! Closed metric schema: each (pattern, basis) pair declares exactly which named
//! metrics it may report, which are required, and their units.

use crate::models::{EvidenceMetric, PatternType};

use super::{AnalysisError, DetectionBasis};

#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub required: bool,
}

const fn required(name: &'static str, unit: Option<&'static str>) -> MetricSpec {
    MetricSpec {
        name,
        unit,
        required: true,
    }
}

const fn optional(name: &'static str, unit: Option<&'static str>) -> MetricSpec {
    MetricSpec {
        name,
        unit,
        required: false,
    }
}

const METERS: Option<&str> = Some("m");
const COUNT: Option<&str> = Some("count");
const RATIO: Option<&str> = Some("ratio");
const PX_PER_FRAME: Option<&str> = Some("px/frame");

const BUILD_UP_EVENTS: &[MetricSpec] = &[
    required("mean_dx", METERS),
    required("left_channel_ratio", RATIO),
    required("right_channel_ratio", RATIO),
    required("outer_third_ratio", RATIO),
    required("event_count", COUNT),
    optional("shot_probability", RATIO),
];

const TRANSITION_EVENTS: &[MetricSpec] = &[
    required("turnover_x", METERS),
    required("followup_attack_count", COUNT),
    optional("shot_probability", RATIO),
];

const FINAL_THIRD_EVENTS: &[MetricSpec] = &[
    required("final_third_entries", COUNT),
    optional("shot_probability", RATIO),
];

const FALLBACK: &[MetricSpec] = &[
    required("event_count", COUNT),
    optional("mean_dx", METERS),
    optional("final_third_entries", COUNT),
    optional("shot_count", COUNT),
];

const BUILD_UP_MOTION: &[MetricSpec] = &[
    required("flow_x_bias", RATIO),
    required("biased_sample_share", RATIO),
    required("sample_count", COUNT),
];

const TRANSITION_MOTION: &[MetricSpec] = &[
    required("recent_intensity", PX_PER_FRAME),
    required("baseline_intensity", PX_PER_FRAME),
    required("intensity_ratio", RATIO),
];

pub fn schema(pattern: PatternType, basis: DetectionBasis) -> &'static [MetricSpec] {
    match (basis, pattern) {
        (DetectionBasis::EventWindow, PatternType::BuildUpBias) => BUILD_UP_EVENTS,
        (DetectionBasis::EventWindow, PatternType::TransitionRisk) => TRANSITION_EVENTS,
        (DetectionBasis::EventWindow, PatternType::FinalThirdPressure) => FINAL_THIRD_EVENTS,
        (DetectionBasis::Fallback, PatternType::BuildUpBias) => FALLBACK,
        (DetectionBasis::Motion, PatternType::BuildUpBias) => BUILD_UP_MOTION,
        (DetectionBasis::Motion, PatternType::TransitionRisk) => TRANSITION_MOTION,
        _ => &[],
    }
}

/// Validates raw values against the schema and returns them in schema order with units.
pub fn build(
    pattern: PatternType,
    basis: DetectionBasis,
    values: &[(&str, f64)],
) -> Result<Vec<EvidenceMetric>, AnalysisError> {
    let specs = schema(pattern, basis);
    if specs.is_empty() {
        return Err(AnalysisError::UnsupportedPattern { pattern, basis });
    }

    for (name, value) in values {
        if !specs.iter().any(|s| s.name == *name) {
            return Err(AnalysisError::UnknownMetric {
                pattern,
                name: name.to_string(),
            });
        }
        if !value.is_finite() {
            return Err(AnalysisError::NonFiniteMetric {
                pattern,
                name: name.to_string(),
            });
        }
    }

    let mut metrics = Vec::with_capacity(values.len());
    for spec in specs {
        match values.iter().find(|(name, _)| *name == spec.name) {
            Some((_, value)) => metrics.push(EvidenceMetric {
                name: spec.name.to_string(),
                value: *value,
                unit: spec.unit.map(str::to_string),
            }),
            None if spec.required => {
                return Err(AnalysisError::MissingMetric {
                    pattern,
                    name: spec.name.to_string(),
                })
            }
            None => {}
        }
    }
    Ok(metrics)
}
