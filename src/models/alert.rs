use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    BuildUpBias,
    TransitionRisk,
    FinalThirdPressure,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::BuildUpBias => "build_up_bias",
            PatternType::TransitionRisk => "transition_risk",
            PatternType::FinalThirdPressure => "final_third_pressure",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceMetric {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Evidence {
    pub clip_urls: Vec<String>,
    pub overlay_urls: Vec<String>,
    pub metrics: Vec<EvidenceMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub ts_start: f64,
    pub ts_end: f64,
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub claim: String,
    pub recommendation: String,
    pub risk: String,
    pub evidence: Evidence,
}

impl Alert {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.evidence
            .metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }
}
