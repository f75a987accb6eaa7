//! Optional shot-probability signal backed by a pre-trained logistic model bundle.
//!
//! The bundle is produced offline. When it is absent or unreadable the scorer is
//! disabled and every query returns `None`.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

use crate::models::EventRecord;

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

#[derive(Debug, Clone, Deserialize)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelBundle {
    feature_columns: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default)]
    scaler: Option<Scaler>,
    #[serde(default)]
    threshold_precision: Option<f64>,
    #[serde(default)]
    threshold_f1: Option<f64>,
}

impl ModelBundle {
    fn check(&self) -> Result<(), String> {
        let n = self.feature_columns.len();
        if self.coefficients.len() != n {
            return Err(format!(
                "{} coefficients for {} feature columns",
                self.coefficients.len(),
                n
            ));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != n || scaler.scale.len() != n {
                return Err("scaler dimensions do not match feature columns".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ShotScorer {
    model: Option<ModelBundle>,
    threshold: f64,
}

impl Default for ShotScorer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ShotScorer {
    pub fn disabled() -> Self {
        Self {
            model: None,
            threshold: 0.5,
        }
    }

    /// Never fails: a missing or invalid bundle yields a disabled scorer.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::disabled();
        };
        if !path.exists() {
            log_info!("scoring model not found at {}, signal disabled", path.display());
            return Self::disabled();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<ModelBundle>(&raw).map_err(|e| e.to_string()))
            .and_then(|bundle| bundle.check().map(|_| bundle));

        match parsed {
            Ok(bundle) => {
                let threshold = bundle
                    .threshold_precision
                    .or(bundle.threshold_f1)
                    .unwrap_or(0.5);
                log_info!(
                    "scoring model loaded from {} ({} features, threshold={:.4})",
                    path.display(),
                    bundle.feature_columns.len(),
                    threshold
                );
                Self {
                    model: Some(bundle),
                    threshold,
                }
            }
            Err(err) => {
                log_warn!("failed to load scoring model {}: {err}, signal disabled", path.display());
                Self::disabled()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.model.is_some()
    }

    /// Missing or non-finite features are treated as 0.
    pub fn predict_proba(&self, features: &HashMap<String, f64>) -> Option<f64> {
        let model = self.model.as_ref()?;
        let mut z = model.intercept;
        for (i, column) in model.feature_columns.iter().enumerate() {
            let mut x = features
                .get(column)
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            if let Some(scaler) = &model.scaler {
                let scale = if scaler.scale[i] == 0.0 { 1.0 } else { scaler.scale[i] };
                x = (x - scaler.mean[i]) / scale;
            }
            z += model.coefficients[i] * x;
        }
        let proba = 1.0 / (1.0 + (-z).exp());
        proba.is_finite().then_some(proba)
    }

    pub fn should_alert(&self, proba: Option<f64>) -> bool {
        proba.is_some_and(|p| p >= self.threshold)
    }
}

/// Aggregate features over a window of events, named like the training columns.
pub fn window_features(events: &[&EventRecord]) -> HashMap<String, f64> {
    let mut f = HashMap::new();
    let count = events.len() as f64;
    f.insert("event_count".to_string(), count);

    let time_span = match (events.first(), events.last()) {
        (Some(first), Some(last)) => (last.time_seconds - first.time_seconds).max(0.0),
        _ => 0.0,
    };
    f.insert("time_span".into(), time_span);
    f.insert(
        "event_rate".into(),
        if time_span > 0.0 { count / time_span } else { 0.0 },
    );

    let count_type = |name: &str| events.iter().filter(|e| e.type_name == name).count() as f64;
    for (key, type_name) in [
        ("pass_count", "Pass"),
        ("carry_count", "Carry"),
        ("shot_count", "Shot"),
        ("duel_count", "Duel"),
        ("interception_count", "Interception"),
    ] {
        f.insert(key.into(), count_type(type_name));
    }

    let successful = events.iter().filter(|e| e.result_name == "Successful").count() as f64;
    let unsuccessful = events.iter().filter(|e| e.result_name == "Unsuccessful").count() as f64;
    f.insert("successful_count".into(), successful);
    f.insert("unsuccessful_count".into(), unsuccessful);
    f.insert("unknown_result_count".into(), count - successful - unsuccessful);
    f.insert(
        "success_rate".into(),
        ratio(successful, successful + unsuccessful),
    );
    f.insert("success_rate_with_unknown".into(), ratio(successful, count));

    let passes: Vec<&&EventRecord> = events
        .iter()
        .filter(|e| e.type_name == "Pass" && e.start_x.is_some() && e.end_x.is_some())
        .collect();
    let dx: Vec<f64> = passes.iter().filter_map(|e| e.dx()).collect();
    let dy: Vec<f64> = passes.iter().filter_map(|e| e.dy()).collect();
    f.insert("mean_dx".into(), mean(&dx));
    f.insert("mean_dy".into(), mean(&dy));
    f.insert("std_dx".into(), std_dev(&dx));
    f.insert("std_dy".into(), std_dev(&dy));
    f.insert(
        "forward_ratio".into(),
        ratio(dx.iter().filter(|d| **d > 0.0).count() as f64, dx.len() as f64),
    );

    let total = passes.len() as f64;
    let (right, left) = if passes.iter().any(|e| e.start_y.is_some()) {
        (
            ratio(passes.iter().filter(|e| e.start_y.is_some_and(|y| y > 45.3)).count() as f64, total),
            ratio(passes.iter().filter(|e| e.start_y.is_some_and(|y| y < 22.7)).count() as f64, total),
        )
    } else {
        (0.0, 0.0)
    };
    f.insert("right_ratio".into(), right);
    f.insert("left_ratio".into(), left);
    f.insert(
        "center_ratio".into(),
        if total > 0.0 && passes.iter().any(|e| e.start_y.is_some()) {
            1.0 - right - left
        } else {
            0.0
        },
    );

    let entries_beyond = |x: f64| events.iter().filter(|e| e.end_x.is_some_and(|v| v > x)).count() as f64;
    f.insert("final_third_entries".into(), entries_beyond(70.0));
    f.insert("penalty_area_entries".into(), entries_beyond(88.0));

    let teams: Vec<i64> = events.iter().filter_map(|e| e.team_id).collect();
    let changes = teams.windows(2).filter(|w| w[0] != w[1]).count() as f64;
    f.insert("possession_changes".into(), changes);

    f
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample::event;

    fn write_bundle(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("model.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_missing_bundle_disables_scorer() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = ShotScorer::load(Some(&dir.path().join("absent.json")));
        assert!(!scorer.is_active());
        assert_eq!(scorer.predict_proba(&HashMap::new()), None);
        assert!(!scorer.should_alert(None));
    }

    #[test]
    fn test_mismatched_bundle_disables_scorer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(
            dir.path(),
            r#"{"feature_columns": ["a", "b"], "coefficients": [1.0], "intercept": 0.0}"#,
        );
        assert!(!ShotScorer::load(Some(&path)).is_active());
    }

    #[test]
    fn test_logistic_prediction_with_scaler() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(
            dir.path(),
            r#"{
                "feature_columns": ["shot_count", "missing"],
                "coefficients": [2.0, 5.0],
                "intercept": -1.0,
                "scaler": {"mean": [1.0, 0.0], "scale": [0.5, 1.0]},
                "threshold_f1": 0.7
            }"#,
        );
        let scorer = ShotScorer::load(Some(&path));
        assert!(scorer.is_active());
        assert!(scorer.should_alert(Some(0.7)));
        assert!(!scorer.should_alert(Some(0.69)));

        let mut features = HashMap::new();
        features.insert("shot_count".to_string(), 1.5);
        // z = -1 + 2 * ((1.5 - 1) / 0.5) + 5 * 0 = 1
        let p = scorer.predict_proba(&features).unwrap();
        assert!((p - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-9);
        assert!(scorer.should_alert(Some(p)));
    }

    #[test]
    fn test_window_features_counts() {
        let mut a = event(0.0, "Pass");
        a.start_x = Some(40.0);
        a.end_x = Some(75.0);
        a.start_y = Some(50.0);
        a.team_id = Some(1);
        let mut b = event(10.0, "Shot");
        b.end_x = Some(100.0);
        b.team_id = Some(2);
        let events = vec![&a, &b];

        let f = window_features(&events);
        assert_eq!(f["event_count"], 2.0);
        assert_eq!(f["event_rate"], 0.2);
        assert_eq!(f["mean_dx"], 35.0);
        assert_eq!(f["right_ratio"], 1.0);
        assert_eq!(f["final_third_entries"], 2.0);
        assert_eq!(f["penalty_area_entries"], 1.0);
        assert_eq!(f["possession_changes"], 1.0);
    }
}
