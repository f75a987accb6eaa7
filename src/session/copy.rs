//! Coach-facing wording for each alert.

use crate::{analysis::Detection, models::PatternType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCopy {
    pub claim: String,
    pub recommendation: String,
    pub risk: String,
}

/// Side the build-up leans to: channel ratios for event windows, flow direction for
/// video. Defaults to the right when neither is available.
fn leaning_right(detection: &Detection) -> bool {
    match (
        detection.metric("right_channel_ratio"),
        detection.metric("left_channel_ratio"),
    ) {
        (Some(right), Some(left)) => right >= left,
        _ => detection.metric("flow_x_bias").map_or(true, |bias| bias >= 0.0),
    }
}

pub fn alert_copy(detection: &Detection) -> AlertCopy {
    match detection.pattern {
        PatternType::BuildUpBias => {
            let (side, other) = if leaning_right(detection) {
                ("right", "left")
            } else {
                ("left", "right")
            };
            AlertCopy {
                claim: format!("Recent build-up is leaning {side}."),
                recommendation: format!(
                    "Mix in {other} or central switches to unbalance the press."
                ),
                risk: format!("Counter-attack risk is high if possession is lost on the {side}."),
            }
        }
        PatternType::TransitionRisk => AlertCopy {
            claim: "Transition pressure rose right after a turnover.".into(),
            recommendation: "Run a stabilising pattern straight after turnovers.".into(),
            risk: "Sustained transition pressure risks conceding.".into(),
        },
        PatternType::FinalThirdPressure => AlertCopy {
            claim: "The opponent keeps entering the final third.".into(),
            recommendation: "Realign the pressing line near the box to cut entries.".into(),
            risk: "Accumulated box entries raise the probability of conceding.".into(),
        },
    }
}
