use std::collections::HashMap;

use crate::models::PatternType;

/// Last-fired stream time per pattern. Owned by the session's background task.
#[derive(Debug)]
pub struct CooldownTracker {
    cooldown_secs: f64,
    last_fired: HashMap<PatternType, f64>,
}

impl CooldownTracker {
    pub fn new(cooldown_secs: f64) -> Self {
        Self {
            cooldown_secs: cooldown_secs.max(0.0),
            last_fired: HashMap::new(),
        }
    }

    pub fn ready(&self, pattern: PatternType, ts: f64) -> bool {
        self.last_fired
            .get(&pattern)
            .map_or(true, |last| ts - last >= self.cooldown_secs)
    }

    pub fn record(&mut self, pattern: PatternType, ts: f64) {
        let last = self.last_fired.entry(pattern).or_insert(ts);
        *last = last.max(ts);
    }

    pub fn last_fired(&self, pattern: PatternType) -> Option<f64> {
        self.last_fired.get(&pattern).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_cool_down_independently() {
        let mut cooldown = CooldownTracker::new(8.0);
        assert!(cooldown.ready(PatternType::BuildUpBias, 0.0));
        cooldown.record(PatternType::BuildUpBias, 10.0);

        assert!(!cooldown.ready(PatternType::BuildUpBias, 17.9));
        assert!(cooldown.ready(PatternType::BuildUpBias, 18.0));
        assert!(cooldown.ready(PatternType::TransitionRisk, 11.0));
    }

    #[test]
    fn last_fired_never_moves_backwards() {
        let mut cooldown = CooldownTracker::new(8.0);
        cooldown.record(PatternType::FinalThirdPressure, 20.0);
        cooldown.record(PatternType::FinalThirdPressure, 5.0);
        assert_eq!(cooldown.last_fired(PatternType::FinalThirdPressure), Some(20.0));
    }
}
