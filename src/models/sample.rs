use image::GrayImage;
use serde::{Deserialize, Serialize};

/// One structured match event, positions in meters on a 105x68 pitch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub game_id: i64,
    pub game_episode: Option<String>,
    pub action_id: Option<i64>,
    pub time_seconds: f64,
    pub type_name: String,
    pub result_name: String,
    pub start_x: Option<f64>,
    pub start_y: Option<f64>,
    pub end_x: Option<f64>,
    pub end_y: Option<f64>,
    pub team_id: Option<i64>,
    pub player_id: Option<i64>,
    pub period_id: Option<i64>,
}

impl EventRecord {
    pub fn dx(&self) -> Option<f64> {
        Some(self.end_x? - self.start_x?)
    }

    pub fn dy(&self) -> Option<f64> {
        Some(self.end_y? - self.start_y?)
    }

    pub fn type_lower(&self) -> String {
        self.type_name.to_lowercase()
    }

    pub fn is_unsuccessful(&self) -> bool {
        self.result_name.trim().eq_ignore_ascii_case("unsuccessful")
    }

    /// Ordering key for replay: event time, then action ordinal (missing sorts as 0).
    pub fn sort_key(&self) -> (f64, i64) {
        (self.time_seconds, self.action_id.unwrap_or(0))
    }
}

/// A decoded grayscale frame at the analysis resolution.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub index: u64,
    pub image: GrayImage,
}

#[derive(Debug, Clone)]
pub enum DomainSample {
    Frame(VideoFrame),
    Event(EventRecord),
}

#[cfg(test)]
pub(crate) fn event(time_seconds: f64, type_name: &str) -> EventRecord {
    EventRecord {
        game_id: 1,
        game_episode: None,
        action_id: None,
        time_seconds,
        type_name: type_name.to_string(),
        result_name: "Successful".to_string(),
        start_x: None,
        start_y: None,
        end_x: None,
        end_y: None,
        team_id: None,
        player_id: None,
        period_id: None,
    }
}
