use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Created,
    Connecting,
    Running,
    Lost,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Lost => "LOST",
            SessionStatus::Stopped => "STOPPED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Device,
    Network,
    EventLog,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    OfflineRealtime,
    Live,
}

fn default_fps() -> u32 {
    25
}

fn default_buffer_ms() -> i64 {
    300
}

fn default_playback_speed() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    pub source_kind: SourceKind,
    #[serde(default)]
    pub mode: PlaybackMode,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: i64,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub device_id: i64,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub dataset_path: Option<String>,
    #[serde(default)]
    pub game_id: Option<i64>,
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,
}

impl SessionCreateRequest {
    pub fn new(source_kind: SourceKind) -> Self {
        Self {
            source_kind,
            mode: PlaybackMode::default(),
            fps: default_fps(),
            buffer_ms: default_buffer_ms(),
            path: None,
            stream_url: None,
            device_id: 0,
            file_id: None,
            dataset_path: None,
            game_id: None,
            playback_speed: default_playback_speed(),
        }
    }

    /// Range and per-kind required-field checks. Runs before an id is allocated.
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.fps) {
            return Err(Error::Validation(format!(
                "fps must be between 1 and 60, got {}",
                self.fps
            )));
        }
        if self.buffer_ms < 0 {
            return Err(Error::Validation(format!(
                "buffer_ms must be >= 0, got {}",
                self.buffer_ms
            )));
        }
        if self.device_id < 0 {
            return Err(Error::Validation(format!(
                "device_id must be >= 0, got {}",
                self.device_id
            )));
        }
        match self.source_kind {
            SourceKind::EventLog if self.game_id.is_none() => Err(Error::Validation(
                "game_id is required for event_log sources".into(),
            )),
            SourceKind::Network if non_empty(&self.stream_url).is_none() => Err(
                Error::Validation("stream_url is required for network sources".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Speeds that are not positive and finite replay at 1x.
    pub fn effective_playback_speed(&self) -> f64 {
        if self.playback_speed.is_finite() && self.playback_speed > 0.0 {
            self.playback_speed
        } else {
            1.0
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source_kind: SourceKind,
    pub mode: PlaybackMode,
    pub fps: u32,
    pub buffer_ms: i64,
    pub source_uri: String,
    pub game_id: Option<i64>,
    pub status: SessionStatus,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEvent {
    pub session_id: String,
    pub status: SessionStatus,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}
