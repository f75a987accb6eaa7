use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const ENV_PREFIX: &str = "PITCHSIDE_";

/// Process-wide configuration. Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix used when building public evidence/upload locators.
    pub api_prefix: String,
    pub storage_path: PathBuf,
    pub evidence_path: PathBuf,
    /// Event dataset (CSV). When set it is validated at startup.
    pub events_data_path: Option<PathBuf>,
    pub match_info_path: Option<PathBuf>,
    /// Optional pre-trained scoring bundle; absence disables the signal.
    pub scoring_model_path: Option<PathBuf>,
    /// Fallback alerts carry aggregate window metrics instead of a bare count.
    pub demo_mode: bool,
    pub cooldown_secs: f64,
    pub eval_interval_secs: f64,
    pub default_playback_speed: f64,
    pub ffmpeg_path: String,
    /// Font passed to ffmpeg `drawtext`; fontconfig's default when unset.
    pub overlay_font: Option<PathBuf>,
    pub analysis_width: u32,
    pub analysis_height: u32,
    pub clip_codec: String,
    pub source_shutdown_grace_ms: u64,
    /// Bound on opening a source, and ffmpeg's network I/O timeout.
    pub source_open_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let storage_path = PathBuf::from("storage");
        Self {
            api_prefix: "/api".into(),
            evidence_path: storage_path.join("evidence"),
            storage_path,
            events_data_path: None,
            match_info_path: None,
            scoring_model_path: None,
            demo_mode: true,
            cooldown_secs: 8.0,
            eval_interval_secs: 1.0,
            default_playback_speed: 5.0,
            ffmpeg_path: which::which("ffmpeg").map_or_else(
                |_| "ffmpeg".to_string(),
                |p| p.to_string_lossy().to_string(),
            ),
            overlay_font: None,
            analysis_width: 320,
            analysis_height: 180,
            clip_codec: "mpeg4".into(),
            source_shutdown_grace_ms: 2_000,
            source_open_timeout_ms: 10_000,
        }
    }
}

impl Settings {
    /// Read the optional JSON settings file, then apply `PITCHSIDE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid settings file {}", path.display()))?
            }
            _ => Settings::default(),
        };
        settings.apply_env(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        Ok(settings)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("API_PREFIX") {
            self.api_prefix = value;
        }
        if let Some(value) = lookup("STORAGE_PATH") {
            self.storage_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("EVIDENCE_PATH") {
            self.evidence_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("EVENTS_DATA_PATH") {
            self.events_data_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("MATCH_INFO_PATH") {
            self.match_info_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("SCORING_MODEL_PATH") {
            self.scoring_model_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("DEMO_MODE") {
            self.demo_mode = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("COOLDOWN_SECS") {
            self.cooldown_secs = value
                .parse()
                .with_context(|| format!("{ENV_PREFIX}COOLDOWN_SECS is not a number: {value}"))?;
        }
        if let Some(value) = lookup("EVAL_INTERVAL_SECS") {
            self.eval_interval_secs = value.parse().with_context(|| {
                format!("{ENV_PREFIX}EVAL_INTERVAL_SECS is not a number: {value}")
            })?;
        }
        if let Some(value) = lookup("PLAYBACK_SPEED") {
            self.default_playback_speed = value
                .parse()
                .with_context(|| format!("{ENV_PREFIX}PLAYBACK_SPEED is not a number: {value}"))?;
        }
        if let Some(value) = lookup("FFMPEG_PATH") {
            self.ffmpeg_path = value;
        }
        if let Some(value) = lookup("OVERLAY_FONT") {
            self.overlay_font = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("SOURCE_OPEN_TIMEOUT_MS") {
            self.source_open_timeout_ms = value.parse().with_context(|| {
                format!("{ENV_PREFIX}SOURCE_OPEN_TIMEOUT_MS is not a number: {value}")
            })?;
        }
        Ok(())
    }

    pub fn upload_index_path(&self) -> PathBuf {
        self.storage_path.join("upload_index.json")
    }

    pub fn source_shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.source_shutdown_grace_ms)
    }

    pub fn source_open_timeout(&self) -> Duration {
        Duration::from_millis(self.source_open_timeout_ms)
    }

    /// Public locator for an evidence artifact written under `evidence_path`.
    pub fn evidence_locator(&self, session_id: &str, file_name: &str) -> String {
        format!("{}/evidence/{}/{}", self.api_prefix, session_id, file_name)
    }
}
