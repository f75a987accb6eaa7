use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{GrayImage, RgbImage};

use super::{
    ffmpeg::{FfmpegTool, PixelFormat},
    overlay_text, pitch, EvidenceContext, EvidenceError, EvidenceLocators, EvidenceRenderer,
    EvidenceRequest, TimedFrame,
};
use crate::{models::EventRecord, settings::Settings};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_warn};

const CLIP_RADIUS_SECS: f64 = 5.0;
const EVENT_CLIP_FPS: u32 = 10;

/// Writes evidence under `{evidence_path}/{session_id}/` and returns public locators.
pub struct FsEvidenceRenderer {
    settings: Arc<Settings>,
    ffmpeg: FfmpegTool,
}

/// Removes the listed files when dropped.
struct Scratch(Vec<PathBuf>);

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = fs::remove_file(path);
        }
    }
}

impl FsEvidenceRenderer {
    pub fn new(settings: Arc<Settings>) -> Self {
        let ffmpeg = FfmpegTool::new(
            settings.ffmpeg_path.clone(),
            settings.clip_codec.clone(),
            settings.overlay_font.clone(),
        );
        Self { settings, ffmpeg }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.settings.evidence_path.join(session_id)
    }

    fn render_event_clip(
        &self,
        events: &[EventRecord],
        center: f64,
        out: &Path,
    ) -> Result<(), EvidenceError> {
        let start = (center - CLIP_RADIUS_SECS).max(0.0);
        let end = center + CLIP_RADIUS_SECS;
        let frame_count = (((end - start) * EVENT_CLIP_FPS as f64) as usize).max(1);

        let mut sorted: Vec<&EventRecord> = events.iter().collect();
        sorted.sort_by(|a, b| {
            a.sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut canvas = pitch::draw_pitch();
        let mut drawn = 0;
        let frames = (0..frame_count).map(|i| {
            let t = start + i as f64 / EVENT_CLIP_FPS as f64;
            while drawn < sorted.len() && sorted[drawn].time_seconds <= t {
                pitch::draw_event(&mut canvas, sorted[drawn]);
                drawn += 1;
            }
            canvas.as_raw().clone()
        });

        self.ffmpeg.encode_frames(
            frames,
            PixelFormat::Rgb24,
            (pitch::FRAME_WIDTH, pitch::FRAME_HEIGHT),
            EVENT_CLIP_FPS,
            out,
        )
    }

    fn render_video_clip(
        &self,
        source_media: Option<&Path>,
        frames: &[TimedFrame],
        fps: u32,
        center: f64,
        out: &Path,
    ) -> Result<(), EvidenceError> {
        if let Some(src) = source_media.filter(|p| p.is_file()) {
            let start = (center - CLIP_RADIUS_SECS).max(0.0);
            return self
                .ffmpeg
                .trim(src, start, center + CLIP_RADIUS_SECS - start, out);
        }

        let nearby: Vec<&TimedFrame> = frames
            .iter()
            .filter(|f| (f.ts - center).abs() <= CLIP_RADIUS_SECS)
            .collect();
        let first = nearby.first().ok_or(EvidenceError::NoFrames)?;
        self.ffmpeg.encode_frames(
            nearby.iter().map(|f| f.image.as_raw().as_slice()),
            PixelFormat::Gray,
            first.image.dimensions(),
            fps,
            out,
        )
    }

    fn render_overlay(&self, base: &RgbImage, text: &str, out: &Path) -> Result<(), EvidenceError> {
        let name = out
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "overlay".to_string());
        let base_path = out.with_file_name(format!(".{name}.base.png"));
        let text_path = out.with_file_name(format!(".{name}.txt"));
        let _scratch = Scratch(vec![base_path.clone(), text_path.clone()]);

        base.save(&base_path)?;
        fs::write(&text_path, text).map_err(|source| EvidenceError::Io {
            path: text_path.clone(),
            source,
        })?;
        self.ffmpeg.burn_text(&base_path, &text_path, out)
    }

    fn write_artifacts(
        &self,
        request: &EvidenceRequest,
        clip: &Path,
        overlay: &Path,
    ) -> Result<(), EvidenceError> {
        let text = overlay_text(request.pattern, request.severity, &request.metrics);
        match &request.context {
            EvidenceContext::Events(events) => {
                self.render_event_clip(events, request.center_ts, clip)?;
                let still = pitch::render_events(events, f64::NEG_INFINITY, f64::INFINITY);
                self.render_overlay(&still, &text, overlay)
            }
            EvidenceContext::Video {
                source_media,
                frames,
                bias,
                fps,
            } => {
                self.render_video_clip(source_media.as_deref(), frames, *fps, request.center_ts, clip)?;
                let latest: &GrayImage = frames
                    .last()
                    .map(|f| &f.image)
                    .ok_or(EvidenceError::NoFrames)?;
                self.render_overlay(&pitch::bias_overlay(latest, *bias), &text, overlay)
            }
        }
    }
}

impl EvidenceRenderer for FsEvidenceRenderer {
    fn render(&self, request: &EvidenceRequest) -> Result<EvidenceLocators, EvidenceError> {
        let dir = self.session_dir(&request.session_id);
        fs::create_dir_all(&dir).map_err(|source| EvidenceError::Io {
            path: dir.clone(),
            source,
        })?;

        let clip_name = format!("clip_{}.mp4", request.alert_id);
        let overlay_name = format!("overlay_{}.png", request.alert_id);
        let clip = dir.join(&clip_name);
        let overlay = dir.join(&overlay_name);

        if let Err(err) = self.write_artifacts(request, &clip, &overlay) {
            log_warn!(
                "evidence for alert {} in session {} failed: {}",
                request.alert_id,
                request.session_id,
                err
            );
            let _ = fs::remove_file(&clip);
            let _ = fs::remove_file(&overlay);
            return Err(err);
        }

        log_debug!("evidence written to {}", dir.display());
        Ok(EvidenceLocators {
            clip_url: self.settings.evidence_locator(&request.session_id, &clip_name),
            overlay_url: self
                .settings
                .evidence_locator(&request.session_id, &overlay_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample::event, EvidenceMetric, PatternType, Severity};
    use std::process::Command;

    const FONTS: [&str; 3] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];

    /// ffmpeg with `drawtext` plus a usable font, or `None` to skip.
    fn ffmpeg_with_drawtext() -> Option<(String, PathBuf)> {
        let font = FONTS.iter().map(PathBuf::from).find(|p| p.is_file())?;
        let path = which::which("ffmpeg").ok()?;
        let output = Command::new(&path)
            .args(["-hide_banner", "-filters"])
            .output()
            .ok()?;
        String::from_utf8_lossy(&output.stdout)
            .contains("drawtext")
            .then(|| (path.to_string_lossy().to_string(), font))
    }

    fn settings(dir: &Path, ffmpeg_path: String, overlay_font: Option<PathBuf>) -> Arc<Settings> {
        Arc::new(Settings {
            evidence_path: dir.to_path_buf(),
            ffmpeg_path,
            overlay_font,
            ..Settings::default()
        })
    }

    fn event_request() -> EvidenceRequest {
        let mut pass = event(10.0, "Pass");
        pass.start_x = Some(30.0);
        pass.start_y = Some(50.0);
        pass.end_x = Some(40.0);
        pass.end_y = Some(52.0);
        let mut shot = event(12.0, "Shot");
        shot.start_x = Some(95.0);
        shot.start_y = Some(34.0);
        EvidenceRequest {
            session_id: "s1".into(),
            alert_id: "a1".into(),
            center_ts: 12.0,
            pattern: PatternType::BuildUpBias,
            severity: Severity::High,
            metrics: vec![EvidenceMetric {
                name: "mean_dx".into(),
                value: 9.0,
                unit: Some("m".into()),
            }],
            context: EvidenceContext::Events(vec![pass, shot]),
        }
    }

    #[test]
    fn renders_event_clip_and_overlay() {
        let Some((ffmpeg, font)) = ffmpeg_with_drawtext() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let renderer = FsEvidenceRenderer::new(settings(dir.path(), ffmpeg, Some(font)));

        let locators = renderer.render(&event_request()).unwrap();
        assert_eq!(locators.clip_url, "/api/evidence/s1/clip_a1.mp4");
        assert_eq!(locators.overlay_url, "/api/evidence/s1/overlay_a1.png");

        let session_dir = dir.path().join("s1");
        assert!(fs::metadata(session_dir.join("clip_a1.mp4")).unwrap().len() > 0);
        assert!(fs::metadata(session_dir.join("overlay_a1.png")).unwrap().len() > 0);
        let leftovers: Vec<_> = fs::read_dir(&session_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn renders_buffered_video_frames() {
        let Some((ffmpeg, font)) = ffmpeg_with_drawtext() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let renderer = FsEvidenceRenderer::new(settings(dir.path(), ffmpeg, Some(font)));
        let frames = (0..20)
            .map(|i| TimedFrame {
                ts: 2.0 + i as f64 * 0.1,
                image: crate::analysis::flow::texture(64, 48, i as f32),
            })
            .collect();
        let request = EvidenceRequest {
            center_ts: 3.9,
            context: EvidenceContext::Video {
                source_media: None,
                frames,
                bias: 0.4,
                fps: 10,
            },
            ..event_request()
        };

        renderer.render(&request).unwrap();
        assert!(dir.path().join("s1").join("clip_a1.mp4").exists());
    }

    #[test]
    fn failure_leaves_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let renderer =
            FsEvidenceRenderer::new(settings(dir.path(), "/nonexistent/ffmpeg".to_string(), None));

        let err = renderer.render(&event_request()).unwrap_err();
        assert!(matches!(err, EvidenceError::Spawn { .. }));
        let remaining = fs::read_dir(dir.path().join("s1")).unwrap().count();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn video_without_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer =
            FsEvidenceRenderer::new(settings(dir.path(), "/nonexistent/ffmpeg".to_string(), None));
        let request = EvidenceRequest {
            context: EvidenceContext::Video {
                source_media: None,
                frames: Vec::new(),
                bias: 0.0,
                fps: 25,
            },
            ..event_request()
        };
        assert!(matches!(renderer.render(&request), Err(EvidenceError::NoFrames)));
    }
}
