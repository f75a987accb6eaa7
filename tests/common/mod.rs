#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use image::{GrayImage, Luma};
use pitchside_lib::{
    evidence::{EvidenceContext, EvidenceError, EvidenceLocators, EvidenceRenderer, EvidenceRequest},
    ingest::{DefaultSourceFactory, ReadInterrupt, SleepInterrupt, SourceAdapter, SourceFactory},
    models::VideoFrame,
    scoring::ShotScorer,
    uploads::UploadIndex,
    DomainSample, Error, EventRecord, PipelineServices, Session, SessionCreateRequest,
    SessionManager, SessionStatus, Settings,
};

pub const GAME_ID: i64 = 7;

pub fn settings(dir: &Path) -> Arc<Settings> {
    Arc::new(Settings {
        storage_path: dir.to_path_buf(),
        evidence_path: dir.join("evidence"),
        cooldown_secs: 8.0,
        eval_interval_secs: 1.0,
        source_shutdown_grace_ms: 2_000,
        ..Settings::default()
    })
}

pub fn services(
    dir: &Path,
    renderer: Arc<dyn EvidenceRenderer>,
    source_factory: Arc<dyn SourceFactory>,
) -> PipelineServices {
    let settings = settings(dir);
    PipelineServices {
        uploads: Arc::new(UploadIndex::open(settings.upload_index_path()).unwrap()),
        dataset: None,
        scorer: Arc::new(ShotScorer::disabled()),
        renderer,
        source_factory,
        settings,
    }
}

/// Manager wired to the real event-log adapter and a recording renderer.
pub fn csv_manager(dir: &Path) -> (SessionManager, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let factory = Arc::new(DefaultSourceFactory::new(settings(dir)));
    (SessionManager::new(services(dir, renderer.clone(), factory)), renderer)
}

pub fn event(t: f64, type_name: &str) -> EventRecord {
    EventRecord {
        game_id: GAME_ID,
        game_episode: None,
        action_id: None,
        time_seconds: t,
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

/// Right-channel pass gaining 9 m.
pub fn forward_pass(t: f64) -> EventRecord {
    EventRecord {
        start_x: Some(30.0),
        start_y: Some(50.0),
        end_x: Some(39.0),
        end_y: Some(52.0),
        ..event(t, "Pass")
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Sinusoidal texture shifted `shift_x` pixels to the right.
fn texture(width: u32, height: u32, shift_x: f32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let xf = x as f32 - shift_x;
        let value = 128.0 + 60.0 * (xf * 0.3).sin() * (y as f32 * 0.25).cos();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// 10 fps frames whose right third drifts one pixel per frame over a static background.
pub fn drifting_frames(count: u64) -> Vec<(DomainSample, f64)> {
    let background = texture(160, 90, 0.0);
    (0..count)
        .map(|i| {
            let moving = texture(160, 90, i as f32);
            let image = GrayImage::from_fn(160, 90, |x, y| {
                if x < 107 {
                    *background.get_pixel(x, y)
                } else {
                    *moving.get_pixel(x, y)
                }
            });
            let ts = i as f64 / 10.0;
            (DomainSample::Frame(VideoFrame { index: i, image }), ts)
        })
        .collect()
}

pub fn write_events_csv(dir: &Path, events: &[EventRecord]) -> PathBuf {
    let path = dir.join("events.csv");
    let mut csv = String::from(
        "game_id,game_episode,action_id,time_seconds,type_name,result_name,start_x,start_y,end_x,end_y\n",
    );
    for (i, e) in events.iter().enumerate() {
        csv.push_str(&format!(
            "{},1,{},{},{},{},{},{},{},{}\n",
            e.game_id,
            i,
            e.time_seconds,
            e.type_name,
            e.result_name,
            cell(e.start_x),
            cell(e.start_y),
            cell(e.end_x),
            cell(e.end_y),
        ));
    }
    std::fs::write(&path, csv).unwrap();
    path
}

pub fn event_request(csv: &Path, game_id: i64) -> SessionCreateRequest {
    let mut request = SessionCreateRequest::new(pitchside_lib::SourceKind::EventLog);
    request.path = Some(csv.to_string_lossy().to_string());
    request.game_id = Some(game_id);
    request.playback_speed = 1_000.0;
    request
}

pub async fn wait_for_status(
    manager: &SessionManager,
    id: &str,
    status: SessionStatus,
) -> Session {
    for _ in 0..500 {
        let session = manager.get(id).await.unwrap();
        if session.status == status {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session {id} never reached {status:?}");
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub requests: Mutex<Vec<EvidenceRequest>>,
}

impl RecordingRenderer {
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Frame counts of the video contexts handed to the renderer.
    pub fn video_frame_counts(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match &r.context {
                EvidenceContext::Video { frames, .. } => Some(frames.len()),
                EvidenceContext::Events(_) => None,
            })
            .collect()
    }

    pub fn event_context_sizes(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| match &r.context {
                EvidenceContext::Events(events) => events.len(),
                EvidenceContext::Video { frames, .. } => frames.len(),
            })
            .collect()
    }
}

impl EvidenceRenderer for RecordingRenderer {
    fn render(&self, request: &EvidenceRequest) -> Result<EvidenceLocators, EvidenceError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(EvidenceLocators {
            clip_url: format!(
                "/api/evidence/{}/clip_{}.mp4",
                request.session_id, request.alert_id
            ),
            overlay_url: format!(
                "/api/evidence/{}/overlay_{}.png",
                request.session_id, request.alert_id
            ),
        })
    }
}

pub struct FailingRenderer;

impl EvidenceRenderer for FailingRenderer {
    fn render(&self, _request: &EvidenceRequest) -> Result<EvidenceLocators, EvidenceError> {
        Err(EvidenceError::NoFrames)
    }
}

/// Adapter replaying a fixed list of samples with a per-read delay. Every wait ends
/// early once the pump interrupts it.
pub struct ScriptedSource {
    samples: VecDeque<(DomainSample, f64)>,
    delay: Duration,
    open_delay: Duration,
    fail_open: bool,
    fail_reads_at_end: bool,
    closes: Arc<AtomicUsize>,
    pause: Arc<SleepInterrupt>,
}

impl SourceAdapter for ScriptedSource {
    fn open(&mut self) -> pitchside_lib::Result<()> {
        if !self.pause.sleep(self.open_delay) {
            return Err(Error::SourceUnavailable("open interrupted".into()));
        }
        if self.fail_open {
            return Err(Error::SourceUnavailable("camera unplugged".into()));
        }
        Ok(())
    }

    fn read(&mut self) -> pitchside_lib::Result<Option<(DomainSample, f64)>> {
        if !self.pause.sleep(self.delay) {
            return Ok(None);
        }
        match self.samples.pop_front() {
            Some(sample) => Ok(Some(sample)),
            None if self.fail_reads_at_end => {
                Err(Error::SourceUnavailable("decoder lost sync".into()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn interrupter(&self) -> Option<Arc<dyn ReadInterrupt>> {
        let handle: Arc<dyn ReadInterrupt> = self.pause.clone();
        Some(handle)
    }
}

pub struct ScriptedFactory {
    pub samples: Vec<(DomainSample, f64)>,
    pub delay: Duration,
    pub open_delay: Duration,
    pub fail_open: bool,
    pub fail_reads_at_end: bool,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(samples: Vec<(DomainSample, f64)>, delay: Duration) -> Self {
        Self {
            samples,
            delay,
            open_delay: Duration::ZERO,
            fail_open: false,
            fail_reads_at_end: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn events(events: Vec<EventRecord>, delay: Duration) -> Self {
        let samples = events
            .into_iter()
            .map(|e| {
                let ts = e.time_seconds;
                (DomainSample::Event(e), ts)
            })
            .collect();
        Self::new(samples, delay)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SourceFactory for ScriptedFactory {
    fn build(
        &self,
        _session: &Session,
        _request: &SessionCreateRequest,
    ) -> pitchside_lib::Result<Box<dyn SourceAdapter>> {
        Ok(Box::new(ScriptedSource {
            samples: self.samples.iter().cloned().collect(),
            delay: self.delay,
            open_delay: self.open_delay,
            fail_open: self.fail_open,
            fail_reads_at_end: self.fail_reads_at_end,
            closes: Arc::clone(&self.closes),
            pause: Arc::new(SleepInterrupt::new()),
        }))
    }
}

/// Status details in recording order.
pub async fn details(manager: &SessionManager, id: &str) -> Vec<String> {
    manager
        .status_events(id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| e.detail)
        .collect()
}
