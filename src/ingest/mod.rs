//! Pull-based source adapters and the factory that selects one per session.

pub mod events;
pub mod pump;
pub mod video;

use std::{
    path::PathBuf,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use crate::{
    error::{Error, Result},
    models::{DomainSample, PlaybackMode, Session, SessionCreateRequest, SourceKind},
    settings::Settings,
};

pub use events::EventLogSource;
pub use pump::{SourcePull, SourcePump};
pub use video::{VideoConfig, VideoInput, VideoSource};

/// Uniform interface over every input backend.
///
/// `read` blocks until the next sample is available and returns `Ok(None)` at end of
/// stream. All three methods are called from a blocking worker, never from the async
/// scheduler. `open` and `close` are idempotent.
pub trait SourceAdapter: Send {
    fn open(&mut self) -> Result<()>;
    fn read(&mut self) -> Result<Option<(DomainSample, f64)>>;
    fn close(&mut self);

    /// Handle that wakes a blocked `open` or `read` from another thread. Once fired,
    /// pending and later calls return promptly (end of stream or an error).
    fn interrupter(&self) -> Option<Arc<dyn ReadInterrupt>> {
        None
    }
}

/// Unblocks an adapter's reader during shutdown or an open timeout.
pub trait ReadInterrupt: Send + Sync {
    fn interrupt(&self);
}

/// Sleep that ends early once interrupted. Shared by paced sources.
#[derive(Debug, Default)]
pub struct SleepInterrupt {
    fired: Mutex<bool>,
    wake: Condvar,
}

impl SleepInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `duration`. Returns `false` if interrupted before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let fired = self.fired.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (fired, _) = self
            .wake
            .wait_timeout_while(fired, duration, |fired| !*fired)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !*fired
    }

    pub fn is_interrupted(&self) -> bool {
        *self.fired.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReadInterrupt for SleepInterrupt {
    fn interrupt(&self) {
        *self.fired.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        self.wake.notify_all();
    }
}

/// Builds the adapter for a session at start time.
pub trait SourceFactory: Send + Sync {
    fn build(
        &self,
        session: &Session,
        request: &SessionCreateRequest,
    ) -> Result<Box<dyn SourceAdapter>>;
}

pub struct DefaultSourceFactory {
    settings: Arc<Settings>,
}

impl DefaultSourceFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    fn video_config(&self, request: &SessionCreateRequest) -> VideoConfig {
        VideoConfig {
            ffmpeg_path: self.settings.ffmpeg_path.clone(),
            width: self.settings.analysis_width,
            height: self.settings.analysis_height,
            fps: request.fps,
            io_timeout: self.settings.source_open_timeout(),
        }
    }
}

impl SourceFactory for DefaultSourceFactory {
    fn build(
        &self,
        session: &Session,
        request: &SessionCreateRequest,
    ) -> Result<Box<dyn SourceAdapter>> {
        let adapter: Box<dyn SourceAdapter> = match session.source_kind {
            SourceKind::EventLog => {
                let game_id = session.game_id.ok_or_else(|| {
                    Error::Validation("game_id is required for event_log sources".into())
                })?;
                Box::new(EventLogSource::new(
                    PathBuf::from(&session.source_uri),
                    game_id,
                    request.effective_playback_speed(),
                ))
            }
            SourceKind::File => Box::new(VideoSource::new(
                VideoInput::File {
                    path: PathBuf::from(&session.source_uri),
                    realtime: session.mode == PlaybackMode::OfflineRealtime,
                },
                self.video_config(request),
            )),
            SourceKind::Device => Box::new(VideoSource::new(
                VideoInput::Device {
                    index: request.device_id.max(0) as u32,
                },
                self.video_config(request),
            )),
            SourceKind::Network => Box::new(VideoSource::new(
                VideoInput::Network {
                    url: session.source_uri.clone(),
                    buffer_ms: request.buffer_ms.max(0) as u64,
                },
                self.video_config(request),
            )),
        };
        Ok(adapter)
    }
}
