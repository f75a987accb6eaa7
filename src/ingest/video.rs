use image::GrayImage;
use std::{
    io::{self, Read},
    path::PathBuf,
    process::{Child, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    error::{Error, Result},
    models::{DomainSample, VideoFrame},
};

use super::ReadInterrupt;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_warn};

#[derive(Debug, Clone)]
pub enum VideoInput {
    File { path: PathBuf, realtime: bool },
    Device { index: u32 },
    Network { url: String, buffer_ms: u64 },
}

impl VideoInput {
    fn describe(&self) -> String {
        match self {
            VideoInput::File { path, .. } => path.display().to_string(),
            VideoInput::Device { index } => format!("device://{index}"),
            VideoInput::Network { url, .. } => url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Socket timeout handed to ffmpeg for network inputs.
    pub io_timeout: Duration,
}

#[derive(Debug, Default)]
struct SlotState {
    child: Option<Child>,
    interrupted: bool,
}

/// The decoder process, reachable from outside the reader thread. Killing it ends a
/// blocked `read_exact` on its stdout with end of file.
#[derive(Debug, Default)]
struct ChildSlot(Mutex<SlotState>);

impl ChildSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a freshly spawned child. Returns `false` (after killing it) when an
    /// interrupt already arrived.
    fn install(&self, mut child: Child) -> bool {
        let mut state = self.state();
        if state.interrupted {
            let _ = child.kill();
            let _ = child.wait();
            return false;
        }
        state.child = Some(child);
        true
    }

    fn take(&self) -> Option<Child> {
        self.state().child.take()
    }
}

impl ReadInterrupt for ChildSlot {
    fn interrupt(&self) {
        let mut state = self.state();
        state.interrupted = true;
        if let Some(child) = state.child.as_mut() {
            if let Err(err) = child.kill() {
                if err.kind() != io::ErrorKind::InvalidInput {
                    log_warn!("failed to interrupt ffmpeg: {err}");
                }
            }
        }
    }
}

/// Decodes any ffmpeg-readable input into grayscale frames at the analysis resolution.
pub struct VideoSource {
    input: VideoInput,
    config: VideoConfig,
    child: Arc<ChildSlot>,
    stdout: Option<ChildStdout>,
    pending: Option<VideoFrame>,
    next_index: u64,
}

impl VideoSource {
    pub fn new(input: VideoInput, config: VideoConfig) -> Self {
        Self {
            input,
            config,
            child: Arc::new(ChildSlot::default()),
            stdout: None,
            pending: None,
            next_index: 0,
        }
    }

    fn frame_len(&self) -> usize {
        self.config.width as usize * self.config.height as usize
    }

    pub(crate) fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        match &self.input {
            VideoInput::File { path, realtime } => {
                if *realtime {
                    args.push("-re".into());
                }
                args.extend(["-i".into(), path.display().to_string()]);
            }
            VideoInput::Device { index } => {
                args.extend(device_input_args(*index, self.config.fps));
            }
            VideoInput::Network { url, buffer_ms } => {
                let timeout_us = self.config.io_timeout.as_micros().max(1).to_string();
                if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
                    args.extend([
                        "-rtsp_transport".into(),
                        "tcp".into(),
                        "-timeout".into(),
                        timeout_us,
                    ]);
                } else {
                    args.extend(["-rw_timeout".into(), timeout_us]);
                }
                args.extend([
                    "-max_delay".into(),
                    (buffer_ms * 1000).to_string(),
                    "-i".into(),
                    url.clone(),
                ]);
            }
        }

        args.extend([
            "-an".into(),
            "-vf".into(),
            format!(
                "fps={},scale={}:{}",
                self.config.fps, self.config.width, self.config.height
            ),
            "-pix_fmt".into(),
            "gray".into(),
            "-f".into(),
            "rawvideo".into(),
            "pipe:1".into(),
        ]);
        args
    }

    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let len = self.frame_len();
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(Error::SourceUnavailable(format!(
                "{} is not open",
                self.input.describe()
            )));
        };

        let mut buf = vec![0u8; len];
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => {
                return Err(Error::SourceUnavailable(format!(
                    "read from {} failed: {err}",
                    self.input.describe()
                )))
            }
        }

        let image = GrayImage::from_raw(self.config.width, self.config.height, buf)
            .ok_or_else(|| Error::SourceUnavailable("decoded frame has the wrong size".into()))?;
        let frame = VideoFrame {
            index: self.next_index,
            image,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn timestamp(&self, frame: &VideoFrame) -> f64 {
        frame.index as f64 / self.config.fps.max(1) as f64
    }
}

#[cfg(target_os = "linux")]
fn device_input_args(index: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "v4l2".into(),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        format!("/dev/video{index}"),
    ]
}

#[cfg(target_os = "macos")]
fn device_input_args(index: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "avfoundation".into(),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        format!("{index}:none"),
    ]
}

#[cfg(target_os = "windows")]
fn device_input_args(index: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "dshow".into(),
        "-framerate".into(),
        fps.to_string(),
        "-video_device_number".into(),
        index.to_string(),
        "-i".into(),
        "video=".into(),
    ]
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn device_input_args(index: u32, _fps: u32) -> Vec<String> {
    vec!["-i".into(), index.to_string()]
}

impl super::SourceAdapter for VideoSource {
    fn open(&mut self) -> Result<()> {
        if self.stdout.is_some() {
            return Ok(());
        }
        if let VideoInput::File { path, .. } = &self.input {
            if path.as_os_str().is_empty() || !path.exists() {
                return Err(Error::SourceUnavailable(format!(
                    "video file not found: {}",
                    path.display()
                )));
            }
        }

        let args = self.ffmpeg_args();
        log_debug!("spawning {} {}", self.config.ffmpeg_path, args.join(" "));
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                Error::SourceUnavailable(format!(
                    "ffmpeg spawn failed for {}: {err}",
                    self.input.describe()
                ))
            })?;
        let stdout = child.stdout.take();
        if !self.child.install(child) {
            return Err(Error::SourceUnavailable(format!(
                "opening {} was interrupted",
                self.input.describe()
            )));
        }
        self.stdout = stdout;
        self.next_index = 0;

        // Confirm the input actually produces frames before reporting success.
        match self.read_frame() {
            Ok(Some(frame)) => {
                self.pending = Some(frame);
                Ok(())
            }
            Ok(None) => {
                self.close();
                Err(Error::SourceUnavailable(format!(
                    "no frames decoded from {}",
                    self.input.describe()
                )))
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    fn read(&mut self) -> Result<Option<(DomainSample, f64)>> {
        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None => self.read_frame()?,
        };
        Ok(frame.map(|frame| {
            let ts = self.timestamp(&frame);
            (DomainSample::Frame(frame), ts)
        }))
    }

    fn close(&mut self) {
        self.stdout = None;
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                if err.kind() != io::ErrorKind::InvalidInput {
                    log_warn!("failed to kill ffmpeg for {}: {err}", self.input.describe());
                }
            }
            let _ = child.wait();
        }
    }

    fn interrupter(&self) -> Option<Arc<dyn ReadInterrupt>> {
        let handle: Arc<dyn ReadInterrupt> = self.child.clone();
        Some(handle)
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        super::SourceAdapter::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceAdapter;

    fn config() -> VideoConfig {
        VideoConfig {
            ffmpeg_path: "ffmpeg".into(),
            width: 320,
            height: 180,
            fps: 10,
            io_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_realtime_file_reads_at_native_rate() {
        let source = VideoSource::new(
            VideoInput::File {
                path: PathBuf::from("/videos/match.mp4"),
                realtime: true,
            },
            config(),
        );
        let args = source.ffmpeg_args();
        let re = args.iter().position(|a| a == "-re").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(re < input);
        assert!(args.contains(&"fps=10,scale=320:180".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_rtsp_gets_tcp_transport_and_buffer_hint() {
        let source = VideoSource::new(
            VideoInput::Network {
                url: "rtsp://cam.local/stream".into(),
                buffer_ms: 300,
            },
            config(),
        );
        let args = source.ffmpeg_args();
        assert!(args.windows(2).any(|w| w[0] == "-rtsp_transport" && w[1] == "tcp"));
        assert!(args.windows(2).any(|w| w[0] == "-max_delay" && w[1] == "300000"));
        assert!(args.windows(2).any(|w| w[0] == "-timeout" && w[1] == "5000000"));
        let timeout = args.iter().position(|a| a == "-timeout").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(timeout < input);
    }

    #[test]
    fn test_http_stream_gets_read_timeout() {
        let source = VideoSource::new(
            VideoInput::Network {
                url: "http://cam.local/live.ts".into(),
                buffer_ms: 0,
            },
            config(),
        );
        let args = source.ffmpeg_args();
        assert!(args.windows(2).any(|w| w[0] == "-rw_timeout" && w[1] == "5000000"));
        assert!(!args.contains(&"-rtsp_transport".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_unblocks_a_stalled_read() {
        use std::{thread, time::Instant};

        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let mut stdout = child.stdout.take().unwrap();
        let slot = Arc::new(ChildSlot::default());
        assert!(slot.install(child));

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 16];
            stdout.read_exact(&mut buf)
        });
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        slot.interrupt();
        let err = reader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(started.elapsed() < Duration::from_secs(10));

        let mut child = slot.take().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_child_spawned_after_interrupt_is_not_kept() {
        let slot = ChildSlot::default();
        slot.interrupt();
        let child = Command::new("sleep").arg("30").spawn();
        if let Ok(child) = child {
            assert!(!slot.install(child));
            assert!(slot.take().is_none());
        }
    }

    #[test]
    fn test_missing_file_fails_open() {
        let mut source = VideoSource::new(
            VideoInput::File {
                path: PathBuf::new(),
                realtime: false,
            },
            config(),
        );
        assert!(matches!(source.open(), Err(Error::SourceUnavailable(_))));
        source.close();
    }

    #[test]
    fn test_unknown_binary_fails_open() {
        let mut source = VideoSource::new(
            VideoInput::Network {
                url: "http://127.0.0.1:9/stream".into(),
                buffer_ms: 0,
            },
            VideoConfig {
                ffmpeg_path: "/nonexistent/ffmpeg-binary".into(),
                ..config()
            },
        );
        assert!(matches!(source.open(), Err(Error::SourceUnavailable(_))));
    }
}
