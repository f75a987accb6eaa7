use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use super::EvidenceError;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_warn};

/// Raw pixel layout of frames piped into the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray,
    Rgb24,
}

impl PixelFormat {
    fn as_arg(&self) -> &'static str {
        match self {
            PixelFormat::Gray => "gray",
            PixelFormat::Rgb24 => "rgb24",
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgb24 => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegTool {
    binary: String,
    codec: String,
    font: Option<PathBuf>,
}

impl FfmpegTool {
    pub fn new(binary: impl Into<String>, codec: impl Into<String>, font: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            codec: codec.into(),
            font,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"]);
        cmd
    }

    fn finish(step: &'static str, output: Output, out: &Path) -> Result<(), EvidenceError> {
        if !output.status.success() {
            return Err(EvidenceError::Ffmpeg {
                step,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        match std::fs::metadata(out) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(EvidenceError::EmptyOutput(out.to_path_buf())),
        }
    }

    /// Encodes raw frames (each exactly `width * height * bpp` bytes) into an mp4.
    pub fn encode_frames<I>(
        &self,
        frames: I,
        format: PixelFormat,
        (width, height): (u32, u32),
        fps: u32,
        out: &Path,
    ) -> Result<(), EvidenceError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let frame_len = width as usize * height as usize * format.bytes_per_pixel();
        let mut child = self
            .command()
            .args(["-f", "rawvideo", "-pix_fmt", format.as_arg()])
            .args(["-s", &format!("{width}x{height}")])
            .args(["-r", &fps.max(1).to_string()])
            .args(["-i", "pipe:0", "-an", "-c:v", &self.codec, "-pix_fmt", "yuv420p"])
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EvidenceError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let mut written = 0usize;
        if let Some(mut stdin) = child.stdin.take() {
            for frame in frames {
                let frame = frame.as_ref();
                if frame.len() != frame_len {
                    log_warn!("skipping frame of {} bytes, expected {}", frame.len(), frame_len);
                    continue;
                }
                if let Err(err) = stdin.write_all(frame) {
                    log_warn!("ffmpeg closed its input early: {err}");
                    break;
                }
                written += 1;
            }
        }

        let output = child.wait_with_output().map_err(|source| EvidenceError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        if written == 0 {
            return Err(EvidenceError::NoFrames);
        }
        log_debug!("encoded {} frames into {}", written, out.display());
        Self::finish("encode", output, out)
    }

    /// Cuts `[start, start + duration]` from `src`, stream-copying when the container
    /// allows it and re-encoding otherwise.
    pub fn trim(&self, src: &Path, start: f64, duration: f64, out: &Path) -> Result<(), EvidenceError> {
        let run = |copy: bool| -> Result<(), EvidenceError> {
            let mut cmd = self.command();
            cmd.args(["-ss", &format!("{start:.3}")])
                .arg("-i")
                .arg(src)
                .args(["-t", &format!("{duration:.3}")]);
            if copy {
                cmd.args(["-c", "copy", "-avoid_negative_ts", "make_zero"]);
            } else {
                cmd.args(["-an", "-c:v", &self.codec, "-pix_fmt", "yuv420p"]);
            }
            let output = cmd
                .arg(out)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .map_err(|source| EvidenceError::Spawn {
                    binary: self.binary.clone(),
                    source,
                })?;
            Self::finish(if copy { "trim" } else { "re-encode" }, output, out)
        };

        match run(true) {
            Ok(()) => Ok(()),
            Err(EvidenceError::Spawn { binary, source }) => Err(EvidenceError::Spawn { binary, source }),
            Err(err) => {
                log_warn!("stream copy of {} failed ({err}), re-encoding", src.display());
                let _ = std::fs::remove_file(out);
                run(false)
            }
        }
    }

    /// Burns multi-line `text` into the top-left corner of `base`, writing a PNG to `out`.
    pub fn burn_text(&self, base: &Path, text_file: &Path, out: &Path) -> Result<(), EvidenceError> {
        let mut filter = format!(
            "drawtext=textfile='{}':fontcolor=white:fontsize=22:line_spacing=8:x=20:y=20:box=1:boxcolor=black@0.5:boxborderw=8",
            escape_filter_path(text_file)
        );
        if let Some(font) = &self.font {
            filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
        }

        let output = self
            .command()
            .arg("-i")
            .arg(base)
            .args(["-vf", &filter, "-frames:v", "1", "-update", "1"])
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| EvidenceError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        Self::finish("overlay", output, out)
    }
}

/// Quotes a path for use inside a single-quoted filtergraph option value.
fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_filter_paths() {
        assert_eq!(
            escape_filter_path(Path::new("/tmp/it's:here.txt")),
            "/tmp/it'\\''s\\:here.txt"
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FfmpegTool::new("/nonexistent/ffmpeg", "mpeg4", None);
        let frame = vec![0u8; 4 * 4];
        let err = tool
            .encode_frames([frame.as_slice()], PixelFormat::Gray, (4, 4), 10, &dir.path().join("a.mp4"))
            .unwrap_err();
        assert!(matches!(err, EvidenceError::Spawn { .. }));
    }
}
