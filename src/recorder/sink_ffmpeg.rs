// src/recorder/sink_ffmpeg.rs
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::recorder::{SegmentEncoder, SegmentSink};
use crate::ring::Frame;

/// Re-encodes the JPEG feed to H.264/MP4 through an ffmpeg child process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: String,
    fps: u32,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: &str, fps: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            fps: fps.max(1),
        }
    }

    fn args(&self, path: &Path) -> Vec<String> {
        let rate = self.fps.to_string();
        [
            "-loglevel",
            "error",
            "-y",
            "-f",
            "mjpeg",
            "-framerate",
            rate.as_str(),
            "-i",
            "pipe:0",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().into_owned()))
        .collect()
    }
}

impl SegmentEncoder for FfmpegEncoder {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn SegmentSink>> {
        log::debug!("[ffmpeg_sink] ffmpeg → {}", path.display());

        let mut child = Command::new(&self.ffmpeg)
            .args(self.args(path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg stdin not captured"))?;

        Ok(Box::new(FfmpegSink {
            path: path.to_path_buf(),
            child,
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl SegmentSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => Ok(stdin.write_all(&frame.data)?),
            None => anyhow::bail!("ffmpeg input already closed"),
        }
    }

    fn finish(mut self: Box<Self>) -> anyhow::Result<()> {
        // EOF on stdin lets ffmpeg write the moov atom.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            anyhow::bail!("ffmpeg failed for {} ({})", self.path.display(), status);
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
