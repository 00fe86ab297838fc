// src/producers/command.rs
//
// Frames from an external capture program writing MJPEG to stdout, e.g.
// `rpicam-vid -t 0 --codec mjpeg -o -` or an ffmpeg v4l2 pipeline.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use bytes::Bytes;
use log::{info, warn};

use crate::core::error::{CamError, CamResult};
use crate::producers::FrameSource;

const READ_CHUNK: usize = 64 * 1024;
/// A frame that never terminates within this many bytes is garbage.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

pub struct CommandSource {
    name: String,
    child: Child,
    stdout: ChildStdout,
    splitter: JpegSplitter,
    chunk: Vec<u8>,
}

impl CommandSource {
    pub fn spawn(name: &str, argv: &[String]) -> CamResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CamError::camera_init("empty capture command"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CamError::camera_init(format!("spawn {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CamError::camera_init(format!("{}: no stdout", program)))?;

        info!("[capture] {} spawned pid={}", program, child.id());

        Ok(Self {
            name: name.to_string(),
            child,
            stdout,
            splitter: JpegSplitter::default(),
            chunk: vec![0u8; READ_CHUNK],
        })
    }
}

impl FrameSource for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> anyhow::Result<Bytes> {
        loop {
            if let Some(frame) = self.splitter.next_frame() {
                return Ok(Bytes::from(frame));
            }

            let n = self.stdout.read(&mut self.chunk)?;
            if n == 0 {
                anyhow::bail!("capture command for '{}' closed its output", self.name);
            }
            self.splitter.push(&self.chunk[..n]);
        }
    }

    fn self_paced(&self) -> bool {
        true
    }
}

impl Drop for CommandSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("[capture] kill '{}' failed: {}", self.name, e);
        }
        let _ = self.child.wait();
    }
}

/// Cuts a byte stream into JPEG images on SOI/EOI markers.
#[derive(Default)]
pub struct JpegSplitter {
    buf: Vec<u8>,
}

impl JpegSplitter {
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_FRAME_BYTES {
            warn!("[capture] dropping {} bytes without a frame end", self.buf.len());
            self.buf.clear();
        }
    }

    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buf, 0, 0xD8) else {
            // Keep a trailing 0xFF, it may be the first half of the next SOI.
            let cut = self.buf.len().saturating_sub(1);
            self.buf.drain(..cut);
            return None;
        };
        if start > 0 {
            self.buf.drain(..start);
        }
        let end = find_marker(&self.buf, 2, 0xD9)?;
        Some(self.buf.drain(..end + 2).collect())
    }
}

fn find_marker(buf: &[u8], from: usize, marker: u8) -> Option<usize> {
    if buf.len() < 2 || from > buf.len() - 2 {
        return None;
    }
    (from..buf.len() - 1).find(|&i| buf[i] == 0xFF && buf[i + 1] == marker)
}
