// src/recorder/recorder.rs
//
// Stopped <-> Recording. While recording, a dedicated thread rotates the
// output file every `segment_duration`: check free space, open a segment,
// feed it every frame the buffer publishes until the deadline, close it,
// repeat. Low disk space ends the loop; only `start()` brings it back.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::core::lock::lock_mutex;
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::wait::StopSignal;
use crate::recorder::segment::{RecordingSegment, SegmentStatus, TimecodeSidecar, segment_path};
use crate::recorder::{RecorderConfig, SegmentEncoder, SegmentSink, SpaceProbe};
use crate::ring::{FrameBuffer, FrameToken, FrameWait};

/// Upper bound on how long `stop()` waits for a blocked frame read.
const STOP_POLL: Duration = Duration::from_millis(50);
const CLOSED_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Stopped,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    DiskFull { free: u64, floor: u64 },
    SpaceCheckFailed { message: String },
    EncoderFailed { message: String },
    SourceClosed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub segments_completed: u64,
    pub segments_abandoned: u64,
    pub active: Option<RecordingSegment>,
    pub last_stop: Option<StopReason>,
}

struct Shared {
    state: RecorderState,
    active: Option<RecordingSegment>,
    closed: VecDeque<RecordingSegment>,
    completed: u64,
    abandoned: u64,
    last_stop: Option<StopReason>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RecorderState::Stopped,
            active: None,
            closed: VecDeque::new(),
            completed: 0,
            abandoned: 0,
            last_stop: None,
        }
    }
}

struct Run {
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

pub struct SegmentRecorder {
    name: String,
    cfg: RecorderConfig,
    buffer: Arc<FrameBuffer>,
    encoder: Arc<dyn SegmentEncoder>,
    probe: Arc<dyn SpaceProbe>,
    shared: Arc<Mutex<Shared>>,
    run: Mutex<Option<Run>>,
}

impl SegmentRecorder {
    pub fn new(
        name: &str,
        cfg: RecorderConfig,
        buffer: Arc<FrameBuffer>,
        encoder: Arc<dyn SegmentEncoder>,
        probe: Arc<dyn SpaceProbe>,
    ) -> Self {
        Self {
            name: name.to_string(),
            cfg,
            buffer,
            encoder,
            probe,
            shared: Arc::new(Mutex::new(Shared::new())),
            run: Mutex::new(None),
        }
    }

    /// `Stopped -> Recording`. A no-op while already recording.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut run = lock_mutex(&self.run, "SegmentRecorder::start");

        {
            let mut shared = lock_mutex(&self.shared, "SegmentRecorder::start");
            if shared.state == RecorderState::Recording {
                return Ok(());
            }
            shared.state = RecorderState::Recording;
            shared.last_stop = None;
        }

        // A loop that ended on its own (disk guard) is still joinable.
        if let Some(old) = run.take() {
            if old.handle.join().is_err() {
                self.error("previous rotation thread panicked");
            }
        }

        let spawned = fs::create_dir_all(&self.cfg.root)
            .map_err(anyhow::Error::from)
            .and_then(|_| self.spawn_loop());

        match spawned {
            Ok(new_run) => {
                *run = Some(new_run);
                self.info(&format!(
                    "recording to {} every {:?}",
                    self.cfg.root.display(),
                    self.cfg.segment_duration
                ));
                Ok(())
            }
            Err(e) => {
                let mut shared = lock_mutex(&self.shared, "SegmentRecorder::start");
                shared.state = RecorderState::Stopped;
                shared.last_stop = Some(StopReason::EncoderFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Blocks until the rotation thread has closed its segment and exited.
    /// Safe to call when never started.
    pub fn stop(&self) {
        let mut run = lock_mutex(&self.run, "SegmentRecorder::stop");

        {
            let mut shared = lock_mutex(&self.shared, "SegmentRecorder::stop");
            if shared.state == RecorderState::Recording {
                shared.state = RecorderState::Stopped;
                shared.last_stop = Some(StopReason::Requested);
            }
        }

        if let Some(r) = run.take() {
            r.stop.stop();
            if r.handle.join().is_err() {
                self.error("rotation thread panicked");
            }
            self.info("stopped");
        }
    }

    pub fn state(&self) -> RecorderState {
        lock_mutex(&self.shared, "SegmentRecorder::state").state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    pub fn status(&self) -> RecorderStatus {
        let shared = lock_mutex(&self.shared, "SegmentRecorder::status");
        RecorderStatus {
            state: shared.state,
            segments_completed: shared.completed,
            segments_abandoned: shared.abandoned,
            active: shared.active.clone(),
            last_stop: shared.last_stop.clone(),
        }
    }

    /// Most recent closed or abandoned segments, oldest first.
    pub fn closed_segments(&self) -> Vec<RecordingSegment> {
        lock_mutex(&self.shared, "SegmentRecorder::closed_segments")
            .closed
            .iter()
            .cloned()
            .collect()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.cfg
    }

    fn spawn_loop(&self) -> anyhow::Result<Run> {
        let stop = Arc::new(StopSignal::new());
        let rotation = Rotation {
            name: self.name.clone(),
            cfg: self.cfg.clone(),
            buffer: self.buffer.clone(),
            encoder: self.encoder.clone(),
            probe: self.probe.clone(),
            shared: self.shared.clone(),
            stop: stop.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("recorder-{}", self.name))
            .spawn(move || rotation.run())?;

        Ok(Run { stop, handle })
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ComponentLogger for SegmentRecorder {
    fn log_context(&self) -> LogContext {
        LogContext::new("recorder", &self.name)
    }
}

enum SegmentEnd {
    Elapsed,
    Stopped,
    SourceClosed,
    WriteFailed(String),
}

struct Rotation {
    name: String,
    cfg: RecorderConfig,
    buffer: Arc<FrameBuffer>,
    encoder: Arc<dyn SegmentEncoder>,
    probe: Arc<dyn SpaceProbe>,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<StopSignal>,
}

impl Rotation {
    fn run(self) {
        info!("[recorder] '{}' rotation loop started", self.name);
        // Only frames published from now on go into segments.
        let mut token = self.buffer.head();

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Requested;
            }

            if let Some(reason) = self.check_space() {
                break reason;
            }

            let started_at = Local::now();
            let path = match segment_path(&self.cfg.root, &started_at, self.encoder.extension()) {
                Ok(p) => p,
                Err(e) => {
                    error!("[recorder] '{}' cannot prepare segment path: {}", self.name, e);
                    break StopReason::EncoderFailed {
                        message: e.to_string(),
                    };
                }
            };

            let sink = match self.encoder.open(&path) {
                Ok(sink) => sink,
                Err(e) => {
                    error!("[recorder] '{}' open {} failed: {}", self.name, path.display(), e);
                    break StopReason::EncoderFailed {
                        message: e.to_string(),
                    };
                }
            };

            let sidecar = match TimecodeSidecar::create(&path) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("[recorder] '{}' no timecode sidecar: {}", self.name, e);
                    None
                }
            };

            let segment = RecordingSegment::new(
                path,
                started_at,
                self.cfg.segment_duration.as_secs_f64(),
            );
            info!("[recorder] '{}' segment {}", self.name, segment.path.display());
            lock_mutex(&self.shared, "Rotation::open").active = Some(segment.clone());

            let (end, frames, sink, sidecar) = self.fill(sink, sidecar, &mut token);
            let exit = match end {
                SegmentEnd::Elapsed => None,
                SegmentEnd::Stopped => Some(StopReason::Requested),
                SegmentEnd::SourceClosed => Some(StopReason::SourceClosed),
                SegmentEnd::WriteFailed(message) => Some(StopReason::EncoderFailed { message }),
            };

            match exit {
                None => self.close(segment, frames, sink, sidecar),
                Some(reason) => {
                    // Stopped before the sink is finalised, which can take a while.
                    self.finish(reason);
                    self.close(segment, frames, sink, sidecar);
                    return;
                }
            }
        };

        self.finish(reason);
    }

    /// `None` when there is room for another segment.
    fn check_space(&self) -> Option<StopReason> {
        let floor = self.cfg.min_free_bytes;
        match self.probe.free_bytes(&self.cfg.root) {
            Ok(free) if free < floor => {
                warn!(
                    "[recorder] '{}' only {} bytes free (floor {}), stopping",
                    self.name, free, floor
                );
                Some(StopReason::DiskFull { free, floor })
            }
            Ok(free) => {
                debug!("[recorder] '{}' {} bytes free", self.name, free);
                None
            }
            Err(e) => {
                error!("[recorder] '{}' free space check failed: {}", self.name, e);
                Some(StopReason::SpaceCheckFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Writes every frame published before the segment deadline.
    fn fill(
        &self,
        mut sink: Box<dyn SegmentSink>,
        mut sidecar: Option<TimecodeSidecar>,
        token: &mut FrameToken,
    ) -> (SegmentEnd, u64, Box<dyn SegmentSink>, Option<TimecodeSidecar>) {
        let deadline = Instant::now() + self.cfg.segment_duration;
        let mut frames = 0u64;

        let end = loop {
            if self.stop.is_stopped() {
                break SegmentEnd::Stopped;
            }
            let now = Instant::now();
            if now >= deadline {
                break SegmentEnd::Elapsed;
            }

            match self.buffer.await_next_timeout(*token, (deadline - now).min(STOP_POLL)) {
                FrameWait::Ready(frame, next) => {
                    *token = next;
                    if let Err(e) = sink.write_frame(&frame) {
                        error!("[recorder] '{}' write failed: {}", self.name, e);
                        break SegmentEnd::WriteFailed(e.to_string());
                    }
                    if let Some(s) = sidecar.as_mut() {
                        if let Err(e) = s.record(frame.utc_ns) {
                            warn!("[recorder] '{}' timecode write failed: {}", self.name, e);
                            sidecar = None;
                        }
                    }
                    frames += 1;
                }
                FrameWait::TimedOut => {}
                FrameWait::Closed => break SegmentEnd::SourceClosed,
            }
        };

        (end, frames, sink, sidecar)
    }

    fn close(
        &self,
        mut segment: RecordingSegment,
        frames: u64,
        sink: Box<dyn SegmentSink>,
        sidecar: Option<TimecodeSidecar>,
    ) {
        segment.frames = frames;
        match sink.finish() {
            Ok(()) => {
                segment.status = SegmentStatus::Closed;
                if let Some(s) = sidecar {
                    s.remove();
                }
                info!(
                    "[recorder] '{}' closed {} ({} frames)",
                    self.name,
                    display_name(&segment.path),
                    frames
                );
            }
            Err(e) => {
                segment.status = SegmentStatus::Abandoned;
                if let Some(s) = sidecar {
                    let _ = s.keep();
                }
                error!(
                    "[recorder] '{}' abandoned {}: {}",
                    self.name,
                    display_name(&segment.path),
                    e
                );
            }
        }

        let mut shared = lock_mutex(&self.shared, "Rotation::close");
        shared.active = None;
        match segment.status {
            SegmentStatus::Closed => shared.completed += 1,
            _ => shared.abandoned += 1,
        }
        if shared.closed.len() == CLOSED_HISTORY {
            shared.closed.pop_front();
        }
        shared.closed.push_back(segment);
    }

    fn finish(&self, reason: StopReason) {
        let mut shared = lock_mutex(&self.shared, "Rotation::finish");
        shared.state = RecorderState::Stopped;
        shared.active = None;
        info!("[recorder] '{}' rotation loop stopping: {:?}", self.name, reason);
        shared.last_stop = Some(reason);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
