use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camcast_node::recorder::segment::sidecar_path;
use camcast_node::recorder::{
    MjpegEncoder, RecorderConfig, RecorderState, SegmentEncoder, SegmentRecorder, SegmentSink,
    SegmentStatus, SpaceProbe, StopReason,
};
use camcast_node::{Frame, FrameBuffer, StopSignal};

/// Reports whatever the test sets.
struct FakeDisk {
    free: AtomicU64,
}

impl FakeDisk {
    fn with(free: u64) -> Arc<Self> {
        Arc::new(Self {
            free: AtomicU64::new(free),
        })
    }
}

impl SpaceProbe for FakeDisk {
    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free.load(Ordering::SeqCst))
    }
}

struct Feeder {
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl Feeder {
    fn start(buffer: Arc<FrameBuffer>) -> Self {
        let stop = Arc::new(StopSignal::new());
        let handle = thread::spawn({
            let stop = stop.clone();
            move || {
                let mut n = 0u8;
                while !stop.wait_timeout(Duration::from_millis(20)) {
                    buffer.publish(Bytes::from(vec![0xFF, 0xD8, n, 0xFF, 0xD9]));
                    n = n.wrapping_add(1);
                }
            }
        });
        Self { stop, handle }
    }

    fn finish(self) {
        self.stop.stop();
        self.handle.join().unwrap();
    }
}

fn recorder(
    root: &Path,
    segment: Duration,
    floor: u64,
    disk: Arc<FakeDisk>,
) -> (SegmentRecorder, Arc<FrameBuffer>) {
    recorder_with(root, segment, floor, disk, Arc::new(MjpegEncoder))
}

fn recorder_with(
    root: &Path,
    segment: Duration,
    floor: u64,
    disk: Arc<FakeDisk>,
    encoder: Arc<dyn SegmentEncoder>,
) -> (SegmentRecorder, Arc<FrameBuffer>) {
    let buffer = Arc::new(FrameBuffer::new("rec"));
    let mut cfg = RecorderConfig::new(root);
    cfg.segment_duration = segment;
    cfg.min_free_bytes = floor;
    let rec = SegmentRecorder::new("rec", cfg, buffer.clone(), encoder, disk);
    (rec, buffer)
}

/// Accepts frames, then fails to finalise the file.
struct BrokenMuxer;

struct BrokenSink;

impl SegmentEncoder for BrokenMuxer {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn SegmentSink>> {
        fs::write(path, b"")?;
        Ok(Box::new(BrokenSink))
    }
}

impl SegmentSink for BrokenSink {
    fn write_frame(&mut self, _frame: &Frame) -> anyhow::Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<()> {
        anyhow::bail!("muxer exited with status 1")
    }
}

/// The first segment's `finish` blocks until the test releases it.
struct GatedEncoder {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

struct GatedSink {
    gate: Option<mpsc::Receiver<()>>,
}

impl SegmentEncoder for GatedEncoder {
    fn extension(&self) -> &str {
        "mjpeg"
    }

    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn SegmentSink>> {
        fs::write(path, b"")?;
        let gate = self.gate.lock().unwrap().take();
        Ok(Box::new(GatedSink { gate }))
    }
}

impl SegmentSink for GatedSink {
    fn write_frame(&mut self, _frame: &Frame) -> anyhow::Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<()> {
        if let Some(gate) = self.gate {
            let _ = gate.recv();
        }
        Ok(())
    }
}

fn files_below(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else { return out };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(files_below(&path));
        } else {
            out.push(path);
        }
    }
    out.sort();
    out
}

fn wait_for(mut cond: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_rotation_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FakeDisk::with(u64::MAX);
    let (rec, buffer) = recorder(dir.path(), Duration::from_millis(400), 1, disk);
    let feeder = Feeder::start(buffer.clone());

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(1000));

    let status = rec.status();
    assert_eq!(status.state, RecorderState::Recording);
    assert_eq!(status.segments_completed, 2);
    assert!(status.active.is_some());

    rec.stop();
    feeder.finish();

    let closed = rec.closed_segments();
    assert_eq!(closed.len(), 3);
    assert!(closed.iter().all(|s| s.status == SegmentStatus::Closed));
    assert!(closed.iter().all(|s| s.frames > 0));

    let files = files_below(dir.path());
    assert_eq!(files.len(), 3);
    for f in &files {
        let name = f.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("recording_"), "{}", name);
        assert!(name.ends_with(".mjpeg"), "{}", name);
        assert!(fs::metadata(f).unwrap().len() > 0);
    }
}

#[test]
fn test_low_disk_stops_until_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FakeDisk::with(10);
    let (rec, buffer) = recorder(dir.path(), Duration::from_millis(100), 1_000, disk.clone());
    let feeder = Feeder::start(buffer.clone());

    rec.start().unwrap();
    assert!(wait_for(|| rec.state() == RecorderState::Stopped, Duration::from_secs(2)));
    assert_eq!(
        rec.status().last_stop,
        Some(StopReason::DiskFull { free: 10, floor: 1_000 })
    );

    // Stays down even once space returns.
    disk.free.store(u64::MAX, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(250));
    assert_eq!(rec.state(), RecorderState::Stopped);
    assert!(files_below(dir.path()).is_empty());
    assert!(rec.closed_segments().is_empty());

    rec.start().unwrap();
    assert!(wait_for(|| rec.status().segments_completed >= 1, Duration::from_secs(2)));
    rec.stop();
    feeder.finish();

    assert!(!files_below(dir.path()).is_empty());
    assert_eq!(rec.status().last_stop, Some(StopReason::Requested));
}

#[test]
fn test_disk_filling_mid_run_closes_current_segment_first() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FakeDisk::with(u64::MAX);
    let (rec, buffer) = recorder(dir.path(), Duration::from_millis(150), 1_000, disk.clone());
    let feeder = Feeder::start(buffer.clone());

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    disk.free.store(0, Ordering::SeqCst);

    assert!(wait_for(|| rec.state() == RecorderState::Stopped, Duration::from_secs(2)));
    feeder.finish();

    let closed = rec.closed_segments();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status, SegmentStatus::Closed);
    assert!(matches!(rec.status().last_stop, Some(StopReason::DiskFull { .. })));
}

#[test]
fn test_closed_source_stops_recording() {
    let dir = tempfile::tempdir().unwrap();
    let (rec, buffer) = recorder(dir.path(), Duration::from_secs(60), 1, FakeDisk::with(u64::MAX));

    rec.start().unwrap();
    buffer.publish(Bytes::from_static(b"\xFF\xD8\xFF\xD9"));
    thread::sleep(Duration::from_millis(50));
    buffer.close();

    assert!(wait_for(|| rec.state() == RecorderState::Stopped, Duration::from_secs(2)));
    assert_eq!(rec.status().last_stop, Some(StopReason::SourceClosed));
    assert_eq!(rec.closed_segments().len(), 1);
}

#[test]
fn test_clean_close_removes_timecode_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let (rec, buffer) = recorder(dir.path(), Duration::from_secs(60), 1, FakeDisk::with(u64::MAX));
    let feeder = Feeder::start(buffer.clone());

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(120));
    rec.stop();
    feeder.finish();

    let files = files_below(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "mjpeg")));
}

#[test]
fn test_failed_finish_abandons_segment_and_keeps_timecodes() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FakeDisk::with(u64::MAX);
    let (rec, buffer) =
        recorder_with(dir.path(), Duration::from_secs(60), 1, disk, Arc::new(BrokenMuxer));
    let feeder = Feeder::start(buffer.clone());

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    rec.stop();
    feeder.finish();

    let status = rec.status();
    assert_eq!(status.segments_abandoned, 1);
    assert_eq!(status.segments_completed, 0);

    let closed = rec.closed_segments();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status, SegmentStatus::Abandoned);
    assert!(closed[0].frames > 0);

    let timecodes = sidecar_path(&closed[0].path);
    assert!(timecodes.exists());
    assert!(fs::read_to_string(&timecodes).unwrap().lines().count() > 1);
}

#[test]
fn test_state_is_stopped_while_last_segment_finalises() {
    let dir = tempfile::tempdir().unwrap();
    let (release, gate) = mpsc::channel();
    let encoder = Arc::new(GatedEncoder {
        gate: Mutex::new(Some(gate)),
    });
    let disk = FakeDisk::with(u64::MAX);
    let (rec, buffer) = recorder_with(dir.path(), Duration::from_secs(60), 1, disk, encoder);

    rec.start().unwrap();
    buffer.publish(Bytes::from_static(b"\xFF\xD8\xFF\xD9"));
    thread::sleep(Duration::from_millis(50));
    buffer.close();

    // The sink is still blocked in finish(), yet the recorder already
    // reports that it is no longer recording.
    assert!(wait_for(|| rec.state() == RecorderState::Stopped, Duration::from_secs(2)));
    assert_eq!(rec.status().last_stop, Some(StopReason::SourceClosed));
    assert!(rec.closed_segments().is_empty());

    release.send(()).unwrap();
    assert!(wait_for(|| rec.closed_segments().len() == 1, Duration::from_secs(2)));
    assert_eq!(rec.closed_segments()[0].status, SegmentStatus::Closed);
}
