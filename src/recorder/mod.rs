// src/recorder/mod.rs

use std::path::Path;

use chrono::NaiveDate;

use crate::ring::Frame;

pub use config::RecorderConfig;

/// Turns frames into one on-disk segment file.
pub trait SegmentEncoder: Send + Sync {
    /// File extension of produced segments, without the dot.
    fn extension(&self) -> &str;
    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn SegmentSink>>;
}

/// One open segment. `finish` must flush everything the file needs to be
/// playable.
pub trait SegmentSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()>;
    fn finish(self: Box<Self>) -> anyhow::Result<()>;
}

pub trait RetentionPolicy: Send {
    fn run(&mut self, today: NaiveDate) -> anyhow::Result<SweepReport>;
}

pub mod catalog;
pub mod config;
pub mod organize;
pub mod recorder;
pub mod retention_fs;
pub mod segment;
pub mod sink_ffmpeg;
pub mod sink_mjpeg;
pub mod space;

pub use catalog::{Catalog, RecordingEntry, RecordingGroup, list_recordings};
pub use organize::{OrganizeReport, organize_loose_recordings};
pub use recorder::{RecorderState, RecorderStatus, SegmentRecorder, StopReason};
pub use retention_fs::{
    DirRemover, FsRetention, RetentionScheduler, SweepFailure, SweepReport,
};
pub use segment::{RecordingSegment, SegmentStatus, TimecodeSidecar, segment_path};
pub use sink_ffmpeg::FfmpegEncoder;
pub use sink_mjpeg::MjpegEncoder;
pub use space::{SpaceProbe, StatvfsProbe};
