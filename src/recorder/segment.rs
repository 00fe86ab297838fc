// src/recorder/segment.rs

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::timestamp::{SEGMENT_STAMP_FORMAT, date_dir_name};

pub const SEGMENT_PREFIX: &str = "recording_";
pub const SIDECAR_EXTENSION: &str = "pts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Active,
    Closed,
    /// Left on disk as-is after a failed close; never repaired.
    Abandoned,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingSegment {
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub target_secs: f64,
    pub status: SegmentStatus,
    pub frames: u64,
}

impl RecordingSegment {
    pub fn new(path: PathBuf, started_at: DateTime<Local>, target_secs: f64) -> Self {
        Self {
            path,
            started_at,
            target_secs,
            status: SegmentStatus::Active,
            frames: 0,
        }
    }
}

/// `<root>/<YYYY-MM-DD>/recording_YYYYMMDD_HHMMSS.<ext>`, creating the day
/// directory on first use. Two segments started within the same second get
/// `_1`, `_2`, ... suffixes instead of clobbering each other.
pub fn segment_path(root: &Path, at: &DateTime<Local>, extension: &str) -> io::Result<PathBuf> {
    let day_dir = root.join(date_dir_name(at));
    fs::create_dir_all(&day_dir)?;

    let stem = format!("{}{}", SEGMENT_PREFIX, at.format(SEGMENT_STAMP_FORMAT));
    let mut candidate = day_dir.join(format!("{}.{}", stem, extension));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = day_dir.join(format!("{}_{}.{}", stem, n, extension));
        n += 1;
    }
    Ok(candidate)
}

pub fn sidecar_path(segment: &Path) -> PathBuf {
    let mut name = segment.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

/// Per-frame presentation times next to a segment, in mkvmerge timecode v2
/// format. Only kept around when the segment could not be closed cleanly.
pub struct TimecodeSidecar {
    path: PathBuf,
    writer: BufWriter<File>,
    first_ns: Option<u64>,
}

impl TimecodeSidecar {
    pub fn create(segment: &Path) -> io::Result<Self> {
        let path = sidecar_path(segment);
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "# timecode format v2")?;
        Ok(Self {
            path,
            writer,
            first_ns: None,
        })
    }

    pub fn record(&mut self, utc_ns: u64) -> io::Result<()> {
        let first = *self.first_ns.get_or_insert(utc_ns);
        let offset_ms = utc_ns.saturating_sub(first) as f64 / 1_000_000.0;
        writeln!(self.writer, "{:.3}", offset_ms)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes what was written so far so an abandoned segment keeps it.
    pub fn keep(mut self) -> io::Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }

    /// Cleanup failures are not worth reporting beyond a debug line.
    pub fn remove(self) {
        let path = self.path;
        drop(self.writer);
        if let Err(e) = fs::remove_file(&path) {
            log::debug!("[recorder] sidecar {} not removed: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_layout_and_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 10, 19, 13, 5, 9).unwrap();

        let first = segment_path(dir.path(), &at, "mjpeg").unwrap();
        assert_eq!(
            first,
            dir.path()
                .join("2025-10-19")
                .join("recording_20251019_130509.mjpeg")
        );
        fs::write(&first, b"x").unwrap();

        let second = segment_path(dir.path(), &at, "mjpeg").unwrap();
        assert_eq!(
            second.file_name().unwrap(),
            "recording_20251019_130509_1.mjpeg"
        );
    }

    #[test]
    fn sidecar_appends_extension() {
        let p = sidecar_path(Path::new("/r/2025-10-19/recording_x.mp4"));
        assert_eq!(p, PathBuf::from("/r/2025-10-19/recording_x.mp4.pts"));
    }

    #[test]
    fn sidecar_records_offsets_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("recording_a.mjpeg");

        let mut sidecar = TimecodeSidecar::create(&segment).unwrap();
        sidecar.record(5_000_000_000).unwrap();
        sidecar.record(5_100_000_000).unwrap();
        let kept = sidecar.keep().unwrap();

        let text = fs::read_to_string(&kept).unwrap();
        assert_eq!(text, "# timecode format v2\n0.000\n100.000\n");

        let sidecar = TimecodeSidecar::create(&segment).unwrap();
        let path = sidecar.path().to_path_buf();
        sidecar.remove();
        assert!(!path.exists());
    }
}
