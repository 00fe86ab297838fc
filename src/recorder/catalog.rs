// src/recorder/catalog.rs
//
// Listing of everything under the recordings root, newest first, plus the
// same list bucketed into hour-long windows for the browser.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::Serialize;

use crate::core::timestamp::{OVERLAY_FORMAT, parse_date_dir};

/// Extensions written by the encoders. Everything else in the tree is skipped.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mjpeg", "mjpg", "h264"];

#[derive(Debug, Clone, Serialize)]
pub struct RecordingEntry {
    pub name: String,
    /// Path below the root using `/`, as accepted by `/download/`.
    pub path: String,
    pub size_bytes: u64,
    pub size: String,
    pub date: String,
    #[serde(skip)]
    pub modified: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingGroup {
    pub label: String,
    pub videos: Vec<RecordingEntry>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Catalog {
    pub videos: Vec<RecordingEntry>,
    pub groups: Vec<RecordingGroup>,
}

pub fn list_recordings(root: &Path) -> anyhow::Result<Catalog> {
    let mut videos = Vec::new();
    collect_files(root, None, &mut videos)?;

    for entry in fs::read_dir(root)?.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        let Some(day) = name.to_str() else { continue };
        if is_dir && parse_date_dir(day).is_some() {
            collect_files(&entry.path(), Some(day), &mut videos)?;
        }
    }

    videos.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    let groups = group_by_hour(&videos);
    Ok(Catalog { videos, groups })
}

fn is_video(name: &str) -> bool {
    !name.starts_with('.')
        && Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn collect_files(
    dir: &Path,
    day: Option<&str>,
    out: &mut Vec<RecordingEntry>,
) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)?.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_video(&name) {
            continue;
        }

        let modified: DateTime<Local> = match meta.modified() {
            Ok(t) => t.into(),
            Err(_) => continue,
        };
        let path = match day {
            Some(d) => format!("{}/{}", d, name),
            None => name.clone(),
        };

        out.push(RecordingEntry {
            size: format!("{:.1} MB", meta.len() as f64 / (1024.0 * 1024.0)),
            size_bytes: meta.len(),
            date: modified.format(OVERLAY_FORMAT).to_string(),
            name,
            path,
            modified,
        });
    }
    Ok(())
}

/// Buckets an already newest-first list into `"YYYY-MM-DD, 01 PM – 02 PM"`
/// windows, newest window first.
pub fn group_by_hour(videos: &[RecordingEntry]) -> Vec<RecordingGroup> {
    let mut groups: Vec<((NaiveDate, u32), RecordingGroup)> = Vec::new();

    for v in videos {
        let key = (v.modified.date_naive(), v.modified.hour());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.videos.push(v.clone()),
            None => groups.push((
                key,
                RecordingGroup {
                    label: hour_label(&v.modified),
                    videos: vec![v.clone()],
                },
            )),
        }
    }

    groups.sort_by(|a, b| b.0.cmp(&a.0));
    groups.into_iter().map(|(_, g)| g).collect()
}

fn hour_label(at: &DateTime<Local>) -> String {
    let start = at.format("%Y-%m-%d, %I %p");
    let end_hour = (at.hour() + 1) % 24;
    let end = match at.date_naive().and_hms_opt(end_hour, 0, 0) {
        Some(t) => t.format("%I %p").to_string(),
        None => String::new(),
    };
    format!("{} – {}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, at: DateTime<Local>) -> RecordingEntry {
        RecordingEntry {
            name: name.into(),
            path: name.into(),
            size_bytes: 0,
            size: "0.0 MB".into(),
            date: at.format(OVERLAY_FORMAT).to_string(),
            modified: at,
        }
    }

    #[test]
    fn hour_label_format() {
        let at = Local.with_ymd_and_hms(2025, 10, 19, 13, 20, 0).unwrap();
        assert_eq!(hour_label(&at), "2025-10-19, 01 PM – 02 PM");
        let late = Local.with_ymd_and_hms(2025, 10, 19, 23, 59, 0).unwrap();
        assert_eq!(hour_label(&late), "2025-10-19, 11 PM – 12 AM");
    }

    #[test]
    fn only_video_files_are_listed() {
        assert!(is_video("recording_20251019_130509.mp4"));
        assert!(is_video("recording_20251019_130509.MJPEG"));
        assert!(is_video("clip.h264"));
        assert!(!is_video("recording_20251019_130509.mp4.pts"));
        assert!(!is_video("notes.txt"));
        assert!(!is_video(".recording_20251019_130509.mp4"));
        assert!(!is_video("README"));
    }

    #[test]
    fn groups_are_newest_first() {
        let videos = vec![
            entry("c", Local.with_ymd_and_hms(2025, 10, 19, 14, 5, 0).unwrap()),
            entry("b", Local.with_ymd_and_hms(2025, 10, 19, 13, 50, 0).unwrap()),
            entry("a", Local.with_ymd_and_hms(2025, 10, 19, 13, 10, 0).unwrap()),
        ];
        let groups = group_by_hour(&videos);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].videos.len(), 1);
        assert_eq!(groups[1].videos.len(), 2);
        assert!(groups[1].label.starts_with("2025-10-19, 01 PM"));
    }

    #[test]
    fn lists_day_dirs_and_loose_videos_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("2025-10-19")).unwrap();
        fs::write(root.join("2025-10-19/recording_20251019_130509.mjpeg"), b"abc").unwrap();
        fs::write(root.join("2025-10-19/recording_20251019_130509.mjpeg.pts"), b"x").unwrap();
        fs::write(root.join("recording_20251018_100000.mp4"), b"x").unwrap();
        fs::write(root.join("2025-10-19/notes.txt"), b"x").unwrap();
        fs::write(root.join("2025-10-19/.recording_20251019_140000.mp4"), b"x").unwrap();
        fs::write(root.join("thumbs.db"), b"x").unwrap();
        fs::create_dir(root.join("misc")).unwrap();
        fs::write(root.join("misc/ignored.mp4"), b"x").unwrap();

        let catalog = list_recordings(root).unwrap();
        let mut paths: Vec<_> = catalog.videos.iter().map(|v| v.path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "2025-10-19/recording_20251019_130509.mjpeg",
                "recording_20251018_100000.mp4"
            ]
        );
        let total: usize = catalog.groups.iter().map(|g| g.videos.len()).sum();
        assert_eq!(total, 2);
    }
}
