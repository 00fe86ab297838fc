// src/recorder/organize.rs
//
// Older installs wrote every segment straight into the recordings root.
// This moves such loose files into their day directory so retention and
// the catalog see them.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::core::timestamp::DATE_DIR_FORMAT;
use crate::recorder::segment::SEGMENT_PREFIX;

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct OrganizeReport {
    pub moved: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Day a segment belongs to, from `recording_YYYYMMDD_...`.
pub fn segment_date(file_name: &str) -> Option<NaiveDate> {
    let rest = file_name.strip_prefix(SEGMENT_PREFIX)?;
    let (stamp, tail) = rest.split_at_checked(8)?;
    if !tail.starts_with('_') || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

pub fn organize_loose_recordings(root: &Path) -> anyhow::Result<OrganizeReport> {
    let mut report = OrganizeReport::default();

    for entry in fs::read_dir(root)?.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(segment_date) else {
            report.skipped += 1;
            continue;
        };

        let day_dir = root.join(date.format(DATE_DIR_FORMAT).to_string());
        let target = day_dir.join(&name);
        let moved = fs::create_dir_all(&day_dir).and_then(|_| fs::rename(entry.path(), &target));

        match moved {
            Ok(()) => {
                info!("[organize] {} -> {}", name.to_string_lossy(), day_dir.display());
                report.moved += 1;
            }
            Err(e) => {
                warn!("[organize] {} not moved: {}", name.to_string_lossy(), e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
