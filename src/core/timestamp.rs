use chrono::{DateTime, Local, NaiveDate};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DATE_DIR_FORMAT: &str = "%Y-%m-%d";
pub const SEGMENT_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const OVERLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn utc_ns_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() * 1_000_000_000 + d.subsec_nanos() as u64)
        .unwrap_or(0)
}

/// Name of the daily bucket a moment belongs to.
pub fn date_dir_name(at: &DateTime<Local>) -> String {
    at.format(DATE_DIR_FORMAT).to_string()
}

/// Strict `YYYY-MM-DD`; anything else (including `2024-1-5`) is rejected.
pub fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    if name.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(name, DATE_DIR_FORMAT).ok()
}

pub fn overlay_label(at: &DateTime<Local>) -> String {
    at.format(OVERLAY_FORMAT).to_string()
}
