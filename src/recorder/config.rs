// src/recorder/config.rs
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{GIB, RecorderConfigToml};

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub root: PathBuf,
    pub segment_duration: Duration,
    pub min_free_bytes: u64,
}

impl RecorderConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            segment_duration: Duration::from_secs(60),
            min_free_bytes: GIB,
        }
    }
}

impl From<&RecorderConfigToml> for RecorderConfig {
    fn from(cfg: &RecorderConfigToml) -> Self {
        Self {
            root: cfg.root.clone(),
            segment_duration: cfg.segment_duration(),
            min_free_bytes: cfg.min_free_bytes,
        }
    }
}
