// src/recorder/retention_fs.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use serde::Serialize;

use crate::core::timestamp::parse_date_dir;
use crate::core::wait::StopSignal;
use crate::recorder::RetentionPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub cutoff: NaiveDate,
    pub removed: Vec<PathBuf>,
    pub files_removed: u64,
    pub bytes_reclaimed: u64,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(cutoff: NaiveDate) -> Self {
        Self {
            cutoff,
            removed: Vec::new(),
            files_removed: 0,
            bytes_reclaimed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes one expired day directory.
pub type DirRemover = fn(&Path) -> io::Result<()>;

/// Deletes whole `YYYY-MM-DD` directories under the recordings root once
/// their date is strictly older than `today - retention_days`.
pub struct FsRetention {
    root: PathBuf,
    retention_days: u32,
    remove: DirRemover,
}

impl FsRetention {
    pub fn new(root: PathBuf, retention_days: u32) -> Self {
        Self {
            root,
            retention_days,
            remove: remove_dir,
        }
    }

    pub fn with_remover(mut self, remove: DirRemover) -> Self {
        self.remove = remove;
        self
    }

    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(self.retention_days as i64)
    }

    pub fn sweep(&self, today: NaiveDate) -> SweepReport {
        let cutoff = self.cutoff(today);
        let mut report = SweepReport::new(cutoff);

        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(err) => {
                warn!("[retention] cannot read {}: {}", self.root.display(), err);
                return report;
            }
        };

        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(parse_date_dir) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            let path = entry.path();
            let (files, bytes) = dir_usage(&path);
            match (self.remove)(&path) {
                Ok(()) => {
                    info!(
                        "[retention] removed {} ({} files, {:.2} MB)",
                        path.display(),
                        files,
                        bytes as f64 / (1024.0 * 1024.0)
                    );
                    report.files_removed += files;
                    report.bytes_reclaimed += bytes;
                    report.removed.push(path);
                }
                Err(err) => {
                    error!("[retention] failed {}: {}", path.display(), err);
                    report.failures.push(SweepFailure {
                        path,
                        message: err.to_string(),
                    });
                }
            }
        }

        report.removed.sort();
        report
    }

    pub fn sweep_now(&self) -> SweepReport {
        self.sweep(Local::now().date_naive())
    }
}

impl RetentionPolicy for FsRetention {
    fn run(&mut self, today: NaiveDate) -> anyhow::Result<SweepReport> {
        Ok(self.sweep(today))
    }
}

fn remove_dir(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

/// File count and byte size below `dir`. Unreadable entries count as zero.
fn dir_usage(dir: &Path) -> (u64, u64) {
    fn walk(dir: &Path, acc: &mut (u64, u64)) -> io::Result<()> {
        for entry in fs::read_dir(dir)?.flatten() {
            let ft = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            if ft.is_dir() {
                let _ = walk(&entry.path(), acc);
            } else if ft.is_file() {
                acc.0 += 1;
                acc.1 += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(())
    }

    let mut acc = (0, 0);
    let _ = walk(dir, &mut acc);
    acc
}

/// Runs a retention policy once at start and then every `interval`.
pub struct RetentionScheduler {
    handle: Option<JoinHandle<()>>,
}

impl RetentionScheduler {
    pub fn spawn(
        mut policy: Box<dyn RetentionPolicy>,
        interval: Duration,
        stop: Arc<StopSignal>,
    ) -> anyhow::Result<Self> {
        let handle = thread::Builder::new()
            .name("retention".into())
            .spawn(move || {
                info!("[retention] scheduler started, every {:?}", interval);
                loop {
                    match policy.run(Local::now().date_naive()) {
                        Ok(report) => info!(
                            "[retention] sweep done: {} dirs, {} files, {} bytes, {} failures",
                            report.removed.len(),
                            report.files_removed,
                            report.bytes_reclaimed,
                            report.failures.len()
                        ),
                        Err(e) => error!("[retention] sweep failed: {}", e),
                    }

                    if stop.wait_timeout(interval) {
                        break;
                    }
                }
                info!("[retention] scheduler stopped");
            })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[retention] scheduler thread panicked");
            }
        }
    }
}
