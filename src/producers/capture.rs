// src/producers/capture.rs
//
// The single capture loop: source -> overlay -> frame buffer. Both the live
// viewers and the segment recorder read from that buffer, so the camera is
// opened exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{error, info, warn};

use crate::core::wait::StopSignal;
use crate::overlay::OverlayRenderer;
use crate::producers::FrameSource;
use crate::ring::FrameBuffer;

/// Consecutive capture errors after which the camera is considered gone.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 50;

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames: AtomicU64,
    pub errors: AtomicU64,
    pub running: AtomicBool,
}

pub struct CaptureDriver {
    name: String,
    stats: Arc<CaptureStats>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureDriver {
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        buffer: Arc<FrameBuffer>,
        overlay: Option<OverlayRenderer>,
        fps: u32,
        stop: Arc<StopSignal>,
    ) -> anyhow::Result<Self> {
        let name = source.name().to_string();
        let stats = Arc::new(CaptureStats::default());
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        stats.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new().name(format!("capture-{}", name)).spawn({
            let name = name.clone();
            let stats = stats.clone();
            move || {
                info!("[capture] '{}' started at {} fps", name, fps);
                let mut failures = 0u32;

                while !stop.is_stopped() {
                    let started = Instant::now();

                    match source.capture() {
                        Ok(jpeg) => {
                            failures = 0;
                            let frame = match &overlay {
                                Some(r) => r.render(&jpeg, &Local::now()),
                                None => jpeg,
                            };
                            buffer.publish(frame);
                            stats.frames.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failures += 1;
                            stats.errors.fetch_add(1, Ordering::Relaxed);
                            warn!("[capture] '{}' error ({}): {}", name, failures, e);
                            if failures >= MAX_CONSECUTIVE_FAILURES {
                                error!("[capture] '{}' giving up after {} errors", name, failures);
                                buffer.close();
                                break;
                            }
                        }
                    }

                    if failures > 0 || !source.self_paced() {
                        let elapsed = started.elapsed();
                        if elapsed < interval {
                            stop.wait_timeout(interval - elapsed);
                        }
                    }
                }

                stats.running.store(false, Ordering::SeqCst);
                info!("[capture] '{}' stopped", name);
            }
        })?;

        Ok(Self {
            name,
            stats,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.stats.running.load(Ordering::Relaxed)
    }

    /// Waits for the loop to exit. The caller fires the stop signal first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[capture] '{}' thread panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::FrameToken;
    use bytes::Bytes;

    struct Scripted {
        frames: Vec<anyhow::Result<Bytes>>,
    }

    impl FrameSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn capture(&mut self) -> anyhow::Result<Bytes> {
            if self.frames.is_empty() {
                anyhow::bail!("exhausted");
            }
            self.frames.remove(0)
        }
    }

    #[test]
    fn publishes_frames_unmodified_without_overlay() {
        let buffer = Arc::new(FrameBuffer::new("t"));
        let stop = Arc::new(StopSignal::new());
        let source = Scripted {
            frames: vec![Ok(Bytes::from_static(b"one"))],
        };

        let mut driver =
            CaptureDriver::spawn(Box::new(source), buffer.clone(), None, 200, stop.clone())
                .unwrap();

        let (frame, _) = buffer.await_next(FrameToken::NONE, &stop).unwrap();
        assert_eq!(frame.data, Bytes::from_static(b"one"));

        stop.stop();
        driver.join();
        assert!(!driver.is_running());
        assert_eq!(driver.stats().frames.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dead_camera_closes_the_buffer() {
        let buffer = Arc::new(FrameBuffer::new("t"));
        let stop = Arc::new(StopSignal::new());
        let source = Scripted { frames: Vec::new() };

        let mut driver =
            CaptureDriver::spawn(Box::new(source), buffer.clone(), None, 1000, stop).unwrap();
        driver.join();

        assert!(buffer.is_closed());
        assert_eq!(
            driver.stats().errors.load(Ordering::Relaxed),
            MAX_CONSECUTIVE_FAILURES as u64
        );
    }
}
