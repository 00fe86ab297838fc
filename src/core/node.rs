// src/core/node.rs
//
// Wires one camera into the shared frame buffer and hangs every consumer
// off it: capture driver, segment recorder, retention scheduler and the
// HTTP front. Shutdown runs in reverse through one stop signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;

use crate::config::{Config, EncoderKind, SourceKind};
use crate::core::error::{CamError, CamResult};
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::wait::StopSignal;
use crate::io::{HttpContext, HttpService};
use crate::overlay::OverlayRenderer;
use crate::producers::{CaptureDriver, CommandSource, FrameSource, TestPatternSource};
use crate::recorder::{
    FfmpegEncoder, FsRetention, MjpegEncoder, RecorderConfig, RetentionScheduler, SegmentEncoder,
    SegmentRecorder, SpaceProbe, StatvfsProbe,
};
use crate::ring::FrameBuffer;

pub struct CamNode {
    name: String,
    stop: Arc<StopSignal>,
    buffer: Arc<FrameBuffer>,
    capture: Option<CaptureDriver>,
    recorder: Option<Arc<SegmentRecorder>>,
    retention: Option<RetentionScheduler>,
    http: Option<HttpService>,
    started_at: Instant,
}

impl CamNode {
    /// Opens the camera with one probe capture, then brings up every
    /// consumer. Only a camera that cannot deliver that first frame fails
    /// the start; recorder and retention problems are logged.
    pub fn start(
        config: Config,
        mut source: Box<dyn FrameSource>,
        encoder: Arc<dyn SegmentEncoder>,
        probe: Arc<dyn SpaceProbe>,
    ) -> CamResult<Self> {
        config.validate()?;

        let name = config.camera.name.clone();
        let stop = Arc::new(StopSignal::new());
        let buffer = Arc::new(FrameBuffer::new(&name));
        let overlay = config
            .overlay
            .enabled
            .then(|| OverlayRenderer::new(config.camera.jpeg_quality, config.overlay.opacity));

        let first = source
            .capture()
            .map_err(|e| CamError::camera_init(format!("'{}': {}", source.name(), e)))?;
        let first = match &overlay {
            Some(r) => r.render(&first, &Local::now()),
            None => first,
        };
        buffer.publish(first);

        let mut node = Self {
            name,
            stop: stop.clone(),
            buffer: buffer.clone(),
            capture: None,
            recorder: None,
            retention: None,
            http: None,
            started_at: Instant::now(),
        };
        node.info("camera opened, first frame published");

        let capture = CaptureDriver::spawn(
            source,
            buffer.clone(),
            overlay,
            config.camera.fps,
            stop.clone(),
        )
        .map_err(|e| CamError::capture(e.to_string()))?;
        node.capture = Some(capture);

        if config.recorder.enabled {
            let recorder = Arc::new(SegmentRecorder::new(
                &node.name,
                RecorderConfig::from(&config.recorder),
                buffer.clone(),
                encoder,
                probe,
            ));
            if let Err(e) = recorder.start() {
                node.error(&format!("recorder not started: {}", e));
            }
            node.recorder = Some(recorder);
        }

        if config.retention.enabled {
            let policy = FsRetention::new(config.recorder.root.clone(), config.retention.days);
            let interval = config.retention.interval();
            match RetentionScheduler::spawn(Box::new(policy), interval, stop.clone()) {
                Ok(s) => node.retention = Some(s),
                Err(e) => node.error(&format!("retention scheduler not started: {}", e)),
            }
        }

        if config.http.enabled {
            let ctx = HttpContext {
                buffer: buffer.clone(),
                recorder: node.recorder.clone(),
                recordings_root: config.recorder.root.clone(),
                boundary: config.http.boundary.clone(),
                stop: stop.clone(),
            };
            match HttpService::start(&config.http.bind, ctx) {
                Ok(h) => node.http = Some(h),
                Err(e) => {
                    node.shutdown_in_place();
                    return Err(CamError::http(e.to_string()));
                }
            }
        }

        node.info("running");
        Ok(node)
    }

    /// Builds source, encoder and disk probe from `config`.
    pub fn start_from_config(config: Config) -> CamResult<Self> {
        config.validate()?;
        let cam = &config.camera;

        let source: Box<dyn FrameSource> = match cam.source {
            SourceKind::TestPattern => Box::new(TestPatternSource::new(
                &cam.name,
                cam.width,
                cam.height,
                cam.jpeg_quality,
            )),
            SourceKind::Command => Box::new(CommandSource::spawn(&cam.name, &cam.command)?),
        };

        let encoder: Arc<dyn SegmentEncoder> = match config.recorder.encoder {
            EncoderKind::Mjpeg => Arc::new(MjpegEncoder),
            EncoderKind::Ffmpeg => {
                Arc::new(FfmpegEncoder::new(&config.recorder.ffmpeg_path, cam.fps))
            }
        };

        Self::start(config, source, encoder, Arc::new(StatvfsProbe))
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn recorder(&self) -> Option<&Arc<SegmentRecorder>> {
        self.recorder.as_ref()
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|h| h.local_addr())
    }

    pub fn capture_running(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_running())
    }

    pub fn shutdown(mut self) {
        self.shutdown_in_place();
    }

    fn shutdown_in_place(&mut self) {
        if self.stop.is_stopped() {
            return;
        }
        self.info("shutting down");

        self.stop.stop();
        self.buffer.close();

        if let Some(recorder) = &self.recorder {
            recorder.stop();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.join();
        }
        if let Some(mut retention) = self.retention.take() {
            retention.join();
        }
        if let Some(mut http) = self.http.take() {
            http.join();
        }

        self.info(&format!(
            "shutdown complete after {:.1}s",
            self.started_at.elapsed().as_secs_f64()
        ));
    }
}

impl Drop for CamNode {
    fn drop(&mut self) {
        self.shutdown_in_place();
    }
}

impl ComponentLogger for CamNode {
    fn log_context(&self) -> LogContext {
        LogContext::new("node", &self.name)
    }
}
