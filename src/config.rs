use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{CamError, CamResult};

pub const GIB: u64 = 1024 * 1024 * 1024;

// ---------- Camera ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TestPattern,
    Command,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub name: String,
    pub source: SourceKind,
    /// argv of the capture program for `source = "command"`.
    pub command: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        // 16:9 at 450 lines, as the Pi camera was configured.
        Self {
            name: "cam0".into(),
            source: SourceKind::TestPattern,
            command: Vec::new(),
            width: 800,
            height: 450,
            fps: 10,
            jpeg_quality: 80,
        }
    }
}

// ---------- Overlay ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub opacity: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            opacity: 0.6,
        }
    }
}

// ---------- HTTP ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub boundary: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:5000".into(),
            boundary: "FRAME".into(),
        }
    }
}

// ---------- Recorder ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    Mjpeg,
    Ffmpeg,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RecorderConfigToml {
    pub enabled: bool,
    pub root: PathBuf,
    pub segment_seconds: u64,
    pub min_free_bytes: u64,
    pub encoder: EncoderKind,
    pub ffmpeg_path: String,
}

impl Default for RecorderConfigToml {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("recordings"),
            segment_seconds: 60,
            min_free_bytes: GIB,
            encoder: EncoderKind::Mjpeg,
            ffmpeg_path: "ffmpeg".into(),
        }
    }
}

impl RecorderConfigToml {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_seconds)
    }
}

// ---------- Retention ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub days: u32,
    pub interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days: 7,
            interval_seconds: 24 * 60 * 60,
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub overlay: OverlayConfig,
    pub http: HttpConfig,
    pub recorder: RecorderConfigToml,
    pub retention: RetentionConfig,
}

impl Config {
    pub fn validate(&self) -> CamResult<()> {
        if self.camera.fps == 0 {
            return Err(CamError::config("camera.fps must be > 0"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(CamError::config("camera.width/height must be > 0"));
        }
        if self.camera.source == SourceKind::Command && self.camera.command.is_empty() {
            return Err(CamError::config(
                "camera.command is required for source = \"command\"",
            ));
        }
        if !(0.0..=1.0).contains(&self.overlay.opacity) {
            return Err(CamError::config("overlay.opacity must be within 0..=1"));
        }
        if self.recorder.segment_seconds == 0 {
            return Err(CamError::config("recorder.segment_seconds must be > 0"));
        }
        if self.retention.enabled && self.retention.interval_seconds == 0 {
            return Err(CamError::config("retention.interval_seconds must be > 0"));
        }
        if self.http.boundary.is_empty() || self.http.boundary.contains(['\r', '\n']) {
            return Err(CamError::config("http.boundary must be a single token"));
        }
        Ok(())
    }
}

// ---------- Loader ----------
pub fn load(path: &str) -> anyhow::Result<Config> {
    let txt = std::fs::read_to_string(path)?;
    parse(&txt)
}

pub fn parse(txt: &str) -> anyhow::Result<Config> {
    let cfg: Config = toml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}
