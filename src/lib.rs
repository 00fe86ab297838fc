// src/lib.rs
pub mod config;
pub mod core;
pub mod io;
pub mod overlay;
pub mod producers;
pub mod recorder;
pub mod ring;

// Re-export the types most callers need
pub use crate::config::Config;
pub use crate::core::timestamp::utc_ns_now;
pub use crate::core::{CamError, CamNode, CamResult, ComponentLogger, LogContext, StopSignal};
pub use crate::ring::{Frame, FrameBuffer, FrameToken};
