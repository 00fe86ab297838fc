// src/producers/mod.rs
//
// Camera side of the node. A `FrameSource` hands out one JPEG per call; the
// capture driver is the only thing that ever talks to it.

pub mod capture;
pub mod command;
pub mod test_pattern;

use bytes::Bytes;

pub use capture::{CaptureDriver, CaptureStats};
pub use command::CommandSource;
pub use test_pattern::TestPatternSource;

pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Blocks until the next JPEG frame is available.
    fn capture(&mut self) -> anyhow::Result<Bytes>;

    /// True when the device already delivers at its own frame rate and the
    /// driver must not add sleeps between captures.
    fn self_paced(&self) -> bool {
        false
    }
}
