// src/ring/mod.rs
pub mod frame_buffer;

pub use frame_buffer::Frame;
pub use frame_buffer::FrameBuffer;
pub use frame_buffer::FrameBufferStats;
pub use frame_buffer::FrameToken;
pub use frame_buffer::FrameWait;
