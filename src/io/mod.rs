// src/io/mod.rs
pub mod http_live_out;
pub mod http_service;

pub use http_live_out::{LiveStream, StreamEnd, StreamSummary};
pub use http_service::{HttpContext, HttpService};
