// src/io/http_live_out.rs
//
// One viewer = one loop: wait for a newer frame, write it as a multipart
// part, repeat. The first failed write ends the session; there is no other
// way a viewer leaves.

use std::io::{self, Write};

use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::wait::StopSignal;
use crate::ring::{Frame, FrameBuffer, FrameToken};

#[derive(Debug)]
pub enum StreamEnd {
    /// Viewer went away or the socket broke.
    WriteFailed(io::Error),
    /// Buffer closed or the node is shutting down.
    Cancelled,
}

#[derive(Debug)]
pub struct StreamSummary {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub end: StreamEnd,
}

pub struct LiveStream<'a> {
    peer: String,
    boundary: &'a str,
    buffer: &'a FrameBuffer,
    cancel: &'a StopSignal,
}

impl<'a> LiveStream<'a> {
    pub fn new(
        peer: &str,
        boundary: &'a str,
        buffer: &'a FrameBuffer,
        cancel: &'a StopSignal,
    ) -> Self {
        Self {
            peer: peer.to_string(),
            boundary,
            buffer,
            cancel,
        }
    }

    pub fn content_type(boundary: &str) -> String {
        format!("multipart/x-mixed-replace; boundary={}", boundary)
    }

    /// Status line and headers for a raw socket writer.
    pub fn write_head<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(
            out,
            "HTTP/1.1 200 OK\r\n\
             Age: 0\r\n\
             Cache-Control: no-cache, private\r\n\
             Pragma: no-cache\r\n\
             Connection: close\r\n\
             Content-Type: {}\r\n\r\n",
            Self::content_type(self.boundary)
        )?;
        out.flush()
    }

    pub fn write_part<W: Write>(&self, out: &mut W, frame: &Frame) -> io::Result<()> {
        write!(
            out,
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            self.boundary,
            frame.len()
        )?;
        out.write_all(&frame.data)?;
        out.write_all(b"\r\n")?;
        out.flush()
    }

    /// Starts with whatever frame is current so the viewer is not left on a
    /// blank image until the next publish.
    pub fn run<W: Write>(&self, out: &mut W) -> StreamSummary {
        self.info("viewer connected");

        let mut token = FrameToken::NONE;
        let mut frames_sent = 0u64;
        let mut bytes_sent = 0u64;

        let end = loop {
            let Some((frame, next)) = self.buffer.await_next(token, self.cancel) else {
                break StreamEnd::Cancelled;
            };
            token = next;

            if let Err(e) = self.write_part(out, &frame) {
                break StreamEnd::WriteFailed(e);
            }
            frames_sent += 1;
            bytes_sent += frame.len() as u64;
        };

        match &end {
            StreamEnd::WriteFailed(e) => {
                self.warn(&format!("removed viewer after {} frames: {}", frames_sent, e))
            }
            StreamEnd::Cancelled => {
                self.info(&format!("stream ended after {} frames", frames_sent))
            }
        }

        StreamSummary {
            frames_sent,
            bytes_sent,
            end,
        }
    }
}

impl ComponentLogger for LiveStream<'_> {
    fn log_context(&self) -> LogContext {
        LogContext::new("stream", "mjpeg").with_session(&self.peer)
    }
}
