// src/ring/frame_buffer.rs
//
// Single-slot, multi-waiter frame exchange. The producer overwrites the slot
// and wakes everyone; each reader remembers the sequence it saw last and
// sleeps until a newer one shows up. Nothing is queued, so a slow reader
// skips frames instead of slowing the producer down.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::core::lock::{lock_mutex, wait_timeout};
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::timestamp::utc_ns_now;
use crate::core::wait::StopSignal;

/// How often a blocked reader re-checks its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u64,
    pub utc_ns: u64,
    pub data: Bytes,
}

impl Frame {
    pub fn token(&self) -> FrameToken {
        FrameToken(self.seq)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Position of a reader in the publish order. `FrameToken::NONE` has seen
/// nothing yet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    pub const NONE: FrameToken = FrameToken(0);

    pub fn seq(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub enum FrameWait {
    Ready(Frame, FrameToken),
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferStats {
    pub head_seq: u64,
    pub waiters: usize,
    pub closed: bool,
    pub frame_bytes: usize,
}

#[derive(Default)]
struct Slot {
    current: Option<Frame>,
    head_seq: u64,
    waiters: usize,
    closed: bool,
}

pub struct FrameBuffer {
    name: String,
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl FrameBuffer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slot: Mutex::new(Slot::default()),
            changed: Condvar::new(),
        }
    }

    /// Replaces the held frame and wakes every waiter.
    pub fn publish(&self, data: Bytes) -> FrameToken {
        self.publish_at(data, utc_ns_now())
    }

    pub fn publish_at(&self, data: Bytes, utc_ns: u64) -> FrameToken {
        let mut slot = lock_mutex(&self.slot, "FrameBuffer::publish");
        if slot.closed {
            return FrameToken(slot.head_seq);
        }

        slot.head_seq += 1;
        let seq = slot.head_seq;
        let bytes = data.len();
        slot.current = Some(Frame { seq, utc_ns, data });
        let waiters = slot.waiters;
        drop(slot);

        self.changed.notify_all();

        if seq <= 3 || seq % 300 == 0 {
            self.debug(&format!(
                "publish seq={} bytes={} waiters={}",
                seq, bytes, waiters
            ));
        }

        FrameToken(seq)
    }

    /// Blocks until a frame newer than `last` exists, the buffer closes, or
    /// `cancel` fires. `None` means the caller should give up.
    pub fn await_next(
        &self,
        last: FrameToken,
        cancel: &StopSignal,
    ) -> Option<(Frame, FrameToken)> {
        loop {
            if cancel.is_stopped() {
                return None;
            }
            match self.await_next_timeout(last, CANCEL_POLL) {
                FrameWait::Ready(frame, token) => return Some((frame, token)),
                FrameWait::Closed => return None,
                FrameWait::TimedOut => continue,
            }
        }
    }

    pub fn await_next_timeout(&self, last: FrameToken, timeout: Duration) -> FrameWait {
        let deadline = Instant::now() + timeout;
        let mut slot = lock_mutex(&self.slot, "FrameBuffer::await_next");
        slot.waiters += 1;

        let outcome = loop {
            if slot.closed {
                break FrameWait::Closed;
            }
            if slot.head_seq > last.0 {
                if let Some(frame) = slot.current.clone() {
                    let token = frame.token();
                    break FrameWait::Ready(frame, token);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break FrameWait::TimedOut;
            }
            let (guard, _) = wait_timeout(
                &self.changed,
                slot,
                deadline - now,
                "FrameBuffer::await_next",
            );
            slot = guard;
        };

        slot.waiters -= 1;
        outcome
    }

    /// The frame currently held, without waiting.
    pub fn snapshot(&self) -> Option<Frame> {
        lock_mutex(&self.slot, "FrameBuffer::snapshot").current.clone()
    }

    /// Token a new reader should start from to receive only future frames.
    pub fn head(&self) -> FrameToken {
        FrameToken(lock_mutex(&self.slot, "FrameBuffer::head").head_seq)
    }

    /// Wakes every waiter with `Closed`; later publishes are ignored.
    pub fn close(&self) {
        let mut slot = lock_mutex(&self.slot, "FrameBuffer::close");
        if slot.closed {
            return;
        }
        slot.closed = true;
        let waiters = slot.waiters;
        drop(slot);

        self.changed.notify_all();
        self.info(&format!("closed with {} waiter(s)", waiters));
    }

    pub fn is_closed(&self) -> bool {
        lock_mutex(&self.slot, "FrameBuffer::is_closed").closed
    }

    pub fn stats(&self) -> FrameBufferStats {
        let slot = lock_mutex(&self.slot, "FrameBuffer::stats");
        FrameBufferStats {
            head_seq: slot.head_seq,
            waiters: slot.waiters,
            closed: slot.closed,
            frame_bytes: slot.current.as_ref().map(|f| f.len()).unwrap_or(0),
        }
    }
}

impl ComponentLogger for FrameBuffer {
    fn log_context(&self) -> LogContext {
        LogContext::new("frames", &self.name)
    }
}
