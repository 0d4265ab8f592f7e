use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{LinkError, Result};
use crate::negotiator::LinkState;

/// Counters describing traffic seen by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Raw bytes appended to the ingress buffer.
    pub bytes_received: u64,
    /// Frames that passed their checksum.
    pub frames_decoded: u64,
    /// Telemetry frames handed to the sink.
    pub telemetry_published: u64,
    /// Telemetry frames dropped because the link was not yet established.
    pub telemetry_dropped: u64,
    /// Bytes skipped while resynchronizing.
    pub bytes_discarded: u64,
}

/// Shared, read-only view of the driver for external callers.
///
/// Only the frame processor publishes state changes; everyone else takes
/// snapshots or waits for a change.
#[derive(Debug)]
pub struct LinkStatus {
    inner: Mutex<StatusInner>,
    changed: Condvar,
    bytes_received: AtomicU64,
    frames_decoded: AtomicU64,
    telemetry_published: AtomicU64,
    telemetry_dropped: AtomicU64,
    bytes_discarded: AtomicU64,
}

#[derive(Debug)]
struct StatusInner {
    state: LinkState,
    fault: Option<String>,
    /// Set once the processor has exited; the state will not change again.
    closed: bool,
}

impl LinkStatus {
    pub(crate) fn new(state: LinkState) -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                state,
                fault: None,
                closed: false,
            }),
            changed: Condvar::new(),
            bytes_received: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            telemetry_published: AtomicU64::new(0),
            telemetry_dropped: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current link state.
    pub fn state(&self) -> LinkState {
        self.lock().state.clone()
    }

    /// Transport fault that stopped a driver loop, if any.
    pub fn fault(&self) -> Option<String> {
        self.lock().fault.clone()
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            telemetry_published: self.telemetry_published.load(Ordering::Relaxed),
            telemetry_dropped: self.telemetry_dropped.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }

    /// Block until `done` holds for the current state.
    ///
    /// Fails early with [`LinkError::Fault`] once a loop has recorded a
    /// transport fault, with [`LinkError::Stopped`] once the processor has
    /// exited, and with [`LinkError::Timeout`] after `timeout`.
    pub fn wait_until<F>(&self, timeout: Duration, mut done: F) -> Result<LinkState>
    where
        F: FnMut(&LinkState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if done(&inner.state) {
                return Ok(inner.state.clone());
            }
            if let Some(fault) = &inner.fault {
                return Err(LinkError::Fault(fault.clone()));
            }
            if inner.closed {
                return Err(LinkError::Stopped);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::Timeout(timeout));
            }
            inner = self
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub(crate) fn publish(&self, state: &LinkState) {
        let mut inner = self.lock();
        if inner.state != *state {
            inner.state = state.clone();
            self.changed.notify_all();
        }
    }

    pub(crate) fn record_fault(&self, fault: String) {
        let mut inner = self.lock();
        if inner.fault.is_none() {
            inner.fault = Some(fault);
        }
        self.changed.notify_all();
    }

    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        self.changed.notify_all();
    }

    pub(crate) fn add_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_decoded(&self, frames: usize, discarded: usize) {
        self.frames_decoded
            .fetch_add(frames as u64, Ordering::Relaxed);
        self.bytes_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_published(&self) {
        self.telemetry_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped(&self) {
        self.telemetry_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
