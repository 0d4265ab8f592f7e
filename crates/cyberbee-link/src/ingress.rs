use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use cyberbee_frame::{drain_frames, Drained};

use crate::stop::StopToken;

/// Bounded byte queue between the stream reader and the frame processor.
///
/// The reader is the only appender and the processor the only consumer.
/// Bytes leave in arrival order; the only bytes ever dropped are those the
/// decoder discards while resynchronizing. A full buffer makes the reader
/// wait instead of dropping input.
#[derive(Debug)]
pub struct IngressBuffer {
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    buf: BytesMut,
    /// Bumped on every append so the consumer can tell new data from a
    /// leftover partial frame.
    generation: u64,
}

impl IngressBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: BytesMut::with_capacity(capacity),
                generation: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    /// Append `bytes`, waiting for space while the buffer is full.
    ///
    /// Each wait lasts at most `wait`; returns false without appending the
    /// remainder if `stop` trips while waiting.
    pub fn append(&self, mut bytes: &[u8], stop: &StopToken, wait: Duration) -> bool {
        let mut inner = self.lock();
        while !bytes.is_empty() {
            let space = self.capacity.saturating_sub(inner.buf.len());
            if space == 0 {
                if stop.is_stopped() {
                    return false;
                }
                inner = self
                    .writable
                    .wait_timeout(inner, wait)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            let take = space.min(bytes.len());
            inner.buf.extend_from_slice(&bytes[..take]);
            inner.generation = inner.generation.wrapping_add(1);
            bytes = &bytes[take..];
            self.readable.notify_all();
        }
        true
    }

    /// Remove and return every complete frame at the front of the buffer.
    pub fn take_frames(&self, max_payload: usize) -> Drained {
        let mut inner = self.lock();
        let before = inner.buf.len();
        let drained = drain_frames(&mut inner.buf, max_payload);
        if inner.buf.len() < before {
            self.writable.notify_all();
        }
        drained
    }

    /// Drop everything buffered and return how many bytes went.
    ///
    /// Used when the line rate changes: bytes received at the old rate
    /// cannot hold a frame sent at the new one.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.buf.len();
        inner.buf.clear();
        if dropped > 0 {
            self.writable.notify_all();
        }
        dropped
    }

    /// Current append generation.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wait up to `timeout` for an append newer than `seen`.
    ///
    /// Returns the generation observed on wake-up. May return early on
    /// [`notify`](Self::notify) or a spurious wake-up.
    pub fn wait_for_data(&self, seen: u64, timeout: Duration) -> u64 {
        let inner = self.lock();
        if inner.generation != seen || timeout.is_zero() {
            return inner.generation;
        }
        let (inner, _) = self
            .readable
            .wait_timeout(inner, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        inner.generation
    }

    /// Wake both sides, e.g. after a stop request or a queued command.
    pub fn notify(&self) {
        let _inner = self.lock();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    /// Returns true if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use bytes::BytesMut;
    use cyberbee_frame::{encode_frame, CommandKind};

    use super::*;

    fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(CommandKind::Telemetry(tag), payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn append_then_take_preserves_order() {
        let ingress = IngressBuffer::new(1024);
        let stop = StopToken::new();
        let mut wire = frame_bytes(0x41, b"one");
        wire.extend(frame_bytes(0x42, b"two"));

        let (head, tail) = wire.split_at(7);
        assert!(ingress.append(head, &stop, Duration::from_millis(10)));
        assert!(ingress.take_frames(64).frames.is_empty());
        assert!(ingress.append(tail, &stop, Duration::from_millis(10)));

        let drained = ingress.take_frames(64);
        let tags: Vec<_> = drained.frames.iter().map(|f| f.command.tag()).collect();
        assert_eq!(tags, vec![0x41, 0x42]);
        assert!(ingress.is_empty());
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let ingress = IngressBuffer::new(1024);
        let wire = frame_bytes(0x41, b"partial");
        ingress.append(&wire[..6], &StopToken::new(), Duration::from_millis(10));

        assert!(ingress.take_frames(64).frames.is_empty());
        assert_eq!(ingress.len(), 6);
    }

    #[test]
    fn clear_drops_stale_partial_header() {
        let ingress = IngressBuffer::new(4096);
        let stop = StopToken::new();
        // A header promising 1024 payload bytes that never come.
        ingress.append(&[0xAA, 0x55, 0x41, 0x00, 0x04], &stop, Duration::from_millis(10));
        let wire = frame_bytes(0x42, b"ok");
        ingress.append(&wire, &stop, Duration::from_millis(10));
        assert!(ingress.take_frames(1024).frames.is_empty());

        let buffered = ingress.len();
        assert_eq!(ingress.clear(), buffered);
        assert!(ingress.is_empty());

        ingress.append(&wire, &stop, Duration::from_millis(10));
        let drained = ingress.take_frames(1024);
        assert_eq!(drained.frames.len(), 1);
        assert_eq!(drained.frames[0].command.tag(), 0x42);
    }

    #[test]
    fn full_buffer_blocks_until_consumed() {
        let wire = frame_bytes(0x41, b"0123456789");
        let ingress = Arc::new(IngressBuffer::new(wire.len()));
        let stop = StopToken::new();
        ingress.append(&wire, &stop, Duration::from_millis(10));

        let writer = {
            let ingress = Arc::clone(&ingress);
            let stop = stop.clone();
            let second = wire.clone();
            thread::spawn(move || ingress.append(&second, &stop, Duration::from_millis(10)))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(ingress.take_frames(64).frames.len(), 1);
        assert!(writer.join().unwrap());
        assert_eq!(ingress.take_frames(64).frames.len(), 1);
    }

    #[test]
    fn stop_releases_blocked_appender() {
        let ingress = Arc::new(IngressBuffer::new(4));
        let stop = StopToken::new();
        ingress.append(&[1, 2, 3, 4], &stop, Duration::from_millis(10));

        let writer = {
            let ingress = Arc::clone(&ingress);
            let stop = stop.clone();
            thread::spawn(move || ingress.append(&[5], &stop, Duration::from_millis(10)))
        };

        stop.stop();
        ingress.notify();
        assert!(!writer.join().unwrap());
    }

    #[test]
    fn wait_for_data_wakes_on_append() {
        let ingress = Arc::new(IngressBuffer::new(64));
        let seen = ingress.generation();

        let writer = {
            let ingress = Arc::clone(&ingress);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ingress.append(&[0xAA], &StopToken::new(), Duration::from_millis(10));
            })
        };

        let start = Instant::now();
        let mut generation = seen;
        while generation == seen && start.elapsed() < Duration::from_secs(2) {
            generation = ingress.wait_for_data(seen, Duration::from_millis(500));
        }
        assert_ne!(generation, seen);
        writer.join().unwrap();
    }

    #[test]
    fn wait_for_data_returns_immediately_when_behind() {
        let ingress = IngressBuffer::new(64);
        ingress.append(&[1], &StopToken::new(), Duration::from_millis(10));

        let start = Instant::now();
        let generation = ingress.wait_for_data(0, Duration::from_secs(5));
        assert_eq!(generation, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
