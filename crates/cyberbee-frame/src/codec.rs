use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_3740};
use tracing::trace;

use crate::command::CommandKind;
use crate::error::{FrameError, Result};

/// Sync bytes that open every frame.
pub const SYNC: [u8; 2] = [0xAA, 0x55];

/// Frame header: sync (2) + tag (1) + length (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Frame trailer: CRC-16 (2 bytes, little-endian).
pub const CHECKSUM_SIZE: usize = 2;

/// Default maximum payload size accepted by the decoder.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// CRC-16/IBM-3740 (CCITT-FALSE) over tag, length and payload.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame kind (wire tag).
    pub command: CommandKind,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: CommandKind, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────┬───────────┬──────────────────┬───────────┐
/// │ Sync (2B)  │ Tag (1B) │ Length    │ Payload          │ CRC-16    │
/// │ 0xAA 0x55  │          │ (2B LE)   │ (Length bytes)   │ (2B LE)   │
/// └────────────┴──────────┴───────────┴──────────────────┴───────────┘
/// ```
///
/// The checksum covers tag, length and payload.
pub fn encode_frame(command: CommandKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let CommandKind::Telemetry(tag) = command {
        if CommandKind::from_tag(tag).is_protocol() {
            return Err(FrameError::ReservedTag(tag));
        }
    }
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }

    let length = (payload.len() as u16).to_le_bytes();
    let mut digest = CRC16.digest();
    digest.update(&[command.tag()]);
    digest.update(&length);
    digest.update(payload);

    dst.reserve(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    dst.put_slice(&SYNC);
    dst.put_u8(command.tag());
    dst.put_slice(&length);
    dst.put_slice(payload);
    dst.put_u16_le(digest.finalize());
    Ok(())
}

/// Decode the first frame found in `src`.
///
/// Returns the frame (if any) and the number of bytes the caller should
/// discard from the front of `src`:
/// - a valid frame: its offset plus its wire size,
/// - an incomplete candidate: the offset of that candidate (zero when the
///   buffer starts with it), so the caller waits for more bytes,
/// - no candidate at all: everything except a trailing partial sync byte.
///
/// A candidate whose declared length exceeds `max_payload`, or whose checksum
/// does not match, is skipped one byte at a time so a corrupted byte never
/// hides a valid frame that follows it.
pub fn decode_frame(src: &[u8], max_payload: usize) -> (Option<Frame>, usize) {
    let mut start = 0usize;

    while start < src.len() {
        let window = &src[start..];

        if window[0] != SYNC[0] {
            start += 1;
            continue;
        }
        if window.len() < SYNC.len() {
            break; // Partial sync at the tail
        }
        if window[1] != SYNC[1] {
            start += 1;
            continue;
        }
        if window.len() < HEADER_SIZE {
            return (None, start); // Need more data
        }

        let length = u16::from_le_bytes([window[3], window[4]]) as usize;
        if length > max_payload {
            trace!(offset = start, length, max_payload, "oversized length, resyncing");
            start += 1;
            continue;
        }

        let total = HEADER_SIZE + length + CHECKSUM_SIZE;
        if window.len() < total {
            return (None, start); // Need more data
        }

        let body = &window[SYNC.len()..HEADER_SIZE + length];
        let expected = u16::from_le_bytes([window[total - 2], window[total - 1]]);
        if CRC16.checksum(body) != expected {
            trace!(offset = start, tag = window[2], "checksum mismatch, resyncing");
            start += 1;
            continue;
        }

        let frame = Frame {
            command: CommandKind::from_tag(window[2]),
            payload: Bytes::copy_from_slice(&window[HEADER_SIZE..HEADER_SIZE + length]),
        };
        return (Some(frame), start + total);
    }

    (None, start)
}

/// Frames extracted from a buffer by [`drain_frames`].
#[derive(Debug, Default)]
pub struct Drained {
    /// Complete frames, in arrival order.
    pub frames: Vec<Frame>,
    /// Bytes dropped while resynchronizing.
    pub discarded: usize,
}

/// Decode every complete frame at the front of `buf`, advancing past them.
///
/// Bytes belonging to an incomplete trailing frame stay in `buf`.
pub fn drain_frames(buf: &mut BytesMut, max_payload: usize) -> Drained {
    let mut drained = Drained::default();

    loop {
        let (frame, consumed) = decode_frame(buf, max_payload);
        if consumed == 0 {
            break;
        }

        match frame {
            Some(frame) => {
                drained.discarded += consumed - frame.wire_size();
                drained.frames.push(frame);
            }
            None => drained.discarded += consumed,
        }
        buf.advance(consumed);
    }

    drained
}
