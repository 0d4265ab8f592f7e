//! Checksummed command framing for the cyberbee UART link.
//!
//! Every frame is:
//! - 2 sync bytes (`0xAA 0x55`) for stream synchronization
//! - a 1-byte command tag
//! - a 2-byte little-endian payload length
//! - the payload
//! - a 2-byte little-endian CRC-16 over tag, length and payload
//!
//! Decoding is a pure function over a byte slice. It never blocks and never
//! fails: corrupted or misaligned input is skipped one byte at a time until a
//! valid frame lines up again.

pub mod codec;
pub mod command;
pub mod error;

pub use codec::{
    decode_frame, drain_frames, encode_frame, Drained, Frame, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, SYNC,
};
pub use command::{Command, CommandKind, CHANGE_BAUD_RATE, CONFIRM, SET_DIVISION_RATE, TEST};
pub use error::{FrameError, Result};
