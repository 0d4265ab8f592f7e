//! Byte channel abstraction for the companion-computer UART link.
//!
//! This is the lowest layer of cyberbee. Everything else builds on the
//! [`ByteChannel`] trait provided here:
//! - time-bounded reads (`Ok(0)` when nothing arrived)
//! - whole-buffer writes
//! - runtime baud-rate changes
//!
//! [`SerialChannel`] implements it on top of a real serial device.

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{available_ports, PortInfo, SerialChannel, DEFAULT_READ_TIMEOUT};
pub use traits::ByteChannel;

/// Re-exported so callers can inspect [`TransportError`] sources.
pub use serialport;
