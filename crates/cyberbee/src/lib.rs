//! UART link driver for the cyberbee companion computer.
//!
//! Connects a host to the IMX8 controller over a serial line: finds the
//! baud rate the controller listens at, exchanges the Test/Confirm command
//! protocol and streams decoded telemetry frames.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial byte channel with time-bounded reads
//! - [`frame`]: Checksummed framing with byte-level resynchronization
//! - [`link`]: Baud negotiation, command state machine and the driver threads

/// Re-export transport types.
pub mod transport {
    pub use cyberbee_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cyberbee_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use cyberbee_link::*;
}
