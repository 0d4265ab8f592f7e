/// Errors that can occur on the serial byte channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path} at {baud_rate} baud: {source}")]
    Open {
        path: String,
        baud_rate: u32,
        source: serialport::Error,
    },

    /// Failed to apply a new baud rate to an open device.
    #[error("failed to set baud rate {baud_rate}: {source}")]
    Configure {
        baud_rate: u32,
        source: serialport::Error,
    },

    /// Failed to duplicate the device handle for the read side.
    #[error("failed to clone channel handle: {0}")]
    Clone(serialport::Error),

    /// Failed to enumerate serial devices.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(serialport::Error),

    /// An I/O error occurred on the channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device accepted zero bytes on write (unplugged or hung up).
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
