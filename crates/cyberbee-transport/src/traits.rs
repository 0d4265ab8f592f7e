use crate::error::Result;

/// A raw duplex byte transport with a settable baud rate.
///
/// Reads are time-bounded: an implementation must return `Ok(0)` when its read
/// timeout elapses without data instead of blocking indefinitely. Callers rely
/// on this to observe stop requests between reads.
pub trait ByteChannel: Send {
    /// Read available bytes into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the read timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `bytes` and flush.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reconfigure the line rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Currently configured line rate.
    fn baud_rate(&self) -> u32;

    /// Open a second handle onto the same device.
    ///
    /// The driver reads from one handle and writes from the other. Line
    /// settings are shared by the device, so a baud change through either
    /// handle applies to both.
    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>>;

    /// Human-readable name for diagnostics.
    fn describe(&self) -> String {
        "byte-channel".to_string()
    }
}
