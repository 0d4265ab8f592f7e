/// Errors that can occur while encoding frames.
///
/// Decoding never fails: corrupted input is skipped by resynchronization.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A telemetry frame was given a tag reserved for protocol commands.
    #[error("tag 0x{0:02X} is reserved for protocol commands")]
    ReservedTag(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
