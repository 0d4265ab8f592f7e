use std::time::Duration;

use crate::negotiator::LinkState;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] cyberbee_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] cyberbee_frame::FrameError),

    /// Every candidate baud rate was probed without a Confirm.
    #[error("link unavailable: no confirm at any of {tried} baud rates")]
    LinkFailed { tried: usize },

    /// The command needs an established link.
    #[error("link not established (state: {0})")]
    NotEstablished(LinkState),

    /// The driver runs in listen-only mode and never transmits.
    #[error("listen-only mode: transmission disabled")]
    ListenOnly,

    /// Another command is still waiting for its Confirm.
    #[error("a command is already awaiting confirmation")]
    CommandInFlight,

    /// Baud-rate table index out of range.
    #[error("baud rate index {index} out of range (table has {len} entries)")]
    InvalidBaudIndex { index: usize, len: usize },

    /// Configuration rejected before start.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Waiting for the link timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The driver has been stopped.
    #[error("driver stopped")]
    Stopped,

    /// A driver loop terminated on a transport fault.
    #[error("driver fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
