//! Command tags and typed command payloads.
//!
//! Tags 0x20, 0x22, 0x23 and 0x30 are the link protocol commands understood by
//! the IMX8 firmware. Every other tag carries telemetry.

use bytes::Bytes;

use crate::codec::Frame;

/// Link self-test; the remote answers with [`CONFIRM`].
pub const TEST: u8 = 0x20;

/// Set how many sensor samples the remote skips between telemetry frames.
pub const SET_DIVISION_RATE: u8 = 0x22;

/// Acknowledgement of a previously received command.
pub const CONFIRM: u8 = 0x23;

/// Switch both ends to another entry of the baud-rate table.
pub const CHANGE_BAUD_RATE: u8 = 0x30;

/// The kind of a frame, carried as its one-byte wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Test,
    SetDivisionRate,
    Confirm,
    ChangeBaudRate,
    /// Any non-protocol tag.
    Telemetry(u8),
}

impl CommandKind {
    /// Classify a wire tag.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            TEST => Self::Test,
            SET_DIVISION_RATE => Self::SetDivisionRate,
            CONFIRM => Self::Confirm,
            CHANGE_BAUD_RATE => Self::ChangeBaudRate,
            other => Self::Telemetry(other),
        }
    }

    /// The wire tag for this kind.
    pub fn tag(self) -> u8 {
        match self {
            Self::Test => TEST,
            Self::SetDivisionRate => SET_DIVISION_RATE,
            Self::Confirm => CONFIRM,
            Self::ChangeBaudRate => CHANGE_BAUD_RATE,
            Self::Telemetry(tag) => tag,
        }
    }

    /// Returns true for the four link protocol commands.
    pub fn is_protocol(self) -> bool {
        !matches!(self, Self::Telemetry(_))
    }

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Test => "TEST",
            Self::SetDivisionRate => "SET_DIVISION_RATE",
            Self::Confirm => "CONFIRM",
            Self::ChangeBaudRate => "CHANGE_BAUD_RATE",
            Self::Telemetry(_) => "TELEMETRY",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.tag())
    }
}

/// A protocol command together with its decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Empty payload.
    Test,
    /// Payload: new division rate, `u16` little-endian.
    SetDivisionRate(u16),
    /// Payload: tag of the confirmed command, or empty.
    Confirm(Option<CommandKind>),
    /// Payload: target baud-rate table index.
    ChangeBaudRate(u8),
}

impl Command {
    /// Kind (and wire tag) of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Test => CommandKind::Test,
            Self::SetDivisionRate(_) => CommandKind::SetDivisionRate,
            Self::Confirm(_) => CommandKind::Confirm,
            Self::ChangeBaudRate(_) => CommandKind::ChangeBaudRate,
        }
    }

    /// Encoded payload bytes.
    pub fn payload(&self) -> Bytes {
        match self {
            Self::Test | Self::Confirm(None) => Bytes::new(),
            Self::SetDivisionRate(rate) => Bytes::copy_from_slice(&rate.to_le_bytes()),
            Self::Confirm(Some(kind)) => Bytes::copy_from_slice(&[kind.tag()]),
            Self::ChangeBaudRate(index) => Bytes::copy_from_slice(&[*index]),
        }
    }

    /// Interpret a decoded frame as a protocol command.
    ///
    /// Returns `None` for telemetry frames and for protocol frames whose
    /// payload does not have the expected shape.
    pub fn parse(frame: &Frame) -> Option<Self> {
        let payload = frame.payload.as_ref();
        match frame.command {
            CommandKind::Test => payload.is_empty().then_some(Self::Test),
            CommandKind::SetDivisionRate => match payload {
                [lo, hi] => Some(Self::SetDivisionRate(u16::from_le_bytes([*lo, *hi]))),
                _ => None,
            },
            CommandKind::Confirm => match payload {
                [] => Some(Self::Confirm(None)),
                [tag] => Some(Self::Confirm(Some(CommandKind::from_tag(*tag)))),
                _ => None,
            },
            CommandKind::ChangeBaudRate => match payload {
                [index] => Some(Self::ChangeBaudRate(*index)),
                _ => None,
            },
            CommandKind::Telemetry(_) => None,
        }
    }
}
