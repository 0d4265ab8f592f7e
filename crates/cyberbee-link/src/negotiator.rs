use std::fmt;
use std::time::{Duration, Instant};

use cyberbee_frame::{Command, CommandKind, Frame};
use tracing::{debug, info, warn};

use crate::config::{BaudRateTable, LinkConfig};
use crate::error::{LinkError, Result};

/// Current mode of the negotiation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// About to probe the rate at `index`.
    Probing { index: usize },
    /// Test sent at the rate at `index`; waiting for Confirm.
    AwaitingConfirm { index: usize },
    /// Handshake complete.
    Established { baud_rate: u32, division_rate: u16 },
    /// Listen-only: decoding telemetry without ever transmitting.
    Passive { baud_rate: u32 },
    /// Every candidate rate failed. Terminal.
    Failed,
}

impl LinkState {
    /// Returns true once the handshake has completed.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Established { .. })
    }

    /// Returns true if telemetry is being delivered (established or passive).
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Established { .. } | Self::Passive { .. })
    }

    /// Line rate in use, once known.
    pub fn baud_rate(&self) -> Option<u32> {
        match self {
            Self::Established { baud_rate, .. } | Self::Passive { baud_rate } => Some(*baud_rate),
            _ => None,
        }
    }

    /// Confirmed division rate, if established.
    pub fn division_rate(&self) -> Option<u16> {
        match self {
            Self::Established { division_rate, .. } => Some(*division_rate),
            _ => None,
        }
    }

    /// Short lowercase name, used in logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Probing { .. } => "probing",
            Self::AwaitingConfirm { .. } => "awaiting-confirm",
            Self::Established { .. } => "established",
            Self::Passive { .. } => "passive",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing { index } => write!(f, "probing (index {index})"),
            Self::AwaitingConfirm { index } => write!(f, "awaiting confirm (index {index})"),
            Self::Established {
                baud_rate,
                division_rate,
            } => write!(f, "established at {baud_rate} baud, division {division_rate}"),
            Self::Passive { baud_rate } => write!(f, "passive at {baud_rate} baud"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Side effects the negotiator needs from the link.
pub trait LinkPort {
    /// Encode and transmit one command.
    fn send(&mut self, command: &Command) -> Result<()>;

    /// Reconfigure the local line rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;
}

/// Command an external caller asks the established link to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequest {
    SetDivisionRate(u16),
    /// Index into the baud rate table.
    ChangeBaudRate(usize),
}

impl LinkRequest {
    fn kind(self) -> CommandKind {
        match self {
            Self::SetDivisionRate(_) => CommandKind::SetDivisionRate,
            Self::ChangeBaudRate(_) => CommandKind::ChangeBaudRate,
        }
    }
}

/// How a submitted command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The remote confirmed and the change was applied.
    Confirmed,
    /// No Confirm within the timeout; nothing was applied.
    TimedOut,
}

#[derive(Debug)]
struct Pending {
    request: LinkRequest,
    deadline: Instant,
}

/// Baud-rate discovery and the command/Confirm state machine.
///
/// Fully deterministic: time is passed in and side effects go through a
/// [`LinkPort`], so it runs the same under test as inside the processor.
/// Each call to [`poll`](Self::poll) performs at most one transition.
#[derive(Debug)]
pub struct LinkNegotiator {
    table: BaudRateTable,
    confirm_timeout: Duration,
    initial_division_rate: u16,
    state: LinkState,
    /// Deadline of the outstanding Test.
    deadline: Option<Instant>,
    pending: Option<Pending>,
    outcome: Option<CommandOutcome>,
}

impl LinkNegotiator {
    /// Create a negotiator in its initial state.
    ///
    /// Listen-only configurations start (and stay) passive at the first
    /// table rate.
    pub fn new(config: &LinkConfig) -> Self {
        let state = if config.listen_only {
            LinkState::Passive {
                baud_rate: config.baud_rates.first(),
            }
        } else {
            LinkState::Probing { index: 0 }
        };

        Self {
            table: config.baud_rates.clone(),
            confirm_timeout: config.confirm_timeout,
            initial_division_rate: config.initial_division_rate,
            state,
            deadline: None,
            pending: None,
            outcome: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// The candidate table being probed.
    pub fn table(&self) -> &BaudRateTable {
        &self.table
    }

    /// The command awaiting Confirm, if any.
    pub fn pending(&self) -> Option<LinkRequest> {
        self.pending.as_ref().map(|p| p.request)
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    ///
    /// `None` means nothing is time-bound. A probing state needs an
    /// immediate poll and reports `Some(Instant)` in the past.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        match &self.state {
            LinkState::Probing { .. } => Some(now),
            LinkState::AwaitingConfirm { .. } => self.deadline,
            LinkState::Established { .. } => self.pending.as_ref().map(|p| p.deadline),
            LinkState::Passive { .. } | LinkState::Failed => None,
        }
    }

    /// Take the outcome of the most recently finished command.
    pub fn take_outcome(&mut self) -> Option<CommandOutcome> {
        self.outcome.take()
    }

    /// Advance time-driven transitions.
    ///
    /// Returns true if the state changed.
    pub fn poll<P: LinkPort + ?Sized>(&mut self, now: Instant, port: &mut P) -> Result<bool> {
        match self.state {
            LinkState::Probing { index } => {
                let Some(baud_rate) = self.table.get(index) else {
                    self.state = LinkState::Failed;
                    return Ok(true);
                };
                debug!(index, baud_rate, "probing baud rate");
                port.set_baud_rate(baud_rate)?;
                port.send(&Command::Test)?;
                self.deadline = Some(now + self.confirm_timeout);
                self.state = LinkState::AwaitingConfirm { index };
                Ok(true)
            }
            LinkState::AwaitingConfirm { index } => {
                if self.deadline.is_some_and(|deadline| now < deadline) {
                    return Ok(false);
                }
                self.deadline = None;
                if index + 1 < self.table.len() {
                    debug!(index, "no confirm, trying next baud rate");
                    self.state = LinkState::Probing { index: index + 1 };
                } else {
                    warn!(tried = self.table.len(), "no confirm at any baud rate");
                    self.state = LinkState::Failed;
                }
                Ok(true)
            }
            LinkState::Established { .. } => {
                let expired = self
                    .pending
                    .as_ref()
                    .is_some_and(|pending| now >= pending.deadline);
                if !expired {
                    return Ok(false);
                }
                let Some(pending) = self.pending.take() else {
                    return Ok(false);
                };
                self.outcome = Some(CommandOutcome::TimedOut);
                match pending.request {
                    LinkRequest::SetDivisionRate(rate) => {
                        warn!(rate, "set division rate not confirmed");
                        Ok(false)
                    }
                    LinkRequest::ChangeBaudRate(index) => {
                        warn!(index, "baud rate change not confirmed, re-probing");
                        self.state = LinkState::Probing { index: 0 };
                        Ok(true)
                    }
                }
            }
            LinkState::Passive { .. } | LinkState::Failed => Ok(false),
        }
    }

    /// Feed one decoded protocol frame.
    ///
    /// Only Confirm frames matter; anything else the remote sends on a
    /// protocol tag is logged and ignored. Returns true if the state changed.
    pub fn handle_frame<P: LinkPort + ?Sized>(
        &mut self,
        frame: &Frame,
        now: Instant,
        port: &mut P,
    ) -> Result<bool> {
        let Some(Command::Confirm(echo)) = Command::parse(frame) else {
            debug!(command = %frame.command, "ignoring protocol frame from remote");
            return Ok(false);
        };

        match self.state {
            LinkState::AwaitingConfirm { index } => {
                if !confirms(echo, CommandKind::Test) {
                    debug!(?echo, "confirm does not match outstanding test");
                    return Ok(false);
                }
                if self.deadline.is_some_and(|deadline| now >= deadline) {
                    debug!(index, "confirm arrived after the deadline");
                    return Ok(false);
                }
                let Some(baud_rate) = self.table.get(index) else {
                    return Ok(false);
                };
                self.deadline = None;
                self.state = LinkState::Established {
                    baud_rate,
                    division_rate: self.initial_division_rate,
                };
                info!(baud_rate, "link established");
                Ok(true)
            }
            LinkState::Established {
                baud_rate,
                division_rate,
            } => {
                let Some(pending) = self.pending.as_ref() else {
                    debug!(?echo, "confirm with no command outstanding");
                    return Ok(false);
                };
                if !confirms(echo, pending.request.kind()) {
                    debug!(?echo, "confirm does not match outstanding command");
                    return Ok(false);
                }
                if now >= pending.deadline {
                    debug!(request = ?pending.request, "confirm arrived after the command timed out");
                    return Ok(false);
                }
                let request = pending.request;
                self.pending = None;
                self.outcome = Some(CommandOutcome::Confirmed);

                match request {
                    LinkRequest::SetDivisionRate(rate) => {
                        info!(division_rate = rate, "division rate confirmed");
                        self.state = LinkState::Established {
                            baud_rate,
                            division_rate: rate,
                        };
                    }
                    LinkRequest::ChangeBaudRate(index) => {
                        let Some(target) = self.table.get(index) else {
                            return Ok(false);
                        };
                        port.set_baud_rate(target)?;
                        info!(from = baud_rate, to = target, "baud rate changed");
                        self.state = LinkState::Established {
                            baud_rate: target,
                            division_rate,
                        };
                    }
                }
                Ok(true)
            }
            _ => {
                debug!(state = %self.state, "ignoring confirm");
                Ok(false)
            }
        }
    }

    /// Send a command on the established link.
    ///
    /// The change is applied only once the matching Confirm arrives; the
    /// result is reported through [`take_outcome`](Self::take_outcome).
    pub fn submit<P: LinkPort + ?Sized>(
        &mut self,
        request: LinkRequest,
        now: Instant,
        port: &mut P,
    ) -> Result<()> {
        match &self.state {
            LinkState::Established { .. } => {}
            LinkState::Passive { .. } => return Err(LinkError::ListenOnly),
            other => return Err(LinkError::NotEstablished(other.clone())),
        }
        if self.pending.is_some() {
            return Err(LinkError::CommandInFlight);
        }

        let command = match request {
            LinkRequest::SetDivisionRate(rate) => Command::SetDivisionRate(rate),
            LinkRequest::ChangeBaudRate(index) => {
                if index >= self.table.len() {
                    return Err(LinkError::InvalidBaudIndex {
                        index,
                        len: self.table.len(),
                    });
                }
                // Table length is capped at 256, so the index fits a byte.
                Command::ChangeBaudRate(index as u8)
            }
        };

        port.send(&command)?;
        debug!(?request, "command sent, awaiting confirm");
        self.pending = Some(Pending {
            request,
            deadline: now + self.confirm_timeout,
        });
        Ok(())
    }
}

/// An empty Confirm acknowledges whatever is outstanding.
fn confirms(echo: Option<CommandKind>, expected: CommandKind) -> bool {
    echo.is_none_or(|kind| kind == expected)
}
