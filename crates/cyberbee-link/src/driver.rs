use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cyberbee_transport::{ByteChannel, SerialChannel, TransportError};
use tracing::{debug, warn};

use crate::config::{BaudRateTable, LinkConfig};
use crate::error::{LinkError, Result};
use crate::ingress::IngressBuffer;
use crate::negotiator::{CommandOutcome, LinkNegotiator, LinkRequest, LinkState};
use crate::processor::{FrameProcessor, Request};
use crate::reader::StreamReader;
use crate::sender::CommandSender;
use crate::sink::TelemetrySink;
use crate::status::{LinkStats, LinkStatus};
use crate::stop::StopToken;

/// Driver context: owns the channel, the ingress buffer and both loops.
///
/// Dropping the driver stops and joins the loops; call
/// [`shutdown`](Self::shutdown) to observe how they ended.
pub struct LinkDriver {
    status: Arc<LinkStatus>,
    sender: CommandSender,
    requests: mpsc::Sender<Request>,
    ingress: Arc<IngressBuffer>,
    stop: StopToken,
    table: BaudRateTable,
    reader: Option<JoinHandle<std::result::Result<(), TransportError>>>,
    processor: Option<JoinHandle<Result<()>>>,
}

impl LinkDriver {
    /// Open a serial device at the first candidate rate and start the link.
    pub fn open<S>(path: &str, config: LinkConfig, sink: S) -> Result<Self>
    where
        S: TelemetrySink + 'static,
    {
        config.validate()?;
        let channel =
            SerialChannel::open_with_timeout(path, config.baud_rates.first(), config.read_timeout)?;
        Self::start(Box::new(channel), config, sink)
    }

    /// Start the link over an already open channel.
    ///
    /// The channel must honor the time-bounded read contract of
    /// [`ByteChannel::read`].
    pub fn start<S>(channel: Box<dyn ByteChannel>, config: LinkConfig, sink: S) -> Result<Self>
    where
        S: TelemetrySink + 'static,
    {
        config.validate()?;

        let read_half = channel.try_clone_channel()?;
        let sender = CommandSender::new(channel, config.listen_only);
        if config.listen_only && sender.baud_rate() != config.baud_rates.first() {
            sender.set_baud_rate(config.baud_rates.first())?;
        }

        let negotiator = LinkNegotiator::new(&config);
        let status = Arc::new(LinkStatus::new(negotiator.state().clone()));
        let ingress = Arc::new(IngressBuffer::new(config.ingress_capacity));
        let stop = StopToken::new();
        let (requests, request_rx) = mpsc::channel();

        let reader = StreamReader::new(
            read_half,
            Arc::clone(&ingress),
            Arc::clone(&status),
            stop.clone(),
            config.idle_wait,
        );
        let processor = FrameProcessor::new(
            Arc::clone(&ingress),
            negotiator,
            sender.clone(),
            Box::new(sink),
            request_rx,
            Arc::clone(&status),
            stop.clone(),
            config.max_payload,
            config.idle_wait,
        );

        let reader = thread::Builder::new()
            .name("cyberbee-reader".to_string())
            .spawn(move || reader.run())
            .map_err(TransportError::from)?;
        let processor = match thread::Builder::new()
            .name("cyberbee-processor".to_string())
            .spawn(move || processor.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                stop.stop();
                ingress.notify();
                let _ = reader.join();
                return Err(TransportError::from(e).into());
            }
        };

        debug!(listen_only = config.listen_only, "link driver started");
        Ok(Self {
            status,
            sender,
            requests,
            ingress,
            stop,
            table: config.baud_rates,
            reader: Some(reader),
            processor: Some(processor),
        })
    }

    /// Snapshot of the link state.
    pub fn state(&self) -> LinkState {
        self.status.state()
    }

    /// Shared status handle, usable after the driver moves.
    pub fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> LinkStats {
        self.status.stats()
    }

    /// Block until the link is usable (established or passive).
    ///
    /// Returns [`LinkError::LinkFailed`] once every candidate rate has
    /// been exhausted.
    pub fn wait_established(&self, timeout: Duration) -> Result<LinkState> {
        let state = self.status.wait_until(timeout, |state| {
            state.is_operational() || *state == LinkState::Failed
        })?;
        if state == LinkState::Failed {
            return Err(LinkError::LinkFailed {
                tried: self.table.len(),
            });
        }
        Ok(state)
    }

    /// Ask the remote to change its division rate.
    ///
    /// Blocks until the Confirm arrives or the confirm timeout passes. The
    /// division rate in [`state`](Self::state) changes only on Confirm.
    pub fn set_division_rate(&self, rate: u16) -> Result<CommandOutcome> {
        self.request(LinkRequest::SetDivisionRate(rate))
    }

    /// Ask the remote to switch to the rate at `index` in the table.
    ///
    /// The local rate follows only after the remote confirms. Without a
    /// Confirm the link re-probes from the first rate.
    pub fn change_baud_rate(&self, index: usize) -> Result<CommandOutcome> {
        self.request(LinkRequest::ChangeBaudRate(index))
    }

    /// A handle for sending raw commands outside the request path.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Token that stops both loops when tripped.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// The candidate table in use.
    pub fn baud_rates(&self) -> &BaudRateTable {
        &self.table
    }

    /// Stop both loops, join them and release the channel.
    ///
    /// Returns the first error either loop ended with.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn request(&self, request: LinkRequest) -> Result<CommandOutcome> {
        if self.stop.is_stopped() {
            return Err(LinkError::Stopped);
        }

        let (reply, outcome) = mpsc::channel();
        self.requests
            .send(Request { request, reply })
            .map_err(|_| self.ended())?;
        self.ingress.notify();

        outcome.recv().map_err(|_| self.ended())?
    }

    /// Error for a request whose processor went away.
    fn ended(&self) -> LinkError {
        match self.status.fault() {
            Some(fault) => LinkError::Fault(fault),
            None => LinkError::Stopped,
        }
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop.stop();
        self.ingress.notify();

        let mut first_error = None;
        if let Some(reader) = self.reader.take() {
            match reader.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(LinkError::Transport(e));
                }
                Err(_) => {
                    warn!("stream reader panicked");
                    first_error
                        .get_or_insert(LinkError::Fault("stream reader panicked".to_string()));
                }
            }
        }
        if let Some(processor) = self.processor.take() {
            match processor.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    warn!("frame processor panicked");
                    first_error
                        .get_or_insert(LinkError::Fault("frame processor panicked".to_string()));
                }
            }
        }

        debug!(state = %self.status.state(), "link driver stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for LinkDriver {
    fn drop(&mut self) {
        if self.reader.is_some() || self.processor.is_some() {
            let _ = self.stop_and_join();
        }
    }
}

impl std::fmt::Debug for LinkDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkDriver")
            .field("state", &self.status.state())
            .field("sender", &self.sender)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}
