use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cyberbee_frame::{Command, Frame};
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::ingress::IngressBuffer;
use crate::negotiator::{CommandOutcome, LinkNegotiator, LinkPort, LinkRequest};
use crate::sender::CommandSender;
use crate::sink::TelemetrySink;
use crate::status::LinkStatus;
use crate::stop::StopToken;

/// Reply channel for one submitted command.
pub type Reply = mpsc::Sender<Result<CommandOutcome>>;

/// A command queued for the processor thread.
#[derive(Debug)]
pub struct Request {
    pub request: LinkRequest,
    pub reply: Reply,
}

/// Decode-side loop: turns buffered bytes into frames and routes them.
///
/// Owns the negotiator, so every state transition happens on this thread.
pub struct FrameProcessor {
    ingress: Arc<IngressBuffer>,
    negotiator: LinkNegotiator,
    sender: CommandSender,
    sink: Box<dyn TelemetrySink>,
    requests: Receiver<Request>,
    status: Arc<LinkStatus>,
    stop: StopToken,
    max_payload: usize,
    idle_wait: Duration,
    in_flight: Option<Reply>,
}

impl FrameProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ingress: Arc<IngressBuffer>,
        negotiator: LinkNegotiator,
        sender: CommandSender,
        sink: Box<dyn TelemetrySink>,
        requests: Receiver<Request>,
        status: Arc<LinkStatus>,
        stop: StopToken,
        max_payload: usize,
        idle_wait: Duration,
    ) -> Self {
        Self {
            ingress,
            negotiator,
            sender,
            sink,
            requests,
            status,
            stop,
            max_payload,
            idle_wait,
            in_flight: None,
        }
    }

    /// Run until stopped or a transport fault ends the loop.
    ///
    /// Each cycle waits at most `idle_wait` (or until the next confirm
    /// deadline), so a stop request is seen within one cycle.
    pub fn run(mut self) -> Result<()> {
        debug!(state = %self.negotiator.state(), "frame processor started");
        self.status.publish(self.negotiator.state());

        let result = self.run_loop();
        if let Err(e) = &result {
            warn!(error = %e, "frame processor exiting on fault");
            self.status.record_fault(e.to_string());
            self.fail_in_flight(e);
        }
        self.status.close();
        debug!("frame processor stopped");
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            if self.stop.is_stopped() || self.status.fault().is_some() {
                return Ok(());
            }

            self.drain_requests();

            // Buffered frames belong to the current rate: judge them before a
            // timeout can switch rates.
            let seen = self.ingress.generation();
            let drained = self.ingress.take_frames(self.max_payload);
            self.status
                .add_decoded(drained.frames.len(), drained.discarded);
            if drained.discarded > 0 {
                trace!(bytes = drained.discarded, "discarded while resynchronizing");
            }
            for frame in drained.frames {
                self.route(frame)?;
            }
            self.advance()?;

            self.status.publish(self.negotiator.state());
            self.finish_command();

            let now = Instant::now();
            let wait = match self.negotiator.next_deadline(now) {
                Some(deadline) => deadline.saturating_duration_since(now).min(self.idle_wait),
                None => self.idle_wait,
            };
            if !wait.is_zero() {
                self.ingress.wait_for_data(seen, wait);
            }
        }
    }

    /// Run time-driven transitions until the state settles for now.
    fn advance(&mut self) -> Result<()> {
        let mut port = LinePort {
            sender: &self.sender,
            ingress: &self.ingress,
            status: &self.status,
        };
        while self.negotiator.poll(Instant::now(), &mut port)? {
            self.status.publish(self.negotiator.state());
        }
        self.finish_command();
        Ok(())
    }

    fn route(&mut self, frame: Frame) -> Result<()> {
        if frame.command.is_protocol() {
            let mut port = LinePort {
                sender: &self.sender,
                ingress: &self.ingress,
                status: &self.status,
            };
            self.negotiator
                .handle_frame(&frame, Instant::now(), &mut port)?;
            return Ok(());
        }

        if self.negotiator.state().is_operational() {
            self.status.add_published();
            self.sink.publish(frame);
        } else {
            trace!(command = %frame.command, "telemetry before handshake dropped");
            self.status.add_dropped();
        }
        Ok(())
    }

    fn drain_requests(&mut self) {
        loop {
            let Ok(Request { request, reply }) = self.requests.try_recv() else {
                return;
            };

            match self
                .negotiator
                .submit(request, Instant::now(), &mut self.sender)
            {
                Ok(()) => self.in_flight = Some(reply),
                Err(e) => {
                    debug!(?request, error = %e, "command rejected");
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    fn finish_command(&mut self) {
        if let Some(outcome) = self.negotiator.take_outcome() {
            if let Some(reply) = self.in_flight.take() {
                let _ = reply.send(Ok(outcome));
            }
        }
    }

    fn fail_in_flight(&mut self, error: &LinkError) {
        if let Some(reply) = self.in_flight.take() {
            let _ = reply.send(Err(LinkError::Fault(error.to_string())));
        }
    }
}

/// The processor's view of the line.
///
/// A rate switch drops whatever was buffered at the old rate before anything
/// is sent at the new one, so stale noise cannot hold up the reply.
struct LinePort<'a> {
    sender: &'a CommandSender,
    ingress: &'a IngressBuffer,
    status: &'a LinkStatus,
}

impl LinkPort for LinePort<'_> {
    fn send(&mut self, command: &Command) -> Result<()> {
        self.sender.send(command)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.sender.set_baud_rate(baud_rate)?;
        let dropped = self.ingress.clear();
        if dropped > 0 {
            self.status.add_decoded(0, dropped);
            trace!(bytes = dropped, baud_rate, "dropped bytes received at the previous rate");
        }
        Ok(())
    }
}
