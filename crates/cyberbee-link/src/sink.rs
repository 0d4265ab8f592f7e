use std::sync::mpsc;

use cyberbee_frame::Frame;

/// Destination for decoded telemetry frames.
///
/// Called once per telemetry frame after the link is established (or in
/// listen-only mode). The driver does not care how frames travel further.
pub trait TelemetrySink: Send {
    fn publish(&mut self, frame: Frame);
}

impl TelemetrySink for mpsc::Sender<Frame> {
    fn publish(&mut self, frame: Frame) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(frame);
    }
}

/// Sink that drops every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl TelemetrySink for DiscardSink {
    fn publish(&mut self, _frame: Frame) {}
}
