use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use cyberbee_frame::{encode_frame, Command, CommandKind, CHECKSUM_SIZE, HEADER_SIZE};
use cyberbee_transport::ByteChannel;
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::negotiator::LinkPort;

/// Encodes and transmits command frames.
///
/// Cloning is cheap; every clone writes through the same lock, so frames
/// from concurrent callers never interleave. Sends never wait on the read
/// side.
#[derive(Clone)]
pub struct CommandSender {
    channel: Arc<Mutex<Box<dyn ByteChannel>>>,
    listen_only: bool,
}

impl CommandSender {
    /// Wrap the write half of a channel.
    pub fn new(channel: Box<dyn ByteChannel>, listen_only: bool) -> Self {
        Self {
            channel: Arc::new(Mutex::new(channel)),
            listen_only,
        }
    }

    /// Encode and write one command frame.
    pub fn send(&self, command: &Command) -> Result<()> {
        self.send_raw(command.kind(), &command.payload())
    }

    /// Encode and write a frame of any kind.
    pub fn send_raw(&self, kind: CommandKind, payload: &[u8]) -> Result<()> {
        if self.listen_only {
            return Err(LinkError::ListenOnly);
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
        encode_frame(kind, payload, &mut buf)?;

        let mut channel = self.lock();
        channel.write_all(&buf)?;
        debug!(command = %kind, bytes = buf.len(), "sent frame");
        Ok(())
    }

    /// Send `Test`.
    pub fn send_test(&self) -> Result<()> {
        self.send(&Command::Test)
    }

    /// Send `SetDivisionRate(rate)`.
    pub fn send_set_division_rate(&self, rate: u16) -> Result<()> {
        self.send(&Command::SetDivisionRate(rate))
    }

    /// Send `Confirm` echoing `confirmed`.
    pub fn send_confirm(&self, confirmed: CommandKind) -> Result<()> {
        self.send(&Command::Confirm(Some(confirmed)))
    }

    /// Send `ChangeBaudRate(index)`.
    pub fn send_change_baud_rate(&self, index: u8) -> Result<()> {
        self.send(&Command::ChangeBaudRate(index))
    }

    /// Reconfigure the local line rate.
    ///
    /// Allowed in listen-only mode: it does not transmit anything.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.lock().set_baud_rate(baud_rate)?;
        Ok(())
    }

    /// Currently configured local line rate.
    pub fn baud_rate(&self) -> u32 {
        self.lock().baud_rate()
    }

    /// Returns true if transmission is disabled.
    pub fn is_listen_only(&self) -> bool {
        self.listen_only
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ByteChannel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LinkPort for CommandSender {
    fn send(&mut self, command: &Command) -> Result<()> {
        CommandSender::send(self, command)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        CommandSender::set_baud_rate(self, baud_rate)
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("channel", &self.lock().describe())
            .field("listen_only", &self.listen_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::BytesMut;
    use cyberbee_frame::drain_frames;
    use cyberbee_transport::TransportError;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingChannel {
        written: Arc<Mutex<Vec<u8>>>,
        baud: Arc<Mutex<u32>>,
        fail_writes: bool,
    }

    impl ByteChannel for RecordingChannel {
        fn read(&mut self, _buf: &mut [u8]) -> cyberbee_transport::Result<usize> {
            Ok(0)
        }

        fn write_all(&mut self, bytes: &[u8]) -> cyberbee_transport::Result<()> {
            if self.fail_writes {
                return Err(TransportError::Closed);
            }
            // Two chunks per frame widen the window for interleaving bugs.
            let (head, tail) = bytes.split_at(bytes.len() / 2);
            self.written.lock().unwrap().extend_from_slice(head);
            thread::yield_now();
            self.written.lock().unwrap().extend_from_slice(tail);
            Ok(())
        }

        fn set_baud_rate(&mut self, baud_rate: u32) -> cyberbee_transport::Result<()> {
            *self.baud.lock().unwrap() = baud_rate;
            Ok(())
        }

        fn baud_rate(&self) -> u32 {
            *self.baud.lock().unwrap()
        }

        fn try_clone_channel(&self) -> cyberbee_transport::Result<Box<dyn ByteChannel>> {
            Ok(Box::new(self.clone()))
        }
    }

    fn decode_written(channel: &RecordingChannel) -> Vec<cyberbee_frame::Frame> {
        let mut buf = BytesMut::from(channel.written.lock().unwrap().as_slice());
        drain_frames(&mut buf, 1024).frames
    }

    #[test]
    fn sends_typed_commands() {
        let channel = RecordingChannel::default();
        let sender = CommandSender::new(Box::new(channel.clone()), false);

        sender.send_test().unwrap();
        sender.send_set_division_rate(7).unwrap();
        sender.send_confirm(CommandKind::Test).unwrap();
        sender.send_change_baud_rate(3).unwrap();

        let commands: Vec<_> = decode_written(&channel)
            .iter()
            .map(|f| Command::parse(f).unwrap())
            .collect();
        assert_eq!(
            commands,
            vec![
                Command::Test,
                Command::SetDivisionRate(7),
                Command::Confirm(Some(CommandKind::Test)),
                Command::ChangeBaudRate(3),
            ]
        );
    }

    #[test]
    fn listen_only_refuses_to_send() {
        let channel = RecordingChannel::default();
        let sender = CommandSender::new(Box::new(channel.clone()), true);

        let err = sender.send_test().unwrap_err();
        assert!(matches!(err, LinkError::ListenOnly));
        assert!(channel.written.lock().unwrap().is_empty());

        sender.set_baud_rate(38400).unwrap();
        assert_eq!(sender.baud_rate(), 38400);
    }

    #[test]
    fn write_failure_is_reported() {
        let channel = RecordingChannel {
            fail_writes: true,
            ..RecordingChannel::default()
        };
        let sender = CommandSender::new(Box::new(channel), false);

        let err = sender.send_test().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Transport(TransportError::Closed)
        ));
    }

    #[test]
    fn concurrent_sends_do_not_interleave() {
        let channel = RecordingChannel::default();
        let sender = CommandSender::new(Box::new(channel.clone()), false);

        let workers: Vec<_> = (0..4u16)
            .map(|worker| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for i in 0..50u16 {
                        sender.send_set_division_rate(worker * 100 + i).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let frames = decode_written(&channel);
        assert_eq!(frames.len(), 200);
        for worker in 0..4u16 {
            let rates: Vec<u16> = frames
                .iter()
                .filter_map(|f| match Command::parse(f) {
                    Some(Command::SetDivisionRate(rate)) if rate / 100 == worker => Some(rate),
                    _ => None,
                })
                .collect();
            let expected: Vec<u16> = (0..50).map(|i| worker * 100 + i).collect();
            assert_eq!(rates, expected);
        }
    }
}
