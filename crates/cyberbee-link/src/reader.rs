use std::sync::Arc;
use std::time::Duration;

use cyberbee_transport::{ByteChannel, TransportError};
use tracing::{debug, trace, warn};

use crate::ingress::IngressBuffer;
use crate::status::LinkStatus;
use crate::stop::StopToken;

/// Size of a single channel read.
pub const READ_CHUNK_SIZE: usize = 256;

/// Read-side loop: pulls bytes from the channel into the ingress buffer.
pub struct StreamReader {
    channel: Box<dyn ByteChannel>,
    ingress: Arc<IngressBuffer>,
    status: Arc<LinkStatus>,
    stop: StopToken,
    /// Bound on each wait for buffer space.
    wait: Duration,
}

impl StreamReader {
    pub fn new(
        channel: Box<dyn ByteChannel>,
        ingress: Arc<IngressBuffer>,
        status: Arc<LinkStatus>,
        stop: StopToken,
        wait: Duration,
    ) -> Self {
        Self {
            channel,
            ingress,
            status,
            stop,
            wait,
        }
    }

    /// Run until stopped or the channel fails.
    ///
    /// Reads are time-bounded by the channel, so a stop request is seen
    /// within one read timeout. A transport error is recorded on the
    /// status, the processor is woken, and the error is returned; there
    /// is no retry.
    pub fn run(mut self) -> Result<(), TransportError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        debug!(channel = %self.channel.describe(), "stream reader started");

        while !self.stop.is_stopped() {
            let n = match self.channel.read(&mut chunk) {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "channel read failed, stream reader exiting");
                    self.status.record_fault(e.to_string());
                    self.ingress.notify();
                    return Err(e);
                }
            };
            if n == 0 {
                continue;
            }

            trace!(bytes = n, "read");
            self.status.add_received(n);
            if !self.ingress.append(&chunk[..n], &self.stop, self.wait) {
                break;
            }
        }

        debug!("stream reader stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::negotiator::LinkState;

    /// Hands out scripted reads, then times out forever.
    struct ScriptedChannel {
        reads: VecDeque<cyberbee_transport::Result<Vec<u8>>>,
        timeout: Duration,
    }

    impl ByteChannel for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> cyberbee_transport::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(self.timeout);
                    Ok(0)
                }
            }
        }

        fn write_all(&mut self, _bytes: &[u8]) -> cyberbee_transport::Result<()> {
            Ok(())
        }

        fn set_baud_rate(&mut self, _baud_rate: u32) -> cyberbee_transport::Result<()> {
            Ok(())
        }

        fn baud_rate(&self) -> u32 {
            9600
        }

        fn try_clone_channel(&self) -> cyberbee_transport::Result<Box<dyn ByteChannel>> {
            Err(TransportError::Closed)
        }
    }

    fn reader(
        reads: Vec<cyberbee_transport::Result<Vec<u8>>>,
    ) -> (StreamReader, Arc<IngressBuffer>, Arc<LinkStatus>, StopToken) {
        let ingress = Arc::new(IngressBuffer::new(1024));
        let status = Arc::new(LinkStatus::new(LinkState::Probing { index: 0 }));
        let stop = StopToken::new();
        let channel = ScriptedChannel {
            reads: reads.into(),
            timeout: Duration::from_millis(20),
        };
        let reader = StreamReader::new(
            Box::new(channel),
            Arc::clone(&ingress),
            Arc::clone(&status),
            stop.clone(),
            Duration::from_millis(10),
        );
        (reader, ingress, status, stop)
    }

    #[test]
    fn appends_reads_in_order() {
        let (reader, ingress, status, stop) =
            reader(vec![Ok(vec![1, 2, 3]), Ok(vec![4, 5])]);
        let handle = thread::spawn(move || reader.run());

        let start = Instant::now();
        while ingress.len() < 5 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        stop.stop();
        handle.join().unwrap().unwrap();

        assert_eq!(ingress.len(), 5);
        assert_eq!(status.stats().bytes_received, 5);
    }

    #[test]
    fn read_error_ends_loop_and_records_fault() {
        let (reader, _ingress, status, _stop) = reader(vec![
            Ok(vec![0xAA]),
            Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
        ]);

        let err = reader.run().unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(status.fault().unwrap().contains("device unplugged"));
    }

    #[test]
    fn stop_exits_within_one_read_timeout() {
        let (reader, _ingress, _status, stop) = reader(Vec::new());
        let handle = thread::spawn(move || reader.run());

        thread::sleep(Duration::from_millis(30));
        let requested = Instant::now();
        stop.stop();
        handle.join().unwrap().unwrap();
        assert!(requested.elapsed() < Duration::from_millis(500));
    }
}
