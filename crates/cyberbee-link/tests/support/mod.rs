//! In-process stand-in for the remote controller.
//!
//! The host side is a [`ByteChannel`] over one end of a Unix socket pair.
//! The remote thread holds the other end, decodes what the host sends and
//! answers like the firmware would, but only while both sides agree on the
//! line rate.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use cyberbee_frame::{drain_frames, encode_frame, Command, CommandKind, DEFAULT_MAX_PAYLOAD};
use cyberbee_transport::{ByteChannel, TransportError};

pub const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Host end of the simulated line.
pub struct HostChannel {
    stream: UnixStream,
    baud: Arc<AtomicU32>,
}

impl ByteChannel for HostChannel {
    fn read(&mut self, buf: &mut [u8]) -> cyberbee_transport::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> cyberbee_transport::Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> cyberbee_transport::Result<()> {
        self.baud.store(baud_rate, Ordering::SeqCst);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud.load(Ordering::SeqCst)
    }

    fn try_clone_channel(&self) -> cyberbee_transport::Result<Box<dyn ByteChannel>> {
        Ok(Box::new(HostChannel {
            stream: self.stream.try_clone()?,
            baud: Arc::clone(&self.baud),
        }))
    }

    fn describe(&self) -> String {
        "simulated-line".to_string()
    }
}

/// How the simulated remote behaves.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Rate the remote listens at.
    pub baud_rate: u32,
    /// Answer Test with Confirm.
    pub answer_test: bool,
    /// Answer SetDivisionRate and ChangeBaudRate with Confirm.
    pub confirm_commands: bool,
    /// Table used to resolve ChangeBaudRate indices.
    pub table: Vec<u32>,
}

impl RemoteConfig {
    pub fn at(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            answer_test: true,
            confirm_commands: true,
            table: cyberbee_link::DEFAULT_BAUD_RATES.to_vec(),
        }
    }

    pub fn silent() -> Self {
        Self {
            answer_test: false,
            confirm_commands: false,
            ..Self::at(9600)
        }
    }
}

/// The remote controller thread.
pub struct SimulatedRemote {
    writer: Arc<Mutex<UnixStream>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    received: Arc<Mutex<Vec<(u32, Command)>>>,
    remote_baud: Arc<AtomicU32>,
    host_baud: Arc<AtomicU32>,
}

impl SimulatedRemote {
    /// Commands received so far, tagged with the host rate at arrival.
    pub fn received(&self) -> Vec<(u32, Command)> {
        self.received.lock().unwrap().clone()
    }

    /// Rate the remote currently listens at.
    pub fn baud_rate(&self) -> u32 {
        self.remote_baud.load(Ordering::SeqCst)
    }

    /// Rate the host side currently uses.
    pub fn host_baud_rate(&self) -> u32 {
        self.host_baud.load(Ordering::SeqCst)
    }

    /// Transmit one frame towards the host.
    pub fn send(&self, kind: CommandKind, payload: &[u8]) {
        let mut buf = BytesMut::new();
        encode_frame(kind, payload, &mut buf).unwrap();
        self.writer.lock().unwrap().write_all(&buf).unwrap();
    }

    /// Transmit raw bytes towards the host.
    pub fn send_raw(&self, bytes: &[u8]) {
        self.writer.lock().unwrap().write_all(bytes).unwrap();
    }
}

impl Drop for SimulatedRemote {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build a connected host channel and remote.
pub fn line(config: RemoteConfig) -> (HostChannel, SimulatedRemote) {
    let (host, remote) = UnixStream::pair().unwrap();
    host.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    remote.set_read_timeout(Some(READ_TIMEOUT)).unwrap();

    let host_baud = Arc::new(AtomicU32::new(config.table[0]));
    let remote_baud = Arc::new(AtomicU32::new(config.baud_rate));
    let writer = Arc::new(Mutex::new(remote.try_clone().unwrap()));
    let stop = Arc::new(AtomicBool::new(false));
    let received = Arc::new(Mutex::new(Vec::new()));

    let handle = {
        let host_baud = Arc::clone(&host_baud);
        let remote_baud = Arc::clone(&remote_baud);
        let writer = Arc::clone(&writer);
        let stop = Arc::clone(&stop);
        let received = Arc::clone(&received);
        thread::spawn(move || {
            serve(
                remote,
                config,
                Shared {
                    host_baud,
                    remote_baud,
                    writer,
                    stop,
                    received,
                },
            )
        })
    };

    (
        HostChannel {
            stream: host,
            baud: Arc::clone(&host_baud),
        },
        SimulatedRemote {
            writer,
            stop,
            handle: Some(handle),
            received,
            remote_baud,
            host_baud,
        },
    )
}

struct Shared {
    host_baud: Arc<AtomicU32>,
    remote_baud: Arc<AtomicU32>,
    writer: Arc<Mutex<UnixStream>>,
    stop: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<(u32, Command)>>>,
}

fn serve(mut stream: UnixStream, config: RemoteConfig, shared: Shared) {
    let mut buf = BytesMut::new();
    let mut chunk = [0u8; 256];

    while !shared.stop.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(_) => return,
        }

        for frame in drain_frames(&mut buf, DEFAULT_MAX_PAYLOAD).frames {
            let Some(command) = Command::parse(&frame) else {
                continue;
            };
            let host_rate = shared.host_baud.load(Ordering::SeqCst);
            shared.received.lock().unwrap().push((host_rate, command));

            // Frames sent at the wrong rate are line noise to the remote.
            if host_rate != shared.remote_baud.load(Ordering::SeqCst) {
                continue;
            }

            match command {
                Command::Test if config.answer_test => confirm(&shared, CommandKind::Test),
                Command::SetDivisionRate(_) if config.confirm_commands => {
                    confirm(&shared, CommandKind::SetDivisionRate)
                }
                Command::ChangeBaudRate(index) if config.confirm_commands => {
                    if let Some(&rate) = config.table.get(index as usize) {
                        shared.remote_baud.store(rate, Ordering::SeqCst);
                    }
                    confirm(&shared, CommandKind::ChangeBaudRate);
                }
                _ => {}
            }
        }
    }
}

fn confirm(shared: &Shared, kind: CommandKind) {
    let mut buf = BytesMut::new();
    encode_frame(CommandKind::Confirm, &[kind.tag()], &mut buf).unwrap();
    let _ = shared.writer.lock().unwrap().write_all(&buf);
}
