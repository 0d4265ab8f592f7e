use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::ByteChannel;

/// Default bound on a single blocking read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// UART transport backed by the `serialport` crate.
///
/// The device is opened 8N1 without flow control, which is what the IMX8
/// firmware expects on its companion-computer port.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    path: String,
    baud_rate: u32,
}

impl SerialChannel {
    /// Open `path` at `baud_rate` with the default read timeout.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_timeout(path, baud_rate, DEFAULT_READ_TIMEOUT)
    }

    /// Open `path` at `baud_rate`, bounding every read by `read_timeout`.
    pub fn open_with_timeout(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_string(),
                baud_rate,
                source,
            })?;

        info!(path, baud_rate, "opened serial channel");

        Ok(Self {
            port,
            path: path.to_string(),
            baud_rate,
        })
    }

    /// Device path this channel was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ByteChannel for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        read_outcome(self.port.read(buf))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.port.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.port.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|source| TransportError::Configure { baud_rate, source })?;
        debug!(path = %self.path, from = self.baud_rate, to = baud_rate, "baud rate changed");
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>> {
        let port = self.port.try_clone().map_err(TransportError::Clone)?;
        Ok(Box::new(Self {
            port,
            path: self.path.clone(),
            baud_rate: self.baud_rate,
        }))
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.path, self.baud_rate)
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}

/// Map a raw device read into the channel contract (`Ok(0)` on timeout).
///
/// Both backends report a timeout as an error, so zero bytes read into a
/// non-empty buffer means the device went away.
fn read_outcome(result: std::io::Result<usize>) -> Result<usize> {
    match result {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(err) => Err(TransportError::Io(err)),
    }
}

/// A serial device discovered on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Bus type: `usb`, `pci`, `bluetooth` or `unknown`.
    pub kind: &'static str,
    /// USB vendor/product ids when known.
    pub usb_ids: Option<(u16, u16)>,
    /// USB product string when known.
    pub product: Option<String>,
}

/// Enumerate serial devices available on this host.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(TransportError::Enumerate)?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let (kind, usb_ids, product) = match port.port_type {
                SerialPortType::UsbPort(usb) => ("usb", Some((usb.vid, usb.pid)), usb.product),
                SerialPortType::PciPort => ("pci", None, None),
                SerialPortType::BluetoothPort => ("bluetooth", None, None),
                SerialPortType::Unknown => ("unknown", None, None),
            };
            PortInfo {
                path: port.port_name,
                kind,
                usb_ids,
                product,
            }
        })
        .collect())
}
