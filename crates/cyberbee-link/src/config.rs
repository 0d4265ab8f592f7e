use std::sync::Arc;
use std::time::Duration;

use cyberbee_frame::DEFAULT_MAX_PAYLOAD;

use crate::error::{LinkError, Result};

/// Baud rates supported by the IMX8 firmware, in probing order.
pub const DEFAULT_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Default time to wait for any Confirm.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(500);

/// Default upper bound on one processor wait cycle.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Default ingress buffer capacity in bytes.
pub const DEFAULT_INGRESS_CAPACITY: usize = 64 * 1024;

/// Ordered, immutable list of candidate baud rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaudRateTable {
    rates: Arc<[u32]>,
}

impl BaudRateTable {
    /// Build a table from an ordered list of rates.
    ///
    /// The list must be non-empty, free of zeros and addressable by a
    /// one-byte index (the ChangeBaudRate payload).
    pub fn new(rates: &[u32]) -> Result<Self> {
        if rates.is_empty() {
            return Err(LinkError::InvalidConfig(
                "baud rate table must not be empty".to_string(),
            ));
        }
        if rates.len() > u8::MAX as usize + 1 {
            return Err(LinkError::InvalidConfig(format!(
                "baud rate table too long: {} entries (max 256)",
                rates.len()
            )));
        }
        if rates.contains(&0) {
            return Err(LinkError::InvalidConfig(
                "baud rate 0 is not valid".to_string(),
            ));
        }
        Ok(Self {
            rates: Arc::from(rates),
        })
    }

    /// Rate at `index`, if any.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.rates.get(index).copied()
    }

    /// Index of `rate`, if present.
    pub fn position(&self, rate: u32) -> Option<usize> {
        self.rates.iter().position(|&r| r == rate)
    }

    /// Number of candidate rates.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// First rate probed.
    pub fn first(&self) -> u32 {
        self.rates[0]
    }

    /// All rates in probing order.
    pub fn as_slice(&self) -> &[u32] {
        &self.rates
    }
}

impl Default for BaudRateTable {
    fn default() -> Self {
        Self {
            rates: Arc::from(&DEFAULT_BAUD_RATES[..]),
        }
    }
}

/// Configuration consumed by the link driver.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Candidate baud rates, probed in order.
    pub baud_rates: BaudRateTable,
    /// Time to wait for every Confirm (Test, SetDivisionRate, ChangeBaudRate).
    pub confirm_timeout: Duration,
    /// Division rate assumed once the link is established.
    pub initial_division_rate: u16,
    /// Never transmit; only decode incoming telemetry.
    pub listen_only: bool,
    /// Upper bound on a single blocking channel read.
    pub read_timeout: Duration,
    /// Upper bound on one processor wait cycle.
    pub idle_wait: Duration,
    /// Ingress buffer capacity in bytes.
    pub ingress_capacity: usize,
    /// Largest payload the decoder accepts.
    pub max_payload: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rates: BaudRateTable::default(),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            initial_division_rate: 0,
            listen_only: false,
            read_timeout: cyberbee_transport::DEFAULT_READ_TIMEOUT,
            idle_wait: DEFAULT_IDLE_WAIT,
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl LinkConfig {
    /// Reject configurations the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.confirm_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "confirm timeout must be greater than zero".to_string(),
            ));
        }
        if self.idle_wait.is_zero() {
            return Err(LinkError::InvalidConfig(
                "idle wait must be greater than zero".to_string(),
            ));
        }
        if self.max_payload > u16::MAX as usize {
            return Err(LinkError::InvalidConfig(format!(
                "max payload {} exceeds wire limit {}",
                self.max_payload,
                u16::MAX
            )));
        }
        // A full frame must always fit, or the decoder could never drain it.
        let largest_frame =
            cyberbee_frame::HEADER_SIZE + self.max_payload + cyberbee_frame::CHECKSUM_SIZE;
        if self.ingress_capacity < largest_frame {
            return Err(LinkError::InvalidConfig(format!(
                "ingress capacity {} smaller than largest frame {}",
                self.ingress_capacity, largest_frame
            )));
        }
        Ok(())
    }
}
