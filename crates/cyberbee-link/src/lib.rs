//! Link establishment and concurrent frame processing for the cyberbee UART.
//!
//! A [`LinkDriver`] owns one byte channel and runs two threads:
//! - the [`StreamReader`] pulls raw bytes into a bounded [`IngressBuffer`]
//! - the [`FrameProcessor`] decodes frames, drives the [`LinkNegotiator`]
//!   and hands telemetry to a [`TelemetrySink`]
//!
//! Commands go out through a [`CommandSender`] that serializes writes but
//! never waits on the read side. Both loops honor a [`StopToken`] within one
//! read timeout or wait cycle.

pub mod config;
pub mod driver;
pub mod error;
pub mod ingress;
pub mod negotiator;
pub mod processor;
pub mod reader;
pub mod sender;
pub mod sink;
pub mod status;
pub mod stop;

pub use config::{
    BaudRateTable, LinkConfig, DEFAULT_BAUD_RATES, DEFAULT_CONFIRM_TIMEOUT, DEFAULT_IDLE_WAIT,
    DEFAULT_INGRESS_CAPACITY,
};
pub use driver::LinkDriver;
pub use error::{LinkError, Result};
pub use ingress::IngressBuffer;
pub use negotiator::{CommandOutcome, LinkNegotiator, LinkPort, LinkRequest, LinkState};
pub use processor::{FrameProcessor, Reply, Request};
pub use reader::{StreamReader, READ_CHUNK_SIZE};
pub use sender::CommandSender;
pub use sink::{DiscardSink, TelemetrySink};
pub use status::{LinkStats, LinkStatus};
pub use stop::StopToken;
