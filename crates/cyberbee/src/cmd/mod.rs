use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand};
use cyberbee_frame::Frame;
use cyberbee_link::{BaudRateTable, LinkConfig, LinkDriver, LinkState, StopToken, TelemetrySink};
use tracing::info;

use crate::exit::{link_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR, USAGE};
use crate::output::{print_frame, OutputFormat};

pub mod listen;
pub mod ports;
pub mod probe;
pub mod run;
pub mod set_baud;
pub mod set_division;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Negotiate the link and stream telemetry.
    Run(RunArgs),
    /// Decode telemetry at a fixed rate without ever transmitting.
    Listen(ListenArgs),
    /// Negotiate the link and report the result.
    Probe(ProbeArgs),
    /// Negotiate, then change the remote division rate.
    SetDivision(SetDivisionArgs),
    /// Negotiate, then move the link to another baud rate.
    SetBaud(SetBaudArgs),
    /// List serial ports on this host.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::SetDivision(args) => set_division::run(args, format),
        Command::SetBaud(args) => set_baud::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Link settings shared by every negotiating subcommand.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Candidate baud rates in probing order (comma-separated).
    #[arg(long, value_delimiter = ',', env = "CYBERBEE_BAUD_RATES")]
    pub baud_rates: Option<Vec<u32>>,
    /// Time to wait for each Confirm (e.g. 500ms, 2s).
    #[arg(long, default_value = "500ms")]
    pub confirm_timeout: String,
    /// Division rate assumed once the link is established.
    #[arg(long, default_value = "0")]
    pub division_rate: u16,
    /// Give up if the link is not established within this time.
    #[arg(long, default_value = "10s")]
    pub establish_timeout: String,
    /// Upper bound on one serial read (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub read_timeout: String,
}

impl LinkArgs {
    pub fn config(&self) -> CliResult<LinkConfig> {
        let baud_rates = match &self.baud_rates {
            Some(rates) => {
                BaudRateTable::new(rates).map_err(|err| link_error("invalid --baud-rates", err))?
            }
            None => BaudRateTable::default(),
        };
        let config = LinkConfig {
            baud_rates,
            confirm_timeout: parse_duration(&self.confirm_timeout)?,
            initial_division_rate: self.division_rate,
            read_timeout: parse_duration(&self.read_timeout)?,
            ..LinkConfig::default()
        };
        config
            .validate()
            .map_err(|err| link_error("invalid link settings", err))?;
        Ok(config)
    }

    pub fn establish_timeout(&self) -> CliResult<Duration> {
        parse_duration(&self.establish_timeout)
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial device path (e.g. /dev/ttyS0).
    pub port: String,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Change the remote division rate once the link is up.
    #[arg(long, value_name = "RATE")]
    pub set_division: Option<u16>,
    /// Exit after printing N telemetry frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device path (e.g. /dev/ttyS0).
    pub port: String,
    /// Line rate to listen at.
    #[arg(long, default_value = "115200")]
    pub baud: u32,
    /// Upper bound on one serial read (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub read_timeout: String,
    /// Exit after printing N telemetry frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Serial device path (e.g. /dev/ttyS0).
    pub port: String,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SetDivisionArgs {
    /// Serial device path (e.g. /dev/ttyS0).
    pub port: String,
    /// New division rate.
    pub rate: u16,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["index", "rate"])))]
pub struct SetBaudArgs {
    /// Serial device path (e.g. /dev/ttyS0).
    pub port: String,
    /// Target index in the baud rate table.
    #[arg(long)]
    pub index: Option<usize>,
    /// Target baud rate; must be in the table.
    #[arg(long)]
    pub rate: Option<u32>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the port and start the driver.
pub fn start_driver<S>(port: &str, config: LinkConfig, sink: S) -> CliResult<LinkDriver>
where
    S: TelemetrySink + 'static,
{
    LinkDriver::open(port, config, sink).map_err(|err| link_error("open failed", err))
}

/// Wait for the handshake, mapping exhaustion and timeouts to exit codes.
pub fn establish(driver: &LinkDriver, timeout: Duration) -> CliResult<LinkState> {
    let state = driver
        .wait_established(timeout)
        .map_err(|err| link_error("link negotiation failed", err))?;
    info!(state = %state, "link up");
    Ok(state)
}

/// Print telemetry until `count` frames, Ctrl-C, or a driver fault.
pub fn stream_telemetry(
    driver: &LinkDriver,
    frames: &Receiver<Frame>,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    let stop = driver.stop_token();
    let mut printed = 0u64;

    while !stop.is_stopped() {
        match frames.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                printed = printed.saturating_add(1);
                print_frame(&frame, printed, format);
                if count.is_some_and(|count| printed >= count as u64) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(fault) = driver.status().fault() {
                    return Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("link lost: {fault}"),
                    ));
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(SUCCESS)
}

pub fn install_ctrlc_handler(stop: StopToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.stop();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
