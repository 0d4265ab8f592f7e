use std::sync::mpsc;

use cyberbee_link::{BaudRateTable, LinkConfig};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, start_driver, stream_telemetry, ListenArgs};
use crate::exit::{link_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let baud_rates =
        BaudRateTable::new(&[args.baud]).map_err(|err| link_error("invalid --baud", err))?;
    let config = LinkConfig {
        baud_rates,
        listen_only: true,
        read_timeout: parse_duration(&args.read_timeout)?,
        ..LinkConfig::default()
    };

    let (frames_tx, frames) = mpsc::channel();
    let driver = start_driver(&args.port, config, frames_tx)?;
    install_ctrlc_handler(driver.stop_token())?;
    info!(port = %args.port, baud_rate = args.baud, "listening");

    let code = stream_telemetry(&driver, &frames, args.count, format)?;
    driver
        .shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;
    Ok(code)
}
