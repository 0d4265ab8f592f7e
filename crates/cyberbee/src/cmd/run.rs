use std::sync::mpsc;

use cyberbee_link::CommandOutcome;
use tracing::info;

use crate::cmd::{establish, install_ctrlc_handler, start_driver, stream_telemetry, RunArgs};
use crate::exit::{link_error, CliError, CliResult, TIMEOUT};
use crate::output::OutputFormat;

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.config()?;
    let establish_timeout = args.link.establish_timeout()?;

    let (frames_tx, frames) = mpsc::channel();
    let driver = start_driver(&args.port, config, frames_tx)?;
    install_ctrlc_handler(driver.stop_token())?;

    establish(&driver, establish_timeout)?;

    if let Some(rate) = args.set_division {
        match driver
            .set_division_rate(rate)
            .map_err(|err| link_error("set division rate failed", err))?
        {
            CommandOutcome::Confirmed => info!(division_rate = rate, "division rate set"),
            CommandOutcome::TimedOut => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("division rate {rate} was not confirmed"),
                ));
            }
        }
    }

    let code = stream_telemetry(&driver, &frames, args.count, format)?;
    let stats = driver.stats();
    driver
        .shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;
    info!(
        frames = stats.telemetry_published,
        discarded = stats.bytes_discarded,
        "link closed"
    );
    Ok(code)
}
