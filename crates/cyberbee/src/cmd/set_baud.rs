use cyberbee_link::{BaudRateTable, CommandOutcome, DiscardSink};

use crate::cmd::{establish, start_driver, SetBaudArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_report, LinkReport, OutputFormat};

pub fn run(args: SetBaudArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.config()?;
    let establish_timeout = args.link.establish_timeout()?;
    let index = target_index(&args, &config.baud_rates)?;

    let driver = start_driver(&args.port, config, DiscardSink)?;
    establish(&driver, establish_timeout)?;

    let outcome = driver
        .change_baud_rate(index)
        .map_err(|err| link_error("baud rate change failed", err))?;

    let report = LinkReport::new(&args.port, &driver.state(), driver.stats()).with_outcome(outcome);
    print_report(&report, format);
    driver
        .shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;

    Ok(match outcome {
        CommandOutcome::Confirmed => SUCCESS,
        CommandOutcome::TimedOut => TIMEOUT,
    })
}

fn target_index(args: &SetBaudArgs, table: &BaudRateTable) -> CliResult<usize> {
    match (args.index, args.rate) {
        (Some(index), _) if index < table.len() => Ok(index),
        (Some(index), _) => Err(CliError::new(
            USAGE,
            format!(
                "--index {index} out of range (table has {} entries)",
                table.len()
            ),
        )),
        (None, Some(rate)) => table.position(rate).ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("--rate {rate} is not in the baud rate table {:?}", table.as_slice()),
            )
        }),
        (None, None) => Err(CliError::new(USAGE, "one of --index or --rate is required")),
    }
}
