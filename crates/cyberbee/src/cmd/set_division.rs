use cyberbee_link::{CommandOutcome, DiscardSink};

use crate::cmd::{establish, start_driver, SetDivisionArgs};
use crate::exit::{link_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_report, LinkReport, OutputFormat};

pub fn run(args: SetDivisionArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.config()?;
    let establish_timeout = args.link.establish_timeout()?;

    let driver = start_driver(&args.port, config, DiscardSink)?;
    establish(&driver, establish_timeout)?;

    let outcome = driver
        .set_division_rate(args.rate)
        .map_err(|err| link_error("set division rate failed", err))?;

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
