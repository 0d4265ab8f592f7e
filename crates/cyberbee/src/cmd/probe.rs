use cyberbee_link::DiscardSink;

use crate::cmd::{establish, start_driver, ProbeArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_report, LinkReport, OutputFormat};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.config()?;
    let establish_timeout = args.link.establish_timeout()?;

    let driver = start_driver(&args.port, config, DiscardSink)?;
    let state = establish(&driver, establish_timeout)?;

    print_report(&LinkReport::new(&args.port, &state, driver.stats()), format);
    driver
        .shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;
    Ok(SUCCESS)
}
