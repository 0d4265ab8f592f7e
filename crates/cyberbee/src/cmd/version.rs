use cyberbee_frame::{DEFAULT_MAX_PAYLOAD, SYNC};
use cyberbee_link::DEFAULT_BAUD_RATES;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("cyberbee {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: cyberbee");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CYBERBEE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("CYBERBEE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("sync: {:02X} {:02X}", SYNC[0], SYNC[1]);
    println!("max_payload: {DEFAULT_MAX_PAYLOAD}");
    println!("baud_rates: {DEFAULT_BAUD_RATES:?}");

    Ok(SUCCESS)
}
