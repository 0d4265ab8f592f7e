mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "cyberbee", version, about = "UART link driver for the cyberbee controller")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "CYBERBEE_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "CYBERBEE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "cyberbee",
            "run",
            "/dev/ttyS0",
            "--baud-rates",
            "9600,115200",
            "--confirm-timeout",
            "250ms",
            "--count",
            "10",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.link.baud_rates, Some(vec![9600, 115200]));
        assert_eq!(args.count, Some(10));
    }

    #[test]
    fn parses_listen_with_default_baud() {
        let cli = Cli::try_parse_from(["cyberbee", "listen", "/dev/ttyUSB0"])
            .expect("listen args should parse");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.baud, 115200);
    }

    #[test]
    fn set_baud_requires_index_or_rate() {
        let err = Cli::try_parse_from(["cyberbee", "set-baud", "/dev/ttyS0"])
            .expect_err("missing target should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn set_baud_rejects_both_index_and_rate() {
        let err = Cli::try_parse_from([
            "cyberbee",
            "set-baud",
            "/dev/ttyS0",
            "--index",
            "2",
            "--rate",
            "38400",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_global_log_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cyberbee",
            "probe",
            "/dev/ttyS0",
            "--log-format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("probe args should parse");
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Command::Probe(_)));
    }
}
