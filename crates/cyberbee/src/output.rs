use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use cyberbee_frame::Frame;
use cyberbee_link::{CommandOutcome, LinkState, LinkStats};
use cyberbee_transport::PortInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    seq: u64,
    tag: u8,
    kind: &'a str,
    length: usize,
    payload_hex: String,
    timestamp: String,
}

/// Print one telemetry frame. `seq` counts frames printed so far.
pub fn print_frame(frame: &Frame, seq: u64, format: OutputFormat) {
    let tag = frame.command.tag();
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                seq,
                tag,
                kind: frame.command.name(),
                length: frame.length(),
                payload_hex: hex(&frame.payload),
                timestamp: now_unix_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "TAG", "LEN", "PAYLOAD"])
                .add_row(vec![
                    seq.to_string(),
                    format!("0x{tag:02X}"),
                    frame.length().to_string(),
                    hex(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{seq} {} len={} payload={}",
                frame.command,
                frame.length(),
                hex(&frame.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(&frame.payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[derive(Serialize)]
struct StatsOutput {
    bytes_received: u64,
    frames_decoded: u64,
    telemetry_published: u64,
    telemetry_dropped: u64,
    bytes_discarded: u64,
}

impl From<LinkStats> for StatsOutput {
    fn from(stats: LinkStats) -> Self {
        Self {
            bytes_received: stats.bytes_received,
            frames_decoded: stats.frames_decoded,
            telemetry_published: stats.telemetry_published,
            telemetry_dropped: stats.telemetry_dropped,
            bytes_discarded: stats.bytes_discarded,
        }
    }
}

/// Summary of a link after a probe or a command.
#[derive(Serialize)]
pub struct LinkReport {
    port: String,
    state: &'static str,
    baud_rate: Option<u32>,
    division_rate: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
    stats: StatsOutput,
}

impl LinkReport {
    pub fn new(port: &str, state: &LinkState, stats: LinkStats) -> Self {
        Self {
            port: port.to_string(),
            state: state.name(),
            baud_rate: state.baud_rate(),
            division_rate: state.division_rate(),
            outcome: None,
            stats: stats.into(),
        }
    }

    pub fn with_outcome(mut self, outcome: CommandOutcome) -> Self {
        self.outcome = Some(match outcome {
            CommandOutcome::Confirmed => "confirmed",
            CommandOutcome::TimedOut => "timed-out",
        });
        self
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("port", self.port.clone()),
            ("state", self.state.to_string()),
            ("baud_rate", optional(self.baud_rate)),
            ("division_rate", optional(self.division_rate)),
        ];
        if let Some(outcome) = self.outcome {
            rows.push(("outcome", outcome.to_string()));
        }
        rows.extend([
            ("bytes_received", self.stats.bytes_received.to_string()),
            ("frames_decoded", self.stats.frames_decoded.to_string()),
            ("bytes_discarded", self.stats.bytes_discarded.to_string()),
        ]);
        rows
    }
}

pub fn print_report(report: &LinkReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in report.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = report
                .rows()
                .into_iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => {
            println!("{}", report.state);
        }
    }
}

#[derive(Serialize)]
struct PortOutput<'a> {
    path: &'a str,
    kind: &'a str,
    vid: Option<String>,
    pid: Option<String>,
    product: Option<&'a str>,
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    let rows: Vec<PortOutput<'_>> = ports
        .iter()
        .map(|port| PortOutput {
            path: &port.path,
            kind: port.kind,
            vid: port.usb_ids.map(|(vid, _)| format!("{vid:04x}")),
            pid: port.usb_ids.map(|(_, pid)| format!("{pid:04x}")),
            product: port.product.as_deref(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "TYPE", "VID:PID", "PRODUCT"]);
            for row in &rows {
                table.add_row(vec![
                    row.path.to_string(),
                    row.kind.to_string(),
                    usb_id(row),
                    row.product.unwrap_or("-").to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("{} ({}) {}", row.path, row.kind, usb_id(row));
            }
        }
        OutputFormat::Raw => {
            for row in &rows {
                println!("{}", row.path);
            }
        }
    }
}

fn usb_id(row: &PortOutput<'_>) -> String {
    match (&row.vid, &row.pid) {
        (Some(vid), Some(pid)) => format!("{vid}:{pid}"),
        _ => "-".to_string(),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Lowercase hex with no separators.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
