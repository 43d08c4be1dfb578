use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::protocol::DEFAULT_PORT;

/// How often a live session logs a progress snapshot
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "rtgp-bandwidth-monitor")]
#[command(about = "Measure RTGP game traffic bandwidth per opcode, live or from a capture file")]
#[command(version = "1.0.0")]
pub struct Args {
    /// UDP port to monitor
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Duration in seconds
    #[arg(short, long, default_value = "30")]
    pub duration: u64,

    /// Show theoretical calculations only
    #[arg(long, default_value = "false")]
    pub calculate: bool,

    /// Use tcpdump for capture (requires root)
    #[arg(long, default_value = "false", conflicts_with = "read")]
    pub tcpdump: bool,

    /// Analyse an existing capture file instead of capturing
    #[arg(short, long)]
    pub read: Option<PathBuf>,

    /// IP address the live socket binds to
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Interface handed to tcpdump
    #[arg(short, long, default_value = "any")]
    pub interface: String,

    /// Progress report interval in seconds (live capture)
    #[arg(long, default_value_t = REPORT_INTERVAL.as_secs())]
    pub report_interval: u64,

    /// Verbose logging (default: false)
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Calculate,
    Live,
    Tcpdump,
    File(PathBuf),
}

/// Validated runtime settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub mode: Mode,
    pub port: u16,
    pub duration: Duration,
    pub bind_ip: IpAddr,
    pub interface: String,
    pub report_interval: Duration,
}

impl MonitorConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let bind_ip: IpAddr = args
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", args.bind))?;

        if args.report_interval == 0 {
            return Err(anyhow::anyhow!("Report interval must be at least 1 second"));
        }

        let mode = if args.calculate {
            Mode::Calculate
        } else if let Some(path) = args.read {
            Mode::File(path)
        } else if args.tcpdump {
            Mode::Tcpdump
        } else {
            Mode::Live
        };

        Ok(Self {
            mode,
            port: args.port,
            duration: Duration::from_secs(args.duration),
            bind_ip,
            interface: args.interface,
            report_interval: Duration::from_secs(args.report_interval),
        })
    }
}
