use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

use super::CaptureDecoder;
use crate::error::DecodeError;
use crate::packet::{ClassifiedPacket, RawPacket};
use crate::protocol::{HEADER_SIZE, MAGIC_BYTE};

const FIELDS: [&str; 5] = [
    "frame.len",
    "udp.dstport",
    "udp.srcport",
    "data.data",
    "frame.time_epoch",
];

/// Delegates dissection to Wireshark's `tshark` field export.
pub struct TsharkDecoder {
    program: String,
}

impl Default for TsharkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TsharkDecoder {
    pub fn new() -> Self {
        Self::with_program("tshark")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl CaptureDecoder for TsharkDecoder {
    fn name(&self) -> &'static str {
        "tshark"
    }

    fn can_handle(&self, _path: &Path) -> bool {
        self.available()
    }

    fn decode(
        &self,
        path: &Path,
        monitored_port: u16,
    ) -> Result<Vec<ClassifiedPacket>, DecodeError> {
        let mut command = Command::new(&self.program);
        command.arg("-r").arg(path).args(["-T", "fields"]);
        for field in FIELDS {
            command.args(["-e", field]);
        }

        let output = command.stderr(Stdio::piped()).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DecodeError::Unavailable("tshark")
            } else {
                DecodeError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(DecodeError::Library {
                decoder: "tshark",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_fields(&stdout, monitored_port))
    }
}

/// Parse tab-separated `frame.len, udp.dstport, udp.srcport, data.data[, time]` rows.
/// Rows that do not parse are skipped.
pub fn parse_fields(text: &str, monitored_port: u16) -> Vec<ClassifiedPacket> {
    text.lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let row = parse_row(line);
            if row.is_none() {
                debug!("Skipping unparseable tshark row: {:?}", line);
            }
            row
        })
        .map(|packet| ClassifiedPacket::from_ports(packet, monitored_port))
        .collect()
}

fn parse_row(line: &str) -> Option<RawPacket> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 3 {
        return None;
    }

    let _frame_len: u32 = parts[0].trim().parse().ok()?;
    let dst_port = parse_port(parts[1])?;
    let src_port = parse_port(parts[2])?;

    let hex_data = parts.get(3).map(|s| s.trim().replace(':', "")).unwrap_or_default();
    let data = if hex_data.is_empty() {
        placeholder_header()
    } else {
        hex::decode(&hex_data).ok()?
    };

    let timestamp = parts
        .get(4)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or_default();

    Some(RawPacket::new(data, timestamp, src_port, dst_port))
}

/// Empty ports (non-UDP rows) read as port 0
fn parse_port(field: &str) -> Option<u16> {
    let field = field.trim();
    if field.is_empty() {
        return Some(0);
    }
    // Tunnelled frames list one port per layer; the innermost comes last
    field.rsplit(',').next()?.parse().ok()
}

/// Stand-in for payloads tshark did not export, so sizes still add up
fn placeholder_header() -> Vec<u8> {
    let mut data = vec![0u8; HEADER_SIZE];
    data[0] = MAGIC_BYTE;
    data
}
