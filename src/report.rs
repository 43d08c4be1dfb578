//! Human-readable rendering of session statistics.

use std::fmt::Write;

use crate::protocol::OpCode;
use crate::stats::BandwidthStats;

const WIDTH: usize = 60;

/// `B` below 1 KiB, `KB` below 1 MiB, `MB` above, two decimals when scaled
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

/// Short snapshot logged while a live session is still running
pub fn progress_line(stats: &BandwidthStats) -> String {
    format!(
        "[{:.0}s] RX: {} packets ({}), {:.2} Kbps, {} invalid",
        stats.duration().as_secs_f64(),
        stats.packets_received,
        format_bytes(stats.bytes_received),
        stats.rx_bandwidth_kbps(),
        stats.invalid_packets
    )
}

/// Final session report with the per-opcode breakdown, heaviest first.
pub fn render(stats: &BandwidthStats) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, stats);
    out
}

fn write_report(out: &mut String, stats: &BandwidthStats) -> std::fmt::Result {
    let rule = "=".repeat(WIDTH);

    writeln!(out, "\n{}", rule)?;
    writeln!(out, "{:^WIDTH$}", "RTGP Bandwidth Report")?;
    writeln!(out, "{}", rule)?;

    writeln!(out, "\nDuration: {:.1} seconds", stats.duration().as_secs_f64())?;
    writeln!(
        out,
        "\nReceived: {} packets ({})",
        stats.packets_received,
        format_bytes(stats.bytes_received)
    )?;
    writeln!(
        out,
        "Sent:     {} packets ({})",
        stats.packets_sent,
        format_bytes(stats.bytes_sent)
    )?;
    writeln!(out, "Invalid:  {} packets", stats.invalid_packets)?;

    writeln!(out, "\nBandwidth:")?;
    writeln!(out, "   RX: {:.2} Kbps", stats.rx_bandwidth_kbps())?;
    writeln!(out, "   TX: {:.2} Kbps", stats.tx_bandwidth_kbps())?;
    writeln!(out, "   Total: {:.2} Kbps", stats.total_bandwidth_kbps())?;
    writeln!(out, "   Packets/sec: {:.1}", stats.packets_per_second())?;

    if !stats.packet_stats.is_empty() {
        writeln!(out, "\nPacket Breakdown:")?;
        writeln!(
            out,
            "{:<20} {:>8} {:>10} {:>10} {:>10}",
            "OpCode", "Count", "Bytes", "Avg Size", "%Traffic"
        )?;
        writeln!(out, "{}", "-".repeat(WIDTH))?;

        for (opcode, entry) in stats.sorted_by_bytes() {
            writeln!(
                out,
                "{:<20} {:>8} {:>10} {:>10.1} {:>9.1}%",
                OpCode::from(opcode).to_string(),
                entry.count,
                format_bytes(entry.total_bytes),
                entry.avg_size(),
                stats.traffic_share(opcode)
            )?;
        }
    }

    writeln!(out, "\n{}", rule)
}
