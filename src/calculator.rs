//! Theoretical server to client bandwidth for common scenarios.

use std::fmt::Write;

use crate::protocol::HEADER_SIZE;

/// Wire sizes of the messages that dominate a session
pub const PACKET_SIZES: [(&str, usize); 5] = [
    // header + entity id + x,y + vx,vy
    ("S_ENTITY_MOVE", HEADER_SIZE + 4 + 8 + 8),
    // header + entity id + type + x,y + vx,vy + extra
    ("S_ENTITY_SPAWN", HEADER_SIZE + 4 + 1 + 8 + 8 + 4),
    // header + input mask
    ("C_INPUT", HEADER_SIZE + 1),
    ("S_ENTITY_DESTROY", HEADER_SIZE + 4),
    ("PING/PONG", HEADER_SIZE),
];

pub const ENTITY_MOVE_SIZE: usize = PACKET_SIZES[0].1;

pub const ENTITY_COUNTS: [u32; 4] = [5, 10, 20, 50];
pub const TICK_RATES: [u32; 3] = [20, 30, 60];

/// Per-client budget for a good experience
pub const TARGET_KBPS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scenario {
    pub entities: u32,
    pub tick_rate: u32,
}

impl Scenario {
    pub fn move_packets_per_second(&self) -> u32 {
        self.entities * self.tick_rate
    }

    /// One S_ENTITY_MOVE per entity per tick
    pub fn bandwidth_kbps(&self) -> f64 {
        let bytes_per_sec = (ENTITY_MOVE_SIZE as u64) * self.move_packets_per_second() as u64;
        bytes_per_sec as f64 * 8.0 / 1000.0
    }

    pub fn within_target(&self) -> bool {
        self.bandwidth_kbps() < TARGET_KBPS
    }
}

/// Entity counts outer, tick rates inner
pub fn scenarios() -> impl Iterator<Item = Scenario> {
    ENTITY_COUNTS.into_iter().flat_map(|entities| {
        TICK_RATES
            .into_iter()
            .map(move |tick_rate| Scenario { entities, tick_rate })
    })
}

pub fn render() -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_table(&mut out);
    out
}

fn write_table(out: &mut String) -> std::fmt::Result {
    let rule = "=".repeat(60);

    writeln!(out, "\n{}", rule)?;
    writeln!(out, "{:^60}", "Theoretical Bandwidth Calculator")?;
    writeln!(out, "{}", rule)?;

    writeln!(out, "\nPacket Sizes:")?;
    for (name, size) in PACKET_SIZES {
        writeln!(out, "   {}: {} bytes", name, size)?;
    }

    writeln!(out, "\nBandwidth per scenario (Server -> Client):")?;
    writeln!(
        out,
        "{:>10} {:>10} {:>15} {:>12}",
        "Entities", "Tick Rate", "Move Packets", "Bandwidth"
    )?;
    writeln!(out, "{}", "-".repeat(50))?;

    for scenario in scenarios() {
        writeln!(
            out,
            "{:>10} {:>10} Hz {:>15}/s {:>11.1} Kbps",
            scenario.entities,
            scenario.tick_rate,
            scenario.move_packets_per_second(),
            scenario.bandwidth_kbps()
        )?;
    }

    writeln!(out, "\nRecommendations:")?;
    writeln!(out, "   - Target: < {:.0} Kbps per client for good experience", TARGET_KBPS)?;
    for scenario in RECOMMENDED {
        writeln!(
            out,
            "   - {} entities @ {} Hz = {:.1} Kbps ({})",
            scenario.entities,
            scenario.tick_rate,
            scenario.bandwidth_kbps(),
            advice(scenario)
        )?;
    }
    Ok(())
}

/// Scenarios called out under the table
const RECOMMENDED: [Scenario; 2] = [
    Scenario { entities: 10, tick_rate: 60 },
    Scenario { entities: 10, tick_rate: 30 },
];

fn advice(scenario: Scenario) -> String {
    if scenario.within_target() {
        return "good target".to_string();
    }
    // Suggest the fastest listed tick rate that fits the budget
    TICK_RATES
        .iter()
        .rev()
        .map(|&tick_rate| Scenario { tick_rate, ..scenario })
        .find(Scenario::within_target)
        .map(|slower| format!("consider {} Hz updates", slower.tick_rate))
        .unwrap_or_else(|| "reduce entity count".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_sizes() {
        let sizes: Vec<usize> = PACKET_SIZES.iter().map(|(_, size)| *size).collect();
        assert_eq!(sizes, vec![36, 41, 17, 20, 16]);
    }

    #[test]
    fn test_scenario_grid() {
        let grid: Vec<Scenario> = scenarios().collect();
        assert_eq!(grid.len(), 12);
        assert_eq!(grid[0], Scenario { entities: 5, tick_rate: 20 });
        assert_eq!(grid[11], Scenario { entities: 50, tick_rate: 60 });

        assert!((grid[0].bandwidth_kbps() - 28.8).abs() < 1e-9);
        assert!((grid[11].bandwidth_kbps() - 864.0).abs() < 1e-9);
        assert_eq!(grid[11].move_packets_per_second(), 3000);
    }

    #[test]
    fn test_recommended_scenarios() {
        let fast = Scenario { entities: 10, tick_rate: 60 };
        let slow = Scenario { entities: 10, tick_rate: 30 };
        assert!((fast.bandwidth_kbps() - 172.8).abs() < 1e-9);
        assert!((slow.bandwidth_kbps() - 86.4).abs() < 1e-9);
        assert!(!fast.within_target());
        assert!(slow.within_target());

        assert_eq!(advice(fast), "consider 30 Hz updates");
        assert_eq!(advice(slow), "good target");
        assert_eq!(advice(Scenario { entities: 50, tick_rate: 60 }), "reduce entity count");
    }

    #[test]
    fn test_render_table() {
        let table = render();
        assert!(table.contains("S_ENTITY_SPAWN: 41 bytes"));
        assert!(table.contains("10 entities @ 60 Hz = 172.8 Kbps (consider 30 Hz updates)"));
        assert!(table.contains("10 entities @ 30 Hz = 86.4 Kbps (good target)"));

        let row = table.lines().find(|l| l.contains("3000/s")).unwrap();
        assert!(row.ends_with("864.0 Kbps"));
    }
}
