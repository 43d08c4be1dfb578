use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::packet::{ClassifiedPacket, Direction};
use crate::protocol;

/// Running size statistics for a single opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketStats {
    pub count: u64,
    pub total_bytes: u64,
    pub min_size: usize,
    pub max_size: usize,
}

impl PacketStats {
    fn first(size: usize) -> Self {
        Self {
            count: 1,
            total_bytes: size as u64,
            min_size: size,
            max_size: size,
        }
    }

    fn add(&mut self, size: usize) {
        self.count += 1;
        self.total_bytes += size as u64;
        self.min_size = self.min_size.min(size);
        self.max_size = self.max_size.max(size);
    }

    pub fn avg_size(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.count as f64
    }
}

/// Session-wide traffic counters.
///
/// Owned by exactly one capture loop; every observed datagram goes through
/// [`BandwidthStats::record`], which keeps
/// `sum(per-opcode counts) + invalid_packets == packets_received + packets_sent`.
/// Rates are derived from wall-clock time on every call, never cached.
#[derive(Debug, Clone)]
pub struct BandwidthStats {
    pub start_time: Instant,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub invalid_packets: u64,
    pub packet_stats: HashMap<u8, PacketStats>,
}

impl Default for BandwidthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start_time: Instant) -> Self {
        Self {
            start_time,
            packets_received: 0,
            packets_sent: 0,
            bytes_received: 0,
            bytes_sent: 0,
            invalid_packets: 0,
            packet_stats: HashMap::new(),
        }
    }

    /// Account for one UDP payload.
    pub fn record(&mut self, data: &[u8], direction: Direction) {
        let size = data.len();

        match direction {
            Direction::Incoming => {
                self.packets_received += 1;
                self.bytes_received += size as u64;
            }
            Direction::Outgoing => {
                self.packets_sent += 1;
                self.bytes_sent += size as u64;
            }
        }

        match protocol::classify(data) {
            Some(opcode) => {
                self.packet_stats
                    .entry(opcode)
                    .and_modify(|stats| stats.add(size))
                    .or_insert_with(|| PacketStats::first(size));
            }
            None => self.invalid_packets += 1,
        }
    }

    pub fn record_all<I>(&mut self, packets: I)
    where
        I: IntoIterator<Item = ClassifiedPacket>,
    {
        for classified in packets {
            self.record(&classified.packet.data, classified.direction);
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_received + self.packets_sent
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_received + self.bytes_sent
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn rx_bandwidth_kbps(&self) -> f64 {
        bandwidth_kbps(self.bytes_received, self.duration())
    }

    pub fn tx_bandwidth_kbps(&self) -> f64 {
        bandwidth_kbps(self.bytes_sent, self.duration())
    }

    pub fn total_bandwidth_kbps(&self) -> f64 {
        let duration = self.duration();
        bandwidth_kbps(self.bytes_received, duration) + bandwidth_kbps(self.bytes_sent, duration)
    }

    pub fn packets_per_second(&self) -> f64 {
        per_second(self.total_packets(), self.duration())
    }

    /// Share of all observed bytes carried by `opcode`, in percent
    pub fn traffic_share(&self, opcode: u8) -> f64 {
        let total = self.total_bytes();
        match self.packet_stats.get(&opcode) {
            Some(stats) if total > 0 => stats.total_bytes as f64 / total as f64 * 100.0,
            _ => 0.0,
        }
    }

    /// Per-opcode entries, heaviest traffic first
    pub fn sorted_by_bytes(&self) -> Vec<(u8, PacketStats)> {
        let mut entries: Vec<_> = self
            .packet_stats
            .iter()
            .map(|(&opcode, &stats)| (opcode, stats))
            .collect();
        entries.sort_by(|a, b| b.1.total_bytes.cmp(&a.1.total_bytes).then(a.0.cmp(&b.0)));
        entries
    }
}

/// `bytes * 8 / 1000 / seconds`, zero for an empty interval
pub fn bandwidth_kbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0) / 1000.0 / secs
    } else {
        0.0
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}
