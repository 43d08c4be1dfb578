use std::time::Duration;

/// A UDP payload as observed on the wire or recovered from a capture file
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub data: Vec<u8>,
    /// Capture time since the Unix epoch
    pub timestamp: Duration,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl RawPacket {
    pub fn new(data: Vec<u8>, timestamp: Duration, src_port: u16, dst_port: u16) -> Self {
        Self {
            data,
            timestamp,
            src_port: Some(src_port),
            dst_port: Some(dst_port),
        }
    }
}

#[cfg(test)]
impl RawPacket {
    /// Payload without port information, stamped with the current time
    pub fn received(data: Vec<u8>) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        Self {
            data,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
            src_port: None,
            dst_port: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Incoming iff the datagram was addressed to the monitored port
    pub fn from_dst_port(dst_port: u16, monitored_port: u16) -> Self {
        if dst_port == monitored_port {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

/// A packet paired with the direction it travelled relative to the monitored port
#[derive(Debug, Clone)]
pub struct ClassifiedPacket {
    pub packet: RawPacket,
    pub direction: Direction,
}

impl ClassifiedPacket {
    pub fn new(packet: RawPacket, direction: Direction) -> Self {
        Self { packet, direction }
    }

    /// Classify a file-sourced packet by comparing its destination port
    pub fn from_ports(packet: RawPacket, monitored_port: u16) -> Self {
        let direction = match packet.dst_port {
            Some(port) => Direction::from_dst_port(port, monitored_port),
            None => Direction::Outgoing,
        };
        Self { packet, direction }
    }
}
