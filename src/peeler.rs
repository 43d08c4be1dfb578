//! Link-layer agnostic UDP extraction.
//!
//! Capture files written with `tcpdump -i any` use Linux cooked headers,
//! loopback captures use a 4-byte BSD header, and raw captures have none.
//! Rather than trusting the file's link type, each frame is probed at a fixed
//! list of candidate offsets until an IPv4/UDP header lines up.

/// Candidate link-layer header lengths, most specific first:
/// Linux cooked (SLL), Ethernet, BSD loopback, raw IP.
pub const LINK_OFFSETS: [usize; 4] = [16, 14, 4, 0];

const IPV4_MIN_HEADER: usize = 20;
const IPV4_VERSION: u8 = 4;
const IPV4_PROTOCOL_OFFSET: usize = 9;
const IP_PROTO_UDP: u8 = 17;
const UDP_HEADER: usize = 8;

/// A UDP datagram recovered from a link-layer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeledDatagram<'a> {
    pub payload: &'a [u8],
    pub src_port: u16,
    pub dst_port: u16,
}

/// Probe `frame` at each of [`LINK_OFFSETS`] and return the first IPv4/UDP match.
pub fn peel(frame: &[u8]) -> Option<PeeledDatagram<'_>> {
    LINK_OFFSETS.iter().find_map(|&offset| peel_at(frame, offset))
}

/// Parse an IPv4/UDP datagram starting at `ip_start`.
pub fn peel_at(frame: &[u8], ip_start: usize) -> Option<PeeledDatagram<'_>> {
    if ip_start + IPV4_MIN_HEADER > frame.len() {
        return None;
    }

    let version_ihl = frame[ip_start];
    if version_ihl >> 4 != IPV4_VERSION {
        return None;
    }

    let ip_header_len = (version_ihl & 0x0f) as usize * 4;
    if ip_header_len < IPV4_MIN_HEADER {
        return None;
    }

    if frame[ip_start + IPV4_PROTOCOL_OFFSET] != IP_PROTO_UDP {
        return None;
    }

    let udp_start = ip_start + ip_header_len;
    if udp_start + UDP_HEADER > frame.len() {
        return None;
    }

    let src_port = u16::from_be_bytes([frame[udp_start], frame[udp_start + 1]]);
    let dst_port = u16::from_be_bytes([frame[udp_start + 2], frame[udp_start + 3]]);
    let udp_len = u16::from_be_bytes([frame[udp_start + 4], frame[udp_start + 5]]) as usize;

    // The UDP length field covers header + payload; trailing link padding is
    // excluded and a length running past the snapshot is clamped.
    let payload_start = udp_start + UDP_HEADER;
    let payload_end = (udp_start + udp_len).min(frame.len()).max(payload_start);

    Some(PeeledDatagram {
        payload: &frame[payload_start..payload_end],
        src_port,
        dst_port,
    })
}
