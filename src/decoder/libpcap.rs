use std::path::Path;
use std::time::Duration;

use pcap::{Capture, Error as PcapError};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::sll::SLLPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use tracing::{debug, warn};

use super::CaptureDecoder;
use crate::error::DecodeError;
use crate::packet::{ClassifiedPacket, RawPacket};
use crate::peeler::{self, PeeledDatagram};

// DLT_* values as stored in capture headers
const DLT_NULL: i32 = 0;
const DLT_EN10MB: i32 = 1;
const DLT_RAW: i32 = 101;
const DLT_LOOP: i32 = 108;
const DLT_LINUX_SLL: i32 = 113;
const DLT_IPV4: i32 = 228;

const LOOPBACK_HEADER: usize = 4;

/// Reads captures through libpcap and walks the layers with pnet packet views.
pub struct LibpcapDecoder;

impl CaptureDecoder for LibpcapDecoder {
    fn name(&self) -> &'static str {
        "libpcap"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn decode(
        &self,
        path: &Path,
        monitored_port: u16,
    ) -> Result<Vec<ClassifiedPacket>, DecodeError> {
        debug!("Opening capture with libpcap: {}", path.display());

        let mut capture = Capture::from_file(path).map_err(|e| DecodeError::Library {
            decoder: "libpcap",
            message: e.to_string(),
        })?;
        let linktype = capture.get_datalink().0;
        debug!("Capture link type: {}", linktype);

        let mut packets = Vec::new();
        let mut frame_number = 0u64;

        loop {
            let packet = match capture.next_packet() {
                Ok(packet) => packet,
                Err(PcapError::NoMorePackets) => break,
                Err(e) => {
                    warn!("Error reading packet #{}: {}", frame_number + 1, e);
                    break;
                }
            };
            frame_number += 1;

            let timestamp = Duration::from_secs(packet.header.ts.tv_sec.max(0) as u64)
                + Duration::from_micros(packet.header.ts.tv_usec.max(0) as u64);

            let Some(udp) = udp_payload(linktype, packet.data) else {
                debug!("Frame #{} carries no IPv4/UDP datagram", frame_number);
                continue;
            };

            let packet = RawPacket::new(udp.payload, timestamp, udp.src_port, udp.dst_port);
            packets.push(ClassifiedPacket::from_ports(packet, monitored_port));
        }

        Ok(packets)
    }
}

struct UdpPayload {
    payload: Vec<u8>,
    src_port: u16,
    dst_port: u16,
}

fn udp_payload(linktype: i32, frame: &[u8]) -> Option<UdpPayload> {
    match linktype {
        DLT_EN10MB => {
            let ethernet = EthernetPacket::new(frame)?;
            if ethernet.get_ethertype() != EtherTypes::Ipv4 {
                return None;
            }
            ipv4_udp(ethernet.payload())
        }
        DLT_LINUX_SLL => {
            let sll = SLLPacket::new(frame)?;
            if sll.get_protocol() != EtherTypes::Ipv4 {
                return None;
            }
            ipv4_udp(sll.payload())
        }
        DLT_NULL | DLT_LOOP => peeler::peel_at(frame, LOOPBACK_HEADER).map(UdpPayload::from),
        DLT_RAW | DLT_IPV4 => peeler::peel_at(frame, 0).map(UdpPayload::from),
        // Unfamiliar encapsulation: fall back to offset probing
        _ => peeler::peel(frame).map(UdpPayload::from),
    }
}

impl From<PeeledDatagram<'_>> for UdpPayload {
    fn from(datagram: PeeledDatagram<'_>) -> Self {
        Self {
            payload: datagram.payload.to_vec(),
            src_port: datagram.src_port,
            dst_port: datagram.dst_port,
        }
    }
}

fn ipv4_udp(data: &[u8]) -> Option<UdpPayload> {
    let ipv4 = Ipv4Packet::new(data)?;
    if ipv4.get_version() != 4 {
        return None;
    }
    if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }

    let udp = UdpPacket::new(ipv4.payload())?;
    Some(UdpPayload {
        payload: udp.payload().to_vec(),
        src_port: udp.get_source(),
        dst_port: udp.get_destination(),
    })
}
