use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::{Block, PcapNgReader};
use tracing::{debug, warn};

use super::CaptureDecoder;
use crate::error::DecodeError;
use crate::packet::{ClassifiedPacket, RawPacket};
use crate::peeler;

/// Frame iteration through the `pcap-file` crate, for classic pcap and pcapng.
///
/// Link layers are peeled heuristically, so the file's link type is ignored.
pub struct PcapFileDecoder;

impl CaptureDecoder for PcapFileDecoder {
    fn name(&self) -> &'static str {
        "pcap-file"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn decode(
        &self,
        path: &Path,
        monitored_port: u16,
    ) -> Result<Vec<ClassifiedPacket>, DecodeError> {
        let mut packets = Vec::new();
        let mut on_frame = |frame: &[u8], timestamp: Duration| {
            match peeler::peel(frame) {
                Some(datagram) => {
                    let packet = RawPacket::new(
                        datagram.payload.to_vec(),
                        timestamp,
                        datagram.src_port,
                        datagram.dst_port,
                    );
                    packets.push(ClassifiedPacket::from_ports(packet, monitored_port));
                }
                None => debug!("Dropping frame of {} bytes: no IPv4/UDP header found", frame.len()),
            }
        };

        let file = BufReader::new(File::open(path)?);
        match PcapReader::new(file) {
            Ok(mut reader) => {
                while let Some(packet) = reader.next_packet() {
                    match packet {
                        Ok(packet) => on_frame(&packet.data, packet.timestamp),
                        Err(e) => {
                            warn!("Stopping at unreadable pcap record: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(legacy_err) => {
                debug!("Not a classic pcap ({}), retrying as pcapng", legacy_err);
                let file = BufReader::new(File::open(path)?);
                let mut reader = PcapNgReader::new(file).map_err(|e| {
                    DecodeError::Unsupported(format!(
                        "neither pcap ({}) nor pcapng ({})",
                        legacy_err, e
                    ))
                })?;

                while let Some(block) = reader.next_block() {
                    match block {
                        Ok(Block::EnhancedPacket(epb)) => on_frame(&epb.data, epb.timestamp),
                        Ok(Block::SimplePacket(spb)) => on_frame(&spb.data, Duration::ZERO),
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Stopping at unreadable pcapng block: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        if packets.is_empty() {
            return Err(DecodeError::NoPackets(path.to_path_buf()));
        }
        Ok(packets)
    }
}
