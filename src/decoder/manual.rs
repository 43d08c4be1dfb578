//! Dependency-free classic pcap reader.
//!
//! Layout: a 24-byte global header (magic, version, thiszone, sigfigs,
//! snaplen, network) followed by records of a 16-byte header
//! (ts_sec, ts_frac, incl_len, orig_len) and `incl_len` bytes of frame.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, info, warn};

use super::CaptureDecoder;
use crate::error::DecodeError;
use crate::packet::{ClassifiedPacket, RawPacket};
use crate::peeler;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
/// libpcap's MAXIMUM_SNAPLEN; anything larger means a corrupt record
const MAX_RECORD_LEN: usize = 262_144;

const MAGIC_MICROS: u32 = 0xa1b2c3d4;
const MAGIC_MICROS_SWAPPED: u32 = 0xd4c3b2a1;
const MAGIC_NANOS: u32 = 0xa1b23c4d;
const MAGIC_NANOS_SWAPPED: u32 = 0x4d3cb2a1;
const MAGIC_PCAPNG: u32 = 0x0a0d0d0a;

/// Field byte order and timestamp resolution announced by the magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcapByteOrder {
    Little { nanos: bool },
    Big { nanos: bool },
}

impl PcapByteOrder {
    /// Interpret the first four bytes of a capture file (read little-endian).
    pub fn detect(magic: [u8; 4]) -> Result<Self, DecodeError> {
        match LittleEndian::read_u32(&magic) {
            MAGIC_MICROS => Ok(PcapByteOrder::Little { nanos: false }),
            MAGIC_MICROS_SWAPPED => Ok(PcapByteOrder::Big { nanos: false }),
            MAGIC_NANOS => Ok(PcapByteOrder::Little { nanos: true }),
            MAGIC_NANOS_SWAPPED => Ok(PcapByteOrder::Big { nanos: true }),
            MAGIC_PCAPNG => Err(DecodeError::Unsupported(
                "pcapng is not handled by the manual parser".to_string(),
            )),
            other => Err(DecodeError::Unsupported(format!(
                "unknown capture magic 0x{:08x}",
                other
            ))),
        }
    }
}

/// Fallback parser with no external dependencies beyond byte order helpers.
pub struct ManualPcapDecoder;

impl CaptureDecoder for ManualPcapDecoder {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn can_handle(&self, path: &Path) -> bool {
        let mut magic = [0u8; 4];
        let read = File::open(path).and_then(|mut file| file.read_exact(&mut magic));
        if read.is_err() {
            return false;
        }

        match PcapByteOrder::detect(magic) {
            Ok(_) => true,
            Err(e) => {
                if LittleEndian::read_u32(&magic) == MAGIC_PCAPNG {
                    info!("pcapng format detected, install tshark to parse it");
                } else {
                    debug!("Manual parser rejects {}: {}", path.display(), e);
                }
                false
            }
        }
    }

    fn decode(
        &self,
        path: &Path,
        monitored_port: u16,
    ) -> Result<Vec<ClassifiedPacket>, DecodeError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut global_header = [0u8; GLOBAL_HEADER_LEN];
        if let Err(e) = reader.read_exact(&mut global_header) {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    DecodeError::Unsupported("file shorter than a pcap global header".to_string())
                }
                _ => DecodeError::Io(e),
            });
        }

        let magic = [global_header[0], global_header[1], global_header[2], global_header[3]];
        let packets = match PcapByteOrder::detect(magic)? {
            PcapByteOrder::Little { nanos } => {
                read_records::<LittleEndian, _>(&mut reader, nanos, monitored_port)?
            }
            PcapByteOrder::Big { nanos } => {
                read_records::<BigEndian, _>(&mut reader, nanos, monitored_port)?
            }
        };

        if packets.is_empty() {
            return Err(DecodeError::NoPackets(path.to_path_buf()));
        }
        Ok(packets)
    }
}

fn read_records<B: ByteOrder, R: Read>(
    reader: &mut R,
    nanos: bool,
    monitored_port: u16,
) -> Result<Vec<ClassifiedPacket>, DecodeError> {
    let mut packets = Vec::new();
    let mut record_header = [0u8; RECORD_HEADER_LEN];
    let mut frame = Vec::new();
    let mut record_number = 0u64;

    loop {
        if !read_full(reader, &mut record_header)? {
            break;
        }
        record_number += 1;

        let ts_sec = B::read_u32(&record_header[0..4]);
        let ts_frac = B::read_u32(&record_header[4..8]);
        let incl_len = B::read_u32(&record_header[8..12]) as usize;
        // orig_len (12..16) only matters for truncated snapshots

        if incl_len > MAX_RECORD_LEN {
            warn!(
                "Record #{} claims {} bytes, stopping (corrupt capture?)",
                record_number, incl_len
            );
            break;
        }

        frame.resize(incl_len, 0);
        if !read_full(reader, &mut frame)? {
            debug!("Record #{} truncated, stopping", record_number);
            break;
        }

        let timestamp = if nanos {
            Duration::new(ts_sec as u64, ts_frac.min(999_999_999))
        } else {
            Duration::from_secs(ts_sec as u64) + Duration::from_micros(ts_frac as u64)
        };

        match peeler::peel(&frame) {
            Some(datagram) => {
                let packet = RawPacket::new(
                    datagram.payload.to_vec(),
                    timestamp,
                    datagram.src_port,
                    datagram.dst_port,
                );
                packets.push(ClassifiedPacket::from_ports(packet, monitored_port));
            }
            None => debug!("Record #{}: no IPv4/UDP header found", record_number),
        }
    }

    Ok(packets)
}

/// Fill `buf` completely; `Ok(false)` on a clean or partial end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, DecodeError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(DecodeError::Io(e)),
    }
}
