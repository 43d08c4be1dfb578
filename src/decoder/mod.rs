//! Capture file decoding.
//!
//! Capture files come from whatever tool the operator had at hand, so the
//! format is not known up front. Each decoder advertises whether it can
//! handle a file and then produces classified packets; [`DecoderChain`]
//! tries them in order and keeps the first success.

mod libpcap;
mod manual;
mod pcap_file_reader;
mod tshark;

pub use libpcap::LibpcapDecoder;
pub use manual::{ManualPcapDecoder, PcapByteOrder};
pub use pcap_file_reader::PcapFileDecoder;
pub use tshark::TsharkDecoder;

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::DecodeError;
use crate::packet::ClassifiedPacket;

/// A strategy for turning a capture file into classified UDP payloads.
///
/// Decoders never touch session statistics: they return everything they
/// recovered and leave accounting to the caller, so a decoder that fails
/// halfway leaves nothing behind.
pub trait CaptureDecoder {
    fn name(&self) -> &'static str;

    /// Cheap capability probe (tool presence, magic number, ...)
    fn can_handle(&self, path: &Path) -> bool;

    /// Decode every frame, classifying direction against `monitored_port`.
    fn decode(
        &self,
        path: &Path,
        monitored_port: u16,
    ) -> Result<Vec<ClassifiedPacket>, DecodeError>;
}

/// Packets recovered from a capture file and the decoder that produced them
#[derive(Debug)]
pub struct DecodedCapture {
    pub decoder: &'static str,
    pub packets: Vec<ClassifiedPacket>,
}

impl DecodedCapture {
    /// Time between the first and last captured packet
    pub fn capture_span(&self) -> Duration {
        let mut timestamps = self.packets.iter().map(|p| p.packet.timestamp);
        let Some(first) = timestamps.next() else {
            return Duration::ZERO;
        };
        let (min, max) = timestamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        max - min
    }
}

/// Ordered decoder fallback
pub struct DecoderChain {
    decoders: Vec<Box<dyn CaptureDecoder>>,
}

impl Default for DecoderChain {
    /// tshark, pcap-file, libpcap, manual
    fn default() -> Self {
        Self::new()
            .with_decoder(TsharkDecoder::new())
            .with_decoder(PcapFileDecoder)
            .with_decoder(LibpcapDecoder)
            .with_decoder(ManualPcapDecoder)
    }
}

impl DecoderChain {
    /// An empty chain; see [`DecoderChain::default`] for the standard order.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    pub fn with_decoder<D: CaptureDecoder + 'static>(mut self, decoder: D) -> Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn decode(&self, path: &Path, monitored_port: u16) -> Result<DecodedCapture, DecodeError> {
        for decoder in &self.decoders {
            if !decoder.can_handle(path) {
                debug!("Decoder {} cannot handle {}", decoder.name(), path.display());
                continue;
            }

            info!("Parsing {} with {}", path.display(), decoder.name());
            match decoder.decode(path, monitored_port) {
                Ok(packets) => {
                    info!(
                        "{} recovered {} packets from {}",
                        decoder.name(),
                        packets.len(),
                        path.display()
                    );
                    return Ok(DecodedCapture {
                        decoder: decoder.name(),
                        packets,
                    });
                }
                Err(e) => {
                    warn!("{} failed on {}: {}", decoder.name(), path.display(), e);
                }
            }
        }

        Err(DecodeError::Exhausted {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_files {
    //! Synthetic classic-pcap files for decoder tests.

    use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub const LINKTYPE_ETHERNET: u32 = 1;
    pub const LINKTYPE_LINUX_SLL: u32 = 113;

    pub fn pcap_bytes<B: ByteOrder>(linktype: u32, frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<B>(0xa1b2c3d4).unwrap();
        out.write_u16::<B>(2).unwrap();
        out.write_u16::<B>(4).unwrap();
        out.write_i32::<B>(0).unwrap();
        out.write_u32::<B>(0).unwrap();
        out.write_u32::<B>(65535).unwrap();
        out.write_u32::<B>(linktype).unwrap();

        for (ts_sec, frame) in frames {
            out.write_u32::<B>(*ts_sec).unwrap();
            out.write_u32::<B>(0).unwrap();
            out.write_u32::<B>(frame.len() as u32).unwrap();
            out.write_u32::<B>(frame.len() as u32).unwrap();
            out.extend_from_slice(frame);
        }
        out
    }

    pub fn le_pcap(linktype: u32, frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
        pcap_bytes::<LittleEndian>(linktype, frames)
    }

    pub fn be_pcap(linktype: u32, frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
        pcap_bytes::<BigEndian>(linktype, frames)
    }

    pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }
}

#[cfg(test)]
mod tests {
    use super::test_files::*;
    use super::*;
    use crate::packet::{Direction, RawPacket};
    use crate::peeler::test_frames::{ethernet, rtgp};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Scripted {
        name: &'static str,
        handles: bool,
        result: fn() -> Result<Vec<ClassifiedPacket>, DecodeError>,
        calls: Rc<Cell<u32>>,
    }

    impl CaptureDecoder for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn can_handle(&self, _path: &Path) -> bool {
            self.handles
        }

        fn decode(&self, _path: &Path, _port: u16) -> Result<Vec<ClassifiedPacket>, DecodeError> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }
    }

    fn one_packet() -> Result<Vec<ClassifiedPacket>, DecodeError> {
        Ok(vec![ClassifiedPacket::new(
            RawPacket::received(vec![0xA1; 16]),
            Direction::Incoming,
        )])
    }

    fn failing() -> Result<Vec<ClassifiedPacket>, DecodeError> {
        Err(DecodeError::Unsupported("scripted".into()))
    }

    #[test]
    fn test_chain_skips_unavailable_and_failed() {
        type Script = (&'static str, bool, fn() -> Result<Vec<ClassifiedPacket>, DecodeError>);
        let script: [Script; 4] = [
            ("absent", false, one_packet),
            ("broken", true, failing),
            ("works", true, one_packet),
            ("never", true, one_packet),
        ];
        let calls: Vec<Rc<Cell<u32>>> = script.iter().map(|_| Rc::new(Cell::new(0))).collect();

        let mut chain = DecoderChain::new();
        for ((name, handles, result), counter) in script.into_iter().zip(&calls) {
            chain = chain.with_decoder(Scripted {
                name,
                handles,
                result,
                calls: counter.clone(),
            });
        }

        let decoded = chain.decode(Path::new("capture.pcap"), 4242).unwrap();
        assert_eq!(decoded.decoder, "works");
        assert_eq!(decoded.packets.len(), 1);

        let counts: Vec<u32> = calls.iter().map(|c| c.get()).collect();
        assert_eq!(counts, vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_chain_exhausted() {
        let chain = DecoderChain::new().with_decoder(Scripted {
            name: "broken",
            handles: true,
            result: failing,
            calls: Rc::new(Cell::new(0)),
        });

        let err = chain.decode(Path::new("capture.pcap"), 4242).unwrap_err();
        assert!(matches!(err, DecodeError::Exhausted { .. }));
        assert!(DecoderChain::new().decode(Path::new("x"), 1).is_err());
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(
            DecoderChain::default().decoder_names(),
            vec!["tshark", "pcap-file", "libpcap", "manual"]
        );
    }

    #[test]
    fn test_default_chain_decodes_classic_pcap() {
        let frames = vec![
            (100, ethernet(50000, 4242, &rtgp(0x20, 17))),
            (103, ethernet(4242, 50000, &rtgp(0x11, 36))),
        ];
        let file = write_temp(&le_pcap(LINKTYPE_ETHERNET, &frames));

        // Whichever decoder wins, the outcome must be the same two packets
        let decoded = DecoderChain::default().decode(file.path(), 4242).unwrap();
        assert_eq!(decoded.packets.len(), 2);
        assert_eq!(decoded.packets[0].direction, Direction::Incoming);
        assert_eq!(decoded.packets[1].direction, Direction::Outgoing);
        assert_eq!(decoded.capture_span(), Duration::from_secs(3));
    }

    #[test]
    fn test_capture_span_empty() {
        let decoded = DecodedCapture {
            decoder: "none",
            packets: Vec::new(),
        };
        assert_eq!(decoded.capture_span(), Duration::ZERO);
    }
}
