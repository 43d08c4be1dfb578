use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use super::CaptureSource;
use crate::decoder::DecoderChain;
use crate::error::CaptureError;
use crate::stats::BandwidthStats;

/// Offline analysis of an existing capture file.
pub struct FileCapture {
    path: PathBuf,
    port: u16,
    chain: DecoderChain,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            path: path.into(),
            port,
            chain: DecoderChain::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_chain(mut self, chain: DecoderChain) -> Self {
        self.chain = chain;
        self
    }
}

impl CaptureSource for FileCapture {
    fn describe(&self) -> String {
        format!(
            "capture file {} (udp port {}, decoders: {})",
            self.path.display(),
            self.port,
            self.chain.decoder_names().join(", ")
        )
    }

    /// The session length is the span of the recorded traffic, so rates
    /// reflect the recorded traffic rather than how fast the file parsed.
    fn monitor(&mut self, _duration: Duration) -> Result<BandwidthStats, CaptureError> {
        let decoded = self.chain.decode(&self.path, self.port)?;
        let span = decoded.capture_span();
        info!(
            "{} packets spanning {:.1}s decoded with {}",
            decoded.packets.len(),
            span.as_secs_f64(),
            decoded.decoder
        );

        let now = Instant::now();
        let mut stats = BandwidthStats::starting_at(now.checked_sub(span).unwrap_or(now));
        stats.record_all(decoded.packets);
        Ok(stats)
    }
}
