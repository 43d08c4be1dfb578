//! Capture sessions.
//!
//! Every source owns the monitored port and produces a fresh
//! [`BandwidthStats`] per session. Sessions stop early when the shared
//! `running` flag is cleared, and whatever was accumulated is still returned.

mod file;
mod live;
mod tcpdump;

pub use file::FileCapture;
pub use live::LiveCapture;
pub use tcpdump::TcpdumpCapture;

use std::time::Duration;

use crate::error::CaptureError;
use crate::stats::BandwidthStats;

pub trait CaptureSource {
    /// One-line description for the startup banner
    fn describe(&self) -> String;

    /// Collect statistics for up to `duration`.
    fn monitor(&mut self, duration: Duration) -> Result<BandwidthStats, CaptureError>;
}
