//! Bandwidth and per-opcode accounting for RTGP game traffic.
//!
//! Traffic is observed on a live UDP socket, through an external `tcpdump`,
//! or read back from a capture file; every path ends in [`stats::BandwidthStats`].

pub mod calculator;
pub mod capture;
pub mod config;
pub mod decoder;
pub mod error;
pub mod packet;
pub mod peeler;
pub mod protocol;
pub mod report;
pub mod stats;
