use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single capture-file decoder, or of the whole chain
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{0} is not available on this system")]
    Unavailable(&'static str),

    #[error("unsupported capture format: {0}")]
    Unsupported(String),

    #[error("no UDP packets could be recovered from {}", .0.display())]
    NoPackets(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{decoder} failed: {message}")]
    Library {
        decoder: &'static str,
        message: String,
    },

    #[error("could not parse {}: every decoder failed", .path.display())]
    Exhausted { path: PathBuf },
}

/// Session-level failure of a capture source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to bind UDP {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("insufficient permissions for {0} (try running as root)")]
    PermissionDenied(String),

    #[error("capture tool '{tool}' could not be started: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
