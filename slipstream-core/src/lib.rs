//! Slipstream Core - transcode supervision and progressive delivery
//!
//! This crate provides the building blocks for streaming torrent-backed media
//! to playback clients: range/time-seek request parsing, byte-window source
//! streams over complete or still-downloading files, and the per-file
//! transcode job lifecycle with its single-flight registry.

pub mod config;
pub mod content;
pub mod streaming;
pub mod transcode;

// Re-export main types for convenient access
pub use config::SlipstreamConfig;
pub use content::{ContentId, FileEntry, SourceError, TranscodeKey};
pub use streaming::range::RangeError;
pub use streaming::source::SourceStream;
pub use transcode::{TranscodeError, TranscodeJob, TranscodeRegistry};

/// Core errors that can bubble up from any Slipstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;
