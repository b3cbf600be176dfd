//! On-demand transcoding pipeline.
//!
//! Each (content, file) key owns at most one external encoder process,
//! supervised by a [`TranscodeJob`] state machine and cached in the
//! single-flight [`TranscodeRegistry`]. Idle jobs are suspended rather
//! than killed so partial output survives until the next viewer.

pub mod encoder;
pub mod job;
pub mod manifest;
pub mod registry;

pub use encoder::{
    Encoder, EncoderError, EncoderEvent, EncoderHandle, EncoderInput, EncoderSpec, FfmpegEncoder,
};
pub use job::{JobState, TranscodeError, TranscodeJob};
pub use manifest::Manifest;
pub use registry::TranscodeRegistry;

/// Playlist file name inside each job's output directory.
pub const PLAYLIST_NAME: &str = "list.m3u8";

/// Segment file name template passed to the encoder.
pub const SEGMENT_TEMPLATE: &str = "segment_%03d.ts";

/// Sentinel file marking a completed encode; future lookups skip
/// re-encoding while it exists.
pub const FINISHED_SENTINEL: &str = "finished";
