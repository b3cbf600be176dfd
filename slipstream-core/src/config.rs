//! Centralized configuration for Slipstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Slipstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SlipstreamConfig {
    pub storage: StorageConfig,
    pub transcode: TranscodeConfig,
}

/// File storage configuration.
///
/// Controls where completed torrent payloads live on disk. Files whose
/// download has finished are read from `data_dir` directly instead of
/// through the torrent engine's stream capability.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding completed content payloads
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/slipstream/data"),
        }
    }
}

/// Transcoding pipeline configuration.
///
/// Controls the external encoder invocation, per-job idle eviction,
/// and the on-disk layout of generated manifests and segments.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Root directory for generated manifests and segments, one
    /// subdirectory per (content, file) key
    pub output_root: PathBuf,
    /// Inactivity window after which a running encoder is suspended
    pub idle_timeout: Duration,
    /// Target duration of each generated segment
    pub segment_duration: Duration,
    /// Bound on how long a spawned encoder may take to produce its manifest
    pub startup_timeout: Duration,
    /// Video codecs that can be passed through without re-encoding
    pub copy_video_codecs: Vec<String>,
    /// Audio codecs that can be passed through without re-encoding
    pub copy_audio_codecs: Vec<String>,
    /// Encoder used when the source video codec cannot be copied
    pub video_encoder: String,
    /// Encoder used when the source audio codec cannot be copied
    pub audio_encoder: String,
    /// External encoder binary
    pub ffmpeg_path: PathBuf,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("/var/lib/slipstream/hls"),
            idle_timeout: Duration::from_secs(60),
            segment_duration: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(300), // 5 minutes
            copy_video_codecs: vec!["h264".to_string()],
            copy_audio_codecs: vec!["aac".to_string(), "mp3".to_string()],
            video_encoder: "libx264".to_string(),
            audio_encoder: "libmp3lame".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl SlipstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SLIPSTREAM_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("SLIPSTREAM_HLS_DIR") {
            config.transcode.output_root = PathBuf::from(dir);
        }

        if let Ok(timeout) = std::env::var("SLIPSTREAM_IDLE_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.transcode.idle_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(duration) = std::env::var("SLIPSTREAM_SEGMENT_DURATION") {
            if let Ok(seconds) = duration.parse::<u64>() {
                config.transcode.segment_duration = Duration::from_secs(seconds);
            }
        }

        if let Ok(path) = std::env::var("SLIPSTREAM_FFMPEG_PATH") {
            config.transcode.ffmpeg_path = PathBuf::from(path);
        }

        config
    }
}
