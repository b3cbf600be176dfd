//! Content and file model shared with the torrent engine.
//!
//! Content and its file entries are owned and mutated exclusively by the
//! external torrent engine; this crate only reads them through the
//! [`ContentSource`] trait.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncRead;

/// A readable stream of file bytes, backed either by disk or by the
/// torrent engine's partial-read capability.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Identifier of a downloadable content item (20-byte content hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 20]);

impl ContentId {
    /// Creates ContentId from a 20-byte hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a ContentId from its 40-character hex form.
    ///
    /// # Errors
    /// - `SourceError::InvalidContentId` - Input is not 40 hex characters
    pub fn from_hex(value: &str) -> Result<Self, SourceError> {
        let bytes = hex::decode(value).map_err(|_| SourceError::InvalidContentId {
            value: value.to_string(),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| SourceError::InvalidContentId {
                value: value.to_string(),
            })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A file within a content item, as reported by the torrent engine.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// Path relative to the content data directory
    pub path: String,
    /// Total size in bytes
    pub length: u64,
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Completion fraction, 0.0 to 1.0
    pub progress: f64,
}

impl FileEntry {
    /// True once the file is fully downloaded and safe to read from disk.
    pub fn is_ready(&self) -> bool {
        self.progress >= 1.0
    }

    /// File name component of the relative path.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Snapshot of a content item and its files.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSummary {
    #[serde(serialize_with = "serialize_content_id")]
    pub id: ContentId,
    pub name: String,
    pub files: Vec<FileEntry>,
}

fn serialize_content_id<S: serde::Serializer>(
    id: &ContentId,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

/// Uniquely identifies at most one live encoding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TranscodeKey {
    pub content: ContentId,
    pub file_index: u32,
}

impl TranscodeKey {
    pub fn new(content: ContentId, file_index: u32) -> Self {
        Self {
            content,
            file_index,
        }
    }
}

impl fmt::Display for TranscodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content, self.file_index)
    }
}

/// Byte window with inclusive bounds; open ends mean "from the start" /
/// "to the end of the file".
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteWindow {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Codec information for a transcoded file, parsed from encoder output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodecMetadata {
    /// Container format of the input (e.g. "matroska", "avi")
    pub container: Option<String>,
    /// Video codec identifier (e.g. "h264")
    pub video_codec: Option<String>,
    /// Audio codec identifier (e.g. "aac")
    pub audio_codec: Option<String>,
    /// Input duration in seconds
    pub duration_secs: Option<f64>,
}

/// Errors from resolving or reading content through the torrent engine.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Content {content} not found")]
    ContentNotFound { content: ContentId },

    #[error("File {index} not found in content {content}")]
    FileNotFound { content: ContentId, index: u32 },

    #[error("Invalid content id: {value}")]
    InvalidContentId { value: String },

    #[error("I/O error reading source: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only view of the torrent engine's content state.
///
/// The engine supports an optional start offset when opening a read stream
/// over a still-downloading file, but may not efficiently truncate at an end
/// offset; callers stop consumption at the computed end themselves.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Lists all known content items.
    async fn list_contents(&self) -> Result<Vec<ContentSummary>, SourceError>;

    /// Looks up a single content item.
    async fn content(&self, id: ContentId) -> Result<ContentSummary, SourceError>;

    /// Looks up one file of a content item.
    async fn file_entry(&self, id: ContentId, index: u32) -> Result<FileEntry, SourceError>;

    /// Opens a read stream over a file, whether or not download is complete.
    async fn open_read_stream(
        &self,
        id: ContentId,
        index: u32,
        window: ByteWindow,
    ) -> Result<ByteStream, SourceError>;
}

/// Sink for codec metadata discovered while spawning an encoder.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persists codec metadata for a file.
    async fn store_file_metadata(
        &self,
        content: ContentId,
        file_path: &str,
        metadata: &CodecMetadata,
    ) -> Result<(), SourceError>;

    /// Returns previously stored codec metadata, if any.
    async fn file_codecs(&self, content: ContentId, file_path: &str) -> Option<CodecMetadata>;
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "3gp",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "opus",
];

fn has_one_of_extensions(extensions: &[&str], file_name: &str) -> bool {
    let lowered = file_name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lowered.ends_with(&format!(".{ext}")))
}

/// True if the file name carries a known video extension.
pub fn is_video(file_name: &str) -> bool {
    has_one_of_extensions(VIDEO_EXTENSIONS, file_name)
}

/// True if the file name carries a known audio extension.
pub fn is_audio(file_name: &str) -> bool {
    has_one_of_extensions(AUDIO_EXTENSIONS, file_name)
}
