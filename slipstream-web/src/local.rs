//! Disk-backed content source for running without a torrent engine.
//!
//! Serves content that already lives under the data directory, laid out
//! as one subdirectory per content id (40-hex). Every file is treated as
//! fully downloaded. The real torrent engine plugs in through the same
//! [`ContentSource`] trait.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use slipstream_core::content::{
    ByteStream, ByteWindow, CodecMetadata, ContentId, ContentSource, ContentSummary, FileEntry,
    MetadataStore, SourceError,
};
use tokio::io::AsyncSeekExt;
use tokio::sync::RwLock;
use tracing::debug;

pub struct LocalContentSource {
    data_dir: PathBuf,
}

impl LocalContentSource {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    async fn scan(&self, id: ContentId) -> Result<ContentSummary, SourceError> {
        let root = self.data_dir.join(id.to_string());
        if !tokio::fs::try_exists(&root).await? {
            return Err(SourceError::ContentNotFound { content: id });
        }

        let mut files = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let length = entry.metadata().await?.len();
                let relative = match path.strip_prefix(&self.data_dir) {
                    Ok(stripped) => stripped.to_string_lossy().into_owned(),
                    Err(_) => path.to_string_lossy().into_owned(),
                };
                files.push(FileEntry {
                    path: relative,
                    length,
                    downloaded: length,
                    progress: 1.0,
                });
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(ContentSummary {
            id,
            name: id.to_string(),
            files,
        })
    }
}

#[async_trait]
impl ContentSource for LocalContentSource {
    async fn list_contents(&self) -> Result<Vec<ContentSummary>, SourceError> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut contents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // Non-hex directory names are not content and are skipped.
            let Ok(id) = ContentId::from_hex(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            contents.push(self.scan(id).await?);
        }
        contents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(contents)
    }

    async fn content(&self, id: ContentId) -> Result<ContentSummary, SourceError> {
        self.scan(id).await
    }

    async fn file_entry(&self, id: ContentId, index: u32) -> Result<FileEntry, SourceError> {
        let summary = self.scan(id).await?;
        summary
            .files
            .into_iter()
            .nth(index as usize)
            .ok_or(SourceError::FileNotFound { content: id, index })
    }

    async fn open_read_stream(
        &self,
        id: ContentId,
        index: u32,
        window: ByteWindow,
    ) -> Result<ByteStream, SourceError> {
        let file = self.file_entry(id, index).await?;
        let mut reader = tokio::fs::File::open(self.data_dir.join(&file.path)).await?;
        if let Some(start) = window.start
            && start > 0
        {
            reader.seek(SeekFrom::Start(start)).await?;
        }
        Ok(Box::new(reader))
    }
}

/// In-memory codec metadata store. Survives for the server's lifetime,
/// which is enough to skip re-probing between requests.
#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<(ContentId, String), CodecMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn store_file_metadata(
        &self,
        content: ContentId,
        file_path: &str,
        metadata: &CodecMetadata,
    ) -> Result<(), SourceError> {
        debug!("storing codec metadata for {content}/{file_path}: {metadata:?}");
        self.entries
            .write()
            .await
            .insert((content, file_path.to_string()), metadata.clone());
        Ok(())
    }

    async fn file_codecs(&self, content: ContentId, file_path: &str) -> Option<CodecMetadata> {
        self.entries
            .read()
            .await
            .get(&(content, file_path.to_string()))
            .cloned()
    }
}
