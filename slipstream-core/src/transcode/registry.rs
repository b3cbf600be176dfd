//! Single-flight cache of transcode jobs.
//!
//! All lookups for the same (content, file) key resolve to the same
//! [`TranscodeJob`], so concurrent viewers share one encoder process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::SlipstreamConfig;
use crate::content::{ContentId, ContentSource, MetadataStore, TranscodeKey};
use crate::transcode::encoder::Encoder;
use crate::transcode::job::{TranscodeError, TranscodeJob};

pub struct TranscodeRegistry {
    config: SlipstreamConfig,
    engine: Arc<dyn ContentSource>,
    metadata: Arc<dyn MetadataStore>,
    encoder: Arc<dyn Encoder>,
    jobs: RwLock<HashMap<TranscodeKey, Arc<TranscodeJob>>>,
}

impl TranscodeRegistry {
    pub fn new(
        config: SlipstreamConfig,
        engine: Arc<dyn ContentSource>,
        metadata: Arc<dyn MetadataStore>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            config,
            engine,
            metadata,
            encoder,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the job for `key`, creating it on first use. Creation does
    /// not spawn an encoder; that happens when the job is first driven.
    pub async fn get_or_create(&self, key: TranscodeKey) -> Arc<TranscodeJob> {
        {
            let jobs = self.jobs.read().await;
            if let Some(job) = jobs.get(&key) {
                return Arc::clone(job);
            }
        }

        let mut jobs = self.jobs.write().await;
        Arc::clone(jobs.entry(key).or_insert_with(|| {
            debug!("creating transcode job for {key}");
            TranscodeJob::new(
                key,
                &self.config,
                Arc::clone(&self.engine),
                Arc::clone(&self.metadata),
                Arc::clone(&self.encoder),
            )
        }))
    }

    /// Returns the job for `key` only if one already exists.
    pub async fn get(&self, key: TranscodeKey) -> Option<Arc<TranscodeJob>> {
        self.jobs.read().await.get(&key).map(Arc::clone)
    }

    /// Drops the job for `key`, stopping its encoder and deleting output.
    ///
    /// # Errors
    /// - `TranscodeError::Io` - Output directory could not be removed
    pub async fn remove(&self, key: TranscodeKey) -> Result<(), TranscodeError> {
        let job = self.jobs.write().await.remove(&key);
        if let Some(job) = job {
            job.kill().await?;
        }
        Ok(())
    }

    /// Drops all jobs of one content item, then deletes the content's
    /// whole output directory.
    ///
    /// # Errors
    /// - `TranscodeError::Io` - Output directory could not be removed
    pub async fn remove_content(&self, content: ContentId) -> Result<(), TranscodeError> {
        let removed: Vec<Arc<TranscodeJob>> = {
            let mut jobs = self.jobs.write().await;
            let keys: Vec<TranscodeKey> = jobs
                .keys()
                .filter(|key| key.content == content)
                .copied()
                .collect();
            keys.into_iter().filter_map(|key| jobs.remove(&key)).collect()
        };

        for job in removed {
            job.kill().await?;
        }

        let content_dir = self.config.transcode.output_root.join(content.to_string());
        match tokio::fs::remove_dir_all(&content_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::content::{
        ByteStream, ByteWindow, CodecMetadata, ContentSummary, FileEntry, SourceError,
    };
    use crate::transcode::encoder::{EncoderError, EncoderEvent, EncoderHandle, EncoderSpec};

    struct EmptySource;

    #[async_trait]
    impl ContentSource for EmptySource {
        async fn list_contents(&self) -> Result<Vec<ContentSummary>, SourceError> {
            Ok(vec![])
        }

        async fn content(&self, id: ContentId) -> Result<ContentSummary, SourceError> {
            Err(SourceError::ContentNotFound { content: id })
        }

        async fn file_entry(&self, id: ContentId, index: u32) -> Result<FileEntry, SourceError> {
            Err(SourceError::FileNotFound { content: id, index })
        }

        async fn open_read_stream(
            &self,
            id: ContentId,
            index: u32,
            _window: ByteWindow,
        ) -> Result<ByteStream, SourceError> {
            Err(SourceError::FileNotFound { content: id, index })
        }
    }

    struct NullMetadata;

    #[async_trait]
    impl MetadataStore for NullMetadata {
        async fn store_file_metadata(
            &self,
            _content: ContentId,
            _file_path: &str,
            _metadata: &CodecMetadata,
        ) -> Result<(), SourceError> {
            Ok(())
        }

        async fn file_codecs(&self, _content: ContentId, _file_path: &str) -> Option<CodecMetadata> {
            None
        }
    }

    struct NeverEncoder;

    #[async_trait]
    impl Encoder for NeverEncoder {
        async fn spawn(
            &self,
            _spec: EncoderSpec,
        ) -> Result<(Box<dyn EncoderHandle>, mpsc::Receiver<EncoderEvent>), EncoderError>
        {
            Err(EncoderError::SpawnFailed {
                reason: "not available in this test".to_string(),
            })
        }
    }

    fn test_registry(root: &std::path::Path) -> TranscodeRegistry {
        let mut config = SlipstreamConfig::default();
        config.storage.data_dir = root.join("data");
        config.transcode.output_root = root.join("hls");
        TranscodeRegistry::new(
            config,
            Arc::new(EmptySource),
            Arc::new(NullMetadata),
            Arc::new(NeverEncoder),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(test_registry(dir.path()));
        let key = TranscodeKey::new(ContentId::new([1u8; 20]), 3);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(
                async move { registry.get_or_create(key).await },
            ));
        }

        let first = registry.get_or_create(key).await;
        for handle in handles {
            let job = handle.await.unwrap();
            assert!(Arc::ptr_eq(&first, &job));
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());
        let content = ContentId::new([2u8; 20]);

        let a = registry.get_or_create(TranscodeKey::new(content, 0)).await;
        let b = registry.get_or_create(TranscodeKey::new(content, 1)).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_remove_forgets_job() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());
        let key = TranscodeKey::new(ContentId::new([3u8; 20]), 0);

        let job = registry.get_or_create(key).await;
        registry.remove(key).await.unwrap();

        assert!(registry.get(key).await.is_none());
        let replacement = registry.get_or_create(key).await;
        assert!(!Arc::ptr_eq(&job, &replacement));
    }

    #[tokio::test]
    async fn test_remove_content_drops_all_files_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());
        let content = ContentId::new([4u8; 20]);
        let other = ContentId::new([5u8; 20]);

        registry.get_or_create(TranscodeKey::new(content, 0)).await;
        registry.get_or_create(TranscodeKey::new(content, 1)).await;
        let kept = registry.get_or_create(TranscodeKey::new(other, 0)).await;

        let content_dir = dir.path().join("hls").join(content.to_string());
        tokio::fs::create_dir_all(&content_dir).await.unwrap();

        registry.remove_content(content).await.unwrap();

        assert!(registry.get(TranscodeKey::new(content, 0)).await.is_none());
        assert!(registry.get(TranscodeKey::new(content, 1)).await.is_none());
        assert!(!tokio::fs::try_exists(&content_dir).await.unwrap());

        let still_there = registry.get_or_create(TranscodeKey::new(other, 0)).await;
        assert!(Arc::ptr_eq(&kept, &still_there));
    }
}
