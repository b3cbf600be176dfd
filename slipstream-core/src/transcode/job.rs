//! Per-file transcode job lifecycle.
//!
//! A job supervises at most one encoder process for its (content, file)
//! key. Viewer activity keeps the process running; inactivity suspends it
//! in place so partial output and decoder state survive. Completed encodes
//! are marked with an on-disk sentinel and crashed or evicted ones resume
//! from whatever the playlist already records.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{SlipstreamConfig, TranscodeConfig};
use crate::content::{ByteStream, ByteWindow, ContentSource, MetadataStore, TranscodeKey};
use crate::transcode::encoder::{Encoder, EncoderError, EncoderEvent, EncoderHandle, EncoderInput, EncoderSpec};
use crate::transcode::manifest::Manifest;
use crate::transcode::{FINISHED_SENTINEL, PLAYLIST_NAME, SEGMENT_TEMPLATE};

/// Lifecycle state of a transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No process and no claim on one
    NotStarted,
    /// A process is being started and has not produced a playlist yet
    Spawning,
    /// The encoder is producing output
    Running,
    /// The encoder is suspended after idling; output is still served
    Paused,
    /// The encode ran to completion
    Finished,
    /// The encoder exited with an error
    Failed,
}

/// Errors from driving a transcode job.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Encoder produced no output within {timeout:?}")]
    StartupTimeout { timeout: Duration },

    #[error("Encoder failed: {reason}")]
    EncoderFailure { reason: String },

    #[error("Transcode has not produced output yet")]
    NotReady,

    #[error("Invalid segment name: {name}")]
    InvalidSegmentName { name: String },

    #[error(transparent)]
    Source(#[from] crate::content::SourceError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct JobCore {
    state: JobState,
    handle: Option<Box<dyn EncoderHandle>>,
    duration_secs: Option<f64>,
    last_error: Option<String>,
}

/// Supervises the encoder process for one (content, file) key.
pub struct TranscodeJob {
    key: TranscodeKey,
    data_dir: PathBuf,
    transcode: TranscodeConfig,
    output_dir: PathBuf,
    playlist_path: PathBuf,
    base_url: String,
    engine: Arc<dyn ContentSource>,
    metadata: Arc<dyn MetadataStore>,
    encoder: Arc<dyn Encoder>,
    core: Mutex<JobCore>,
    /// Monotonic counter invalidating stale idle timers
    idle_generation: AtomicU64,
    me: Weak<TranscodeJob>,
}

impl TranscodeJob {
    pub fn new(
        key: TranscodeKey,
        config: &SlipstreamConfig,
        engine: Arc<dyn ContentSource>,
        metadata: Arc<dyn MetadataStore>,
        encoder: Arc<dyn Encoder>,
    ) -> Arc<Self> {
        let output_dir = config
            .transcode
            .output_root
            .join(key.content.to_string())
            .join(key.file_index.to_string());
        let playlist_path = output_dir.join(PLAYLIST_NAME);
        let base_url = format!("/api/contents/{}/files/{}/hls/", key.content, key.file_index);

        Arc::new_cyclic(|me| Self {
            key,
            data_dir: config.storage.data_dir.clone(),
            transcode: config.transcode.clone(),
            output_dir,
            playlist_path,
            base_url,
            engine,
            metadata,
            encoder,
            core: Mutex::new(JobCore {
                state: JobState::NotStarted,
                handle: None,
                duration_secs: None,
                last_error: None,
            }),
            idle_generation: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    pub fn key(&self) -> TranscodeKey {
        self.key
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn state(&self) -> JobState {
        self.core.lock().await.state
    }

    /// Input duration in seconds, once reported by the encoder.
    pub async fn duration_secs(&self) -> Option<f64> {
        self.core.lock().await.duration_secs
    }

    /// Brings the job to a state where output is being produced or already
    /// exists in full, spawning or resuming the encoder as needed.
    ///
    /// With `force`, a finished encode is discarded and redone from scratch.
    /// A job that is already spawning or running is left alone either way.
    ///
    /// # Errors
    /// - `TranscodeError::StartupTimeout` - No playlist within the startup bound
    /// - `TranscodeError::EncoderFailure` - The encoder exited with an error
    /// - `TranscodeError::Source` - Input file could not be resolved
    pub async fn ensure_running(&self, force: bool) -> Result<(), TranscodeError> {
        {
            let mut core = self.core.lock().await;
            match core.state {
                JobState::Running | JobState::Spawning => {
                    drop(core);
                    self.keep_alive();
                    return self.await_startup().await;
                }
                JobState::Paused => {
                    if let Some(handle) = core.handle.as_mut() {
                        handle.resume()?;
                    }
                    core.state = JobState::Running;
                    debug!("resumed suspended transcode of {}", self.key);
                    drop(core);
                    self.keep_alive();
                    return Ok(());
                }
                JobState::Finished if !force => return Ok(()),
                JobState::NotStarted if !force => {
                    if self.sentinel_exists().await {
                        core.state = JobState::Finished;
                        return Ok(());
                    }
                    core.state = JobState::Spawning;
                }
                _ => {
                    core.state = JobState::Spawning;
                }
            }
        }

        if let Err(e) = self.spawn_encoder(force).await {
            let mut core = self.core.lock().await;
            core.state = JobState::Failed;
            core.last_error = Some(e.to_string());
            return Err(e);
        }

        let started = self.await_startup().await;
        {
            let mut core = self.core.lock().await;
            if core.state == JobState::Spawning {
                match started {
                    Ok(()) => core.state = JobState::Running,
                    Err(ref e) => {
                        core.state = JobState::Failed;
                        core.last_error = Some(e.to_string());
                    }
                }
            }
        }
        if started.is_ok() {
            self.keep_alive();
        }
        started
    }

    /// Resets the idle clock. Stale timers see an old generation value and
    /// do nothing.
    pub fn keep_alive(&self) {
        let generation = self.idle_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let me = self.me.clone();
        let idle_timeout = self.transcode.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            if let Some(job) = me.upgrade()
                && job.idle_generation.load(Ordering::SeqCst) == generation
            {
                job.pause().await;
            }
        });
    }

    /// Viewer activity on produced output: wakes a suspended encoder and
    /// resets the idle clock.
    async fn touch(&self) {
        {
            let mut core = self.core.lock().await;
            if core.state == JobState::Paused {
                match core.handle.as_mut() {
                    Some(handle) => match handle.resume() {
                        Ok(()) => {
                            core.state = JobState::Running;
                            debug!("resumed suspended transcode of {}", self.key);
                        }
                        Err(e) => warn!("failed to resume encoder for {}: {e}", self.key),
                    },
                    None => core.state = JobState::Running,
                }
            }
        }
        self.keep_alive();
    }

    /// Suspends a running encoder in place. Output produced so far remains
    /// servable and the process resumes where it left off.
    pub async fn pause(&self) {
        let mut core = self.core.lock().await;
        if core.state != JobState::Running {
            return;
        }
        if let Some(handle) = core.handle.as_mut()
            && let Err(e) = handle.suspend()
        {
            warn!("failed to suspend encoder for {}: {e}", self.key);
            return;
        }
        core.state = JobState::Paused;
        info!("suspended idle transcode of {}", self.key);
    }

    /// Current playlist text.
    ///
    /// # Errors
    /// - `TranscodeError::NotReady` - Nothing spawned yet, or no playlist on disk
    pub async fn read_manifest(&self) -> Result<String, TranscodeError> {
        {
            let core = self.core.lock().await;
            if core.state == JobState::NotStarted {
                return Err(TranscodeError::NotReady);
            }
        }
        self.touch().await;
        match tokio::fs::read_to_string(&self.playlist_path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TranscodeError::NotReady),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes of one produced segment. Counts as viewer activity.
    ///
    /// # Errors
    /// - `TranscodeError::InvalidSegmentName` - Name escapes the output directory
    /// - `TranscodeError::Io` - Segment missing or unreadable
    pub async fn read_segment(&self, name: &str) -> Result<Vec<u8>, TranscodeError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") || !name.ends_with(".ts")
        {
            return Err(TranscodeError::InvalidSegmentName {
                name: name.to_string(),
            });
        }
        self.touch().await;
        Ok(tokio::fs::read(self.output_dir.join(name)).await?)
    }

    /// A reader over the produced segments whose playback window ends after
    /// `start_secs`, concatenated in order. Used for progressive delivery
    /// to clients that want a single transport stream.
    ///
    /// # Errors
    /// - `TranscodeError::NotReady` - Nothing spawned yet, or no playlist on disk
    pub async fn read_output_from(&self, start_secs: f64) -> Result<ByteStream, TranscodeError> {
        {
            let core = self.core.lock().await;
            if core.state == JobState::NotStarted {
                return Err(TranscodeError::NotReady);
            }
        }
        self.touch().await;

        let manifest = match Manifest::load(&self.playlist_path).await {
            Ok(manifest) => manifest,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(TranscodeError::NotReady),
            Err(e) => return Err(e.into()),
        };

        let mut reader: ByteStream = Box::new(tokio::io::empty());
        for segment in manifest.segments_from(start_secs) {
            let file = tokio::fs::File::open(self.output_dir.join(segment.file_name())).await?;
            reader = Box::new(reader.chain(file));
        }
        Ok(reader)
    }

    /// Stops any encoder process and deletes all produced output.
    ///
    /// # Errors
    /// - `TranscodeError::Io` - Output directory could not be removed
    pub async fn kill(&self) -> Result<(), TranscodeError> {
        {
            let mut core = self.core.lock().await;
            self.idle_generation.fetch_add(1, Ordering::SeqCst);
            if let Some(mut handle) = core.handle.take() {
                handle.kill();
            }
            core.state = JobState::NotStarted;
            core.duration_secs = None;
            core.last_error = None;
        }
        info!("killed transcode of {}", self.key);
        match tokio::fs::remove_dir_all(&self.output_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn sentinel_exists(&self) -> bool {
        tokio::fs::try_exists(self.output_dir.join(FINISHED_SENTINEL))
            .await
            .unwrap_or(false)
    }

    /// Waits for the encoder to produce its playlist, bounded by the
    /// configured startup timeout. Also returns once the job is finished,
    /// or with the recorded failure if the encoder died on the way up.
    async fn await_startup(&self) -> Result<(), TranscodeError> {
        let deadline = tokio::time::Instant::now() + self.transcode.startup_timeout;
        loop {
            if tokio::fs::try_exists(&self.playlist_path)
                .await
                .unwrap_or(false)
            {
                return Ok(());
            }
            {
                let core = self.core.lock().await;
                match core.state {
                    JobState::Failed => {
                        return Err(TranscodeError::EncoderFailure {
                            reason: core
                                .last_error
                                .clone()
                                .unwrap_or_else(|| "unknown".to_string()),
                        });
                    }
                    JobState::Finished => return Ok(()),
                    _ => {}
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TranscodeError::StartupTimeout {
                    timeout: self.transcode.startup_timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Spawns the encoder process, resuming from the existing playlist
    /// unless `fresh` wipes the output first. Caller has already set the
    /// state to `Spawning`.
    async fn spawn_encoder(&self, fresh: bool) -> Result<(), TranscodeError> {
        if fresh {
            match tokio::fs::remove_dir_all(&self.output_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let start_offset = match Manifest::load(&self.playlist_path).await {
            Ok(manifest) => manifest.total_duration(),
            Err(_) => 0.0,
        };
        if start_offset > 0.0 {
            info!("resuming transcode of {} at {start_offset:.1}s", self.key);
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;

        let file = self
            .engine
            .file_entry(self.key.content, self.key.file_index)
            .await?;
        let known = self.metadata.file_codecs(self.key.content, &file.path).await;
        let (video_codec, audio_codec) = match &known {
            Some(codecs) => (
                select_codec(
                    codecs.video_codec.as_deref(),
                    &self.transcode.copy_video_codecs,
                    &self.transcode.video_encoder,
                ),
                select_codec(
                    codecs.audio_codec.as_deref(),
                    &self.transcode.copy_audio_codecs,
                    &self.transcode.audio_encoder,
                ),
            ),
            None => (
                self.transcode.video_encoder.clone(),
                self.transcode.audio_encoder.clone(),
            ),
        };

        let input = if file.is_ready() {
            EncoderInput::Path(self.data_dir.join(&file.path))
        } else {
            EncoderInput::Stream(
                self.engine
                    .open_read_stream(self.key.content, self.key.file_index, ByteWindow::default())
                    .await?,
            )
        };

        let spec = EncoderSpec {
            input,
            start_offset,
            playlist_path: self.playlist_path.clone(),
            segment_template: self.output_dir.join(SEGMENT_TEMPLATE),
            base_url: self.base_url.clone(),
            segment_duration: self.transcode.segment_duration.as_secs(),
            video_codec,
            audio_codec,
        };

        let (handle, mut events) = self.encoder.spawn(spec).await?;
        {
            let mut core = self.core.lock().await;
            core.handle = Some(handle);
            core.last_error = None;
        }

        let Some(job) = self.me.upgrade() else {
            return Ok(());
        };
        let file_path = file.path;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EncoderEvent::Started => {
                        debug!("encoder started for {}", job.key);
                    }
                    EncoderEvent::CodecData(codecs) => {
                        {
                            let mut core = job.core.lock().await;
                            if let Some(duration) = codecs.duration_secs {
                                core.duration_secs = Some(duration);
                            }
                        }
                        if let Err(e) = job
                            .metadata
                            .store_file_metadata(job.key.content, &file_path, &codecs)
                            .await
                        {
                            warn!("failed to store codec metadata for {}: {e}", job.key);
                        }
                    }
                    EncoderEvent::Completed => {
                        info!("transcode of {} completed", job.key);
                        if let Err(e) =
                            tokio::fs::write(job.output_dir.join(FINISHED_SENTINEL), []).await
                        {
                            warn!("failed to write finished marker for {}: {e}", job.key);
                        }
                        let mut core = job.core.lock().await;
                        core.handle = None;
                        core.state = JobState::Finished;
                    }
                    EncoderEvent::Failed { reason } => {
                        warn!("transcode of {} failed: {reason}", job.key);
                        let mut core = job.core.lock().await;
                        core.handle = None;
                        core.last_error = Some(reason);
                        core.state = JobState::Failed;
                    }
                }
            }
        });

        Ok(())
    }
}

/// Picks `copy` when the known source codec is client-compatible, the
/// configured encoder otherwise.
fn select_codec(known: Option<&str>, copyable: &[String], encoder: &str) -> String {
    match known {
        Some(codec) if copyable.iter().any(|c| c == codec) => "copy".to_string(),
        _ => encoder.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::content::{
        CodecMetadata, ContentId, ContentSummary, FileEntry, SourceError,
    };

    struct FakeSource {
        file: FileEntry,
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn list_contents(&self) -> Result<Vec<ContentSummary>, SourceError> {
            Ok(vec![])
        }

        async fn content(&self, id: ContentId) -> Result<ContentSummary, SourceError> {
            Err(SourceError::ContentNotFound { content: id })
        }

        async fn file_entry(&self, _id: ContentId, _index: u32) -> Result<FileEntry, SourceError> {
            Ok(self.file.clone())
        }

        async fn open_read_stream(
            &self,
            _id: ContentId,
            _index: u32,
            _window: ByteWindow,
        ) -> Result<ByteStream, SourceError> {
            Ok(Box::new(std::io::Cursor::new(Vec::new())))
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

    #[derive(Default)]
    struct HandleFlags {
        suspended: AtomicBool,
        resumed: AtomicBool,
        killed: AtomicBool,
    }

    struct FakeHandle {
        flags: Arc<HandleFlags>,
    }

    impl EncoderHandle for FakeHandle {
        fn suspend(&mut self) -> Result<(), EncoderError> {
            self.flags.suspended.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&mut self) -> Result<(), EncoderError> {
            self.flags.resumed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn kill(&mut self) {
            self.flags.killed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeEncoder {
        write_playlist: bool,
        events: std::sync::Mutex<Vec<EncoderEvent>>,
        flags: Arc<HandleFlags>,
        spawn_count: AtomicUsize,
        offsets: std::sync::Mutex<Vec<f64>>,
    }

    impl FakeEncoder {
        fn new(write_playlist: bool, events: Vec<EncoderEvent>) -> Arc<Self> {
            Arc::new(Self {
                write_playlist,
                events: std::sync::Mutex::new(events),
                flags: Arc::new(HandleFlags::default()),
                spawn_count: AtomicUsize::new(0),
                offsets: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn spawn(
            &self,
            spec: EncoderSpec,
        ) -> Result<(Box<dyn EncoderHandle>, mpsc::Receiver<EncoderEvent>), EncoderError>
        {
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            self.offsets.lock().unwrap().push(spec.start_offset);

            if self.write_playlist {
                tokio::fs::write(
                    &spec.playlist_path,
                    "#EXTM3U\n#EXTINF:10.000000,\nsegment_000.ts\n",
                )
                .await
                .unwrap();
            }

            let (tx, rx) = mpsc::channel(16);
            for event in self.events.lock().unwrap().drain(..) {
                tx.try_send(event).unwrap();
            }

            Ok((
                Box::new(FakeHandle {
                    flags: Arc::clone(&self.flags),
                }),
                rx,
            ))
        }
    }

    fn test_config(root: &Path, idle_ms: u64) -> SlipstreamConfig {
        let mut config = SlipstreamConfig::default();
        config.storage.data_dir = root.join("data");
        config.transcode.output_root = root.join("hls");
        config.transcode.idle_timeout = Duration::from_millis(idle_ms);
        config.transcode.startup_timeout = Duration::from_secs(5);
        config
    }

    fn make_job(root: &Path, idle_ms: u64, encoder: Arc<FakeEncoder>) -> Arc<TranscodeJob> {
        let key = TranscodeKey::new(ContentId::new([7u8; 20]), 0);
        TranscodeJob::new(
            key,
            &test_config(root, idle_ms),
            Arc::new(FakeSource {
                file: FileEntry {
                    path: "movie.mkv".to_string(),
                    length: 100,
                    downloaded: 100,
                    progress: 1.0,
                },
            }),
            Arc::new(NullMetadata),
            encoder,
        )
    }

    #[tokio::test]
    async fn test_ensure_running_spawns_once() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, Arc::clone(&encoder));

        job.ensure_running(false).await.unwrap();
        assert_eq!(job.state().await, JobState::Running);

        job.ensure_running(false).await.unwrap();
        job.ensure_running(true).await.unwrap();
        assert_eq!(encoder.spawn_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_marker_short_circuits_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, Arc::clone(&encoder));

        tokio::fs::create_dir_all(job.output_dir()).await.unwrap();
        tokio::fs::write(job.output_dir().join(FINISHED_SENTINEL), [])
            .await
            .unwrap();

        job.ensure_running(false).await.unwrap();
        assert_eq!(job.state().await, JobState::Finished);
        assert_eq!(encoder.spawn_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_discards_finished_output_and_respawns() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, Arc::clone(&encoder));

        tokio::fs::create_dir_all(job.output_dir()).await.unwrap();
        tokio::fs::write(job.output_dir().join(FINISHED_SENTINEL), [])
            .await
            .unwrap();
        job.ensure_running(false).await.unwrap();

        job.ensure_running(true).await.unwrap();
        assert_eq!(encoder.spawn_count.load(Ordering::SeqCst), 1);
        assert_eq!(job.state().await, JobState::Running);
        assert!(
            !tokio::fs::try_exists(job.output_dir().join(FINISHED_SENTINEL))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_resume_offset_comes_from_existing_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, Arc::clone(&encoder));

        tokio::fs::create_dir_all(job.output_dir()).await.unwrap();
        tokio::fs::write(
            job.output_dir().join(PLAYLIST_NAME),
            "#EXTM3U\n#EXTINF:10.0,\nsegment_000.ts\n#EXTINF:10.0,\nsegment_001.ts\n",
        )
        .await
        .unwrap();

        job.ensure_running(false).await.unwrap();

        let offsets = encoder.offsets.lock().unwrap();
        assert_eq!(offsets.len(), 1);
        assert!((offsets[0] - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_idle_job_is_suspended_and_resumes_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 50, Arc::clone(&encoder));

        job.ensure_running(false).await.unwrap();
        assert_eq!(job.state().await, JobState::Running);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(job.state().await, JobState::Paused);
        assert!(encoder.flags.suspended.load(Ordering::SeqCst));

        job.ensure_running(false).await.unwrap();
        assert_eq!(job.state().await, JobState::Running);
        assert!(encoder.flags.resumed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_segment_read_wakes_paused_job() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 50, Arc::clone(&encoder));

        job.ensure_running(false).await.unwrap();
        tokio::fs::write(job.output_dir().join("segment_000.ts"), b"AAAA")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(job.state().await, JobState::Paused);

        job.read_segment("segment_000.ts").await.unwrap();
        assert_eq!(job.state().await, JobState::Running);
        assert!(encoder.flags.resumed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_completed_event_finishes_job_and_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![EncoderEvent::Completed]);
        let job = make_job(dir.path(), 60_000, encoder);

        job.ensure_running(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(job.state().await, JobState::Finished);
        assert!(
            tokio::fs::try_exists(job.output_dir().join(FINISHED_SENTINEL))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_encoder_failure_surfaces_reason() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(
            false,
            vec![EncoderEvent::Failed {
                reason: "boom".to_string(),
            }],
        );
        let job = make_job(dir.path(), 60_000, encoder);

        let err = job.ensure_running(false).await.unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::EncoderFailure { ref reason } if reason == "boom"
        ));
        assert_eq!(job.state().await, JobState::Failed);
    }

    #[tokio::test]
    async fn test_kill_stops_process_and_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, Arc::clone(&encoder));

        job.ensure_running(false).await.unwrap();
        job.kill().await.unwrap();

        assert!(encoder.flags.killed.load(Ordering::SeqCst));
        assert_eq!(job.state().await, JobState::NotStarted);
        assert!(!tokio::fs::try_exists(job.output_dir()).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_manifest_before_spawn_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let job = make_job(dir.path(), 60_000, FakeEncoder::new(true, vec![]));

        assert!(matches!(
            job.read_manifest().await,
            Err(TranscodeError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_read_segment_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let job = make_job(dir.path(), 60_000, FakeEncoder::new(true, vec![]));

        for name in ["../../etc/passwd", "a/b.ts", "segment_000.mp4"] {
            assert!(matches!(
                job.read_segment(name).await,
                Err(TranscodeError::InvalidSegmentName { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_read_output_concatenates_segments_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(true, vec![]);
        let job = make_job(dir.path(), 60_000, encoder);

        job.ensure_running(false).await.unwrap();
        tokio::fs::write(job.output_dir().join("segment_000.ts"), b"AAAA")
            .await
            .unwrap();

        let mut reader = job.read_output_from(0.0).await.unwrap();
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();
        assert_eq!(buffer, b"AAAA");
    }

    #[test]
    fn test_select_codec_copies_compatible_sources() {
        let copyable = vec!["h264".to_string()];
        assert_eq!(select_codec(Some("h264"), &copyable, "libx264"), "copy");
        assert_eq!(select_codec(Some("hevc"), &copyable, "libx264"), "libx264");
        assert_eq!(select_codec(None, &copyable, "libx264"), "libx264");
    }
}
