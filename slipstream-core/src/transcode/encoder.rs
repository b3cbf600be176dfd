//! External encoder abstraction.
//!
//! The encoding process is a black-box collaborator reached through an
//! ownership-exclusive handle, so the job state machine stays testable
//! with a fake encoder. The production implementation drives an `ffmpeg`
//! child process producing an HLS playlist plus MPEG-TS segments.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::content::{ByteStream, CodecMetadata};

/// Events reported by a running encoder process.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// The process has started.
    Started,
    /// Input codec information became available.
    CodecData(CodecMetadata),
    /// The encoder reached the end of its input successfully.
    Completed,
    /// The encoder exited with a real error. A kill-initiated exit is
    /// benign and never reported as failure.
    Failed { reason: String },
}

/// Errors from spawning or controlling an encoder process.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Failed to spawn encoder: {reason}")]
    SpawnFailed { reason: String },

    #[error("Encoder process control failed: {reason}")]
    ControlFailed { reason: String },
}

/// Input handed to the encoder: a seekable on-disk file for completed
/// downloads, or the engine's byte stream for in-flight ones.
pub enum EncoderInput {
    Path(PathBuf),
    Stream(ByteStream),
}

impl std::fmt::Debug for EncoderInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderInput::Path(path) => f.debug_tuple("Path").field(path).finish(),
            EncoderInput::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// Everything needed to spawn one encode.
#[derive(Debug)]
pub struct EncoderSpec {
    pub input: EncoderInput,
    /// Input seek offset in seconds (resume point)
    pub start_offset: f64,
    /// Playlist file the encoder appends to
    pub playlist_path: PathBuf,
    /// Segment file template inside the output directory
    pub segment_template: PathBuf,
    /// Public URL prefix written into the playlist
    pub base_url: String,
    /// Target segment duration in seconds
    pub segment_duration: u64,
    /// `copy` or an encoder name
    pub video_codec: String,
    /// `copy` or an encoder name
    pub audio_codec: String,
}

/// Ownership-exclusive control over a spawned encoder process.
pub trait EncoderHandle: Send {
    /// Suspends the process without terminating it, preserving partial
    /// output and decoder state.
    fn suspend(&mut self) -> Result<(), EncoderError>;

    /// Resumes a suspended process.
    fn resume(&mut self) -> Result<(), EncoderError>;

    /// Stops the process for good. The resulting exit is reported as
    /// benign, not as `EncoderEvent::Failed`.
    fn kill(&mut self);
}

/// Spawns encoder processes.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Starts an encode and returns its control handle plus event stream.
    ///
    /// # Errors
    /// - `EncoderError::SpawnFailed` - The process could not be started
    async fn spawn(
        &self,
        spec: EncoderSpec,
    ) -> Result<(Box<dyn EncoderHandle>, mpsc::Receiver<EncoderEvent>), EncoderError>;
}

/// Production encoder driving an `ffmpeg` child process.
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn spawn(
        &self,
        spec: EncoderSpec,
    ) -> Result<(Box<dyn EncoderHandle>, mpsc::Receiver<EncoderEvent>), EncoderError> {
        let mut cmd = Command::new(&self.ffmpeg_path);

        if spec.start_offset > 0.0 {
            cmd.arg("-ss").arg(format!("{:.3}", spec.start_offset));
        }

        match &spec.input {
            EncoderInput::Path(path) => {
                cmd.arg("-i").arg(path);
                cmd.stdin(Stdio::null());
            }
            EncoderInput::Stream(_) => {
                cmd.arg("-i").arg("pipe:0");
                cmd.stdin(Stdio::piped());
            }
        }

        cmd.arg("-c:v")
            .arg(&spec.video_codec)
            .arg("-c:a")
            .arg(&spec.audio_codec)
            .arg("-max_muxing_queue_size")
            .arg("400")
            .arg("-preset")
            .arg("ultrafast")
            .arg("-tune")
            .arg("zerolatency")
            .arg("-crf")
            .arg("22")
            .arg("-sn")
            .arg("-hls_time")
            .arg(spec.segment_duration.to_string())
            .arg("-hls_list_size")
            .arg("0")
            .arg("-hls_flags")
            .arg("append_list+temp_file")
            .arg("-hls_allow_cache")
            .arg("1")
            .arg("-hls_base_url")
            .arg(&spec.base_url)
            .arg("-hls_segment_filename")
            .arg(&spec.segment_template)
            .arg("-f")
            .arg("hls")
            .arg(&spec.playlist_path);

        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| EncoderError::SpawnFailed {
            reason: e.to_string(),
        })?;

        debug!("spawned ffmpeg for {}", spec.playlist_path.display());

        if let EncoderInput::Stream(mut reader) = spec.input {
            let mut stdin = child.stdin.take().ok_or(EncoderError::SpawnFailed {
                reason: "encoder stdin unavailable".to_string(),
            })?;
            tokio::spawn(async move {
                // Broken pipe here just means the encoder exited first.
                if let Err(e) = tokio::io::copy(&mut reader, &mut stdin).await {
                    debug!("encoder input feed ended: {e}");
                }
            });
        }

        let stderr = child.stderr.take().ok_or(EncoderError::SpawnFailed {
            reason: "encoder stderr unavailable".to_string(),
        })?;

        let pid = child.id();
        let stopping = Arc::new(AtomicBool::new(false));
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (event_tx, event_rx) = mpsc::channel(16);

        let monitor_stopping = Arc::clone(&stopping);
        tokio::spawn(async move {
            let _ = event_tx.send(EncoderEvent::Started).await;

            let mut lines = BufReader::new(stderr).lines();
            let mut metadata = CodecMetadata::default();
            let mut metadata_sent = false;

            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let input_complete = parse_stderr_line(&mut metadata, &line);
                            if input_complete && !metadata_sent {
                                metadata_sent = true;
                                let _ = event_tx
                                    .send(EncoderEvent::CodecData(metadata.clone()))
                                    .await;
                            }
                        }
                        _ => break, // EOF, process is exiting
                    },
                    _ = &mut kill_rx => {
                        let _ = child.start_kill();
                        break;
                    }
                }
            }

            let status = child.wait().await;

            if monitor_stopping.load(Ordering::SeqCst) {
                debug!("encoder stopped deliberately");
                return;
            }

            match status {
                Ok(status) if status.success() => {
                    let _ = event_tx.send(EncoderEvent::Completed).await;
                }
                Ok(status) => {
                    let _ = event_tx
                        .send(EncoderEvent::Failed {
                            reason: format!("encoder exited with {status}"),
                        })
                        .await;
                }
                Err(e) => {
                    let _ = event_tx
                        .send(EncoderEvent::Failed {
                            reason: format!("failed to reap encoder: {e}"),
                        })
                        .await;
                }
            }
        });

        Ok((
            Box::new(FfmpegHandle {
                pid,
                stopping,
                kill_tx: Some(kill_tx),
            }),
            event_rx,
        ))
    }
}

/// Handle to a running ffmpeg child.
///
/// Suspend/resume map to SIGSTOP/SIGCONT on unix; elsewhere they degrade
/// to best-effort no-ops while the job still tracks Paused/Running state.
struct FfmpegHandle {
    pid: Option<u32>,
    stopping: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl EncoderHandle for FfmpegHandle {
    fn suspend(&mut self) -> Result<(), EncoderError> {
        match self.pid {
            Some(pid) => signal_child(pid, SuspendSignal::Stop),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<(), EncoderError> {
        match self.pid {
            Some(pid) => signal_child(pid, SuspendSignal::Continue),
            None => Ok(()),
        }
    }

    fn kill(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FfmpegHandle {
    fn drop(&mut self) {
        // A handle dropped while the process is alive means teardown.
        if self.kill_tx.is_some() {
            self.kill();
        }
    }
}

enum SuspendSignal {
    Stop,
    Continue,
}

#[cfg(unix)]
fn signal_child(pid: u32, signal: SuspendSignal) -> Result<(), EncoderError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = match signal {
        SuspendSignal::Stop => Signal::SIGSTOP,
        SuspendSignal::Continue => Signal::SIGCONT,
    };
    kill(Pid::from_raw(pid as i32), signal).map_err(|e| EncoderError::ControlFailed {
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn signal_child(_pid: u32, _signal: SuspendSignal) -> Result<(), EncoderError> {
    tracing::warn!("process suspension not supported on this platform");
    Ok(())
}

/// Updates `metadata` from one ffmpeg stderr line. Returns true once the
/// input section is fully reported and the metadata can be published.
fn parse_stderr_line(metadata: &mut CodecMetadata, line: &str) -> bool {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix("Input #0, ") {
        if let Some((container, _)) = rest.split_once(',') {
            metadata.container = Some(container.trim().to_string());
        }
    } else if let Some(rest) = trimmed.strip_prefix("Duration: ") {
        if let Some(clock) = rest.split(',').next() {
            metadata.duration_secs = parse_clock(clock.trim());
        }
    } else if metadata.video_codec.is_none()
        && let Some(rest) = find_stream_codec(trimmed, "Video: ")
    {
        metadata.video_codec = Some(rest);
    } else if metadata.audio_codec.is_none()
        && let Some(rest) = find_stream_codec(trimmed, "Audio: ")
    {
        metadata.audio_codec = Some(rest);
    } else if trimmed.starts_with("Output #0") || trimmed.starts_with("Stream mapping:") {
        return true;
    }

    false
}

fn find_stream_codec(line: &str, marker: &str) -> Option<String> {
    if !line.starts_with("Stream #0") {
        return None;
    }
    let rest = &line[line.find(marker)? + marker.len()..];
    let codec: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ',' && *c != '(')
        .collect();
    (!codec.is_empty()).then_some(codec)
}

/// Parses an ffmpeg clock value (`HH:MM:SS.cc`) into seconds.
fn parse_clock(clock: &str) -> Option<f64> {
    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
