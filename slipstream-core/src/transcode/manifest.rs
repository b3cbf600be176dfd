//! Minimal HLS playlist reader.
//!
//! The encoder appends `#EXTINF`/segment pairs to `list.m3u8` as it runs.
//! Summing the recorded durations yields the resume offset after a crash
//! or eviction, so no separate checkpoint format is needed.

use std::path::Path;

/// One entry of a playlist: a segment URI and its duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub uri: String,
}

impl Segment {
    /// File name component of the segment URI (the playlist records the
    /// public base URL, segments live flat in the output directory).
    pub fn file_name(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or(&self.uri)
    }
}

/// A parsed playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub segments: Vec<Segment>,
}

impl Manifest {
    /// Parses playlist text, keeping only complete `#EXTINF` + URI pairs.
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut pending_duration: Option<f64> = None;

        for line in text.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("#EXTINF:") {
                pending_duration = rest
                    .split(',')
                    .next()
                    .and_then(|value| value.trim().parse().ok());
            } else if !line.is_empty() && !line.starts_with('#') {
                if let Some(duration) = pending_duration.take() {
                    segments.push(Segment {
                        duration,
                        uri: line.to_string(),
                    });
                }
            }
        }

        Self { segments }
    }

    /// Loads and parses a playlist file.
    ///
    /// # Errors
    /// Propagates the underlying read error (including `NotFound` when the
    /// encoder has not produced a playlist yet).
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&text))
    }

    /// Total duration of all recorded segments, in seconds.
    ///
    /// This is the input offset encoding has durably progressed to.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|segment| segment.duration).sum()
    }

    /// Segments whose playback window ends after `start_secs`, for serving
    /// already-produced output from a time-seek point.
    pub fn segments_from(&self, start_secs: f64) -> Vec<&Segment> {
        let mut elapsed = 0.0;
        let mut selected = Vec::new();
        for segment in &self.segments {
            elapsed += segment.duration;
            if elapsed > start_secs {
                selected.push(segment);
            }
        }
        selected
    }
}
