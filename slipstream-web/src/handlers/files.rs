//! Content listing and media delivery handlers.
//!
//! Raw file bytes are served with HTTP range semantics straight off the
//! source stream. Transcoded delivery comes in two shapes: a single
//! MPEG-TS stream with DLNA time-seek headers for renderers, and an HLS
//! playlist plus segment endpoints for segment-aware players. Both drive
//! the same transcode job underneath.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde::Serialize;
use slipstream_core::content::{
    ByteWindow, ContentId, ContentSummary, FileEntry, TranscodeKey, is_video,
};
use slipstream_core::streaming::range::RangeError;
use slipstream_core::streaming::{format_dlna_duration, parse_range};
use slipstream_core::transcode::TranscodeJob;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ContentDto {
    pub id: String,
    pub name: String,
    pub files: Vec<FileDto>,
}

#[derive(Debug, Serialize)]
pub struct FileDto {
    pub index: u32,
    pub name: String,
    pub length: u64,
    pub progress: f64,
    pub content_type: String,
    pub video: bool,
}

impl ContentDto {
    fn from_summary(summary: ContentSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            name: summary.name,
            files: summary
                .files
                .iter()
                .enumerate()
                .map(|(index, file)| FileDto::new(index as u32, file))
                .collect(),
        }
    }
}

impl FileDto {
    fn new(index: u32, file: &FileEntry) -> Self {
        Self {
            index,
            name: file.name().to_string(),
            length: file.length,
            progress: file.progress,
            content_type: mime_guess::from_path(file.name())
                .first_or_octet_stream()
                .to_string(),
            video: is_video(file.name()),
        }
    }
}

/// GET /api/contents
pub async fn list_contents(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContentDto>>, ApiError> {
    let contents = state.engine.list_contents().await?;
    Ok(Json(
        contents.into_iter().map(ContentDto::from_summary).collect(),
    ))
}

/// GET /api/contents/{content}
pub async fn get_content(
    State(state): State<AppState>,
    Path(content): Path<String>,
) -> Result<Json<ContentDto>, ApiError> {
    let id = ContentId::from_hex(&content)?;
    let summary = state.engine.content(id).await?;
    Ok(Json(ContentDto::from_summary(summary)))
}

/// GET /api/contents/{content}/files/{index}
///
/// Serves raw file bytes with HTTP range support. Requests without a
/// `Range` header, or with a non-byte unit, get the whole file.
pub async fn get_file(
    State(state): State<AppState>,
    Path((content, index)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = ContentId::from_hex(&content)?;
    let file = state.engine.file_entry(id, index).await?;
    let total = file.length;
    let content_type = mime_guess::from_path(file.name())
        .first_or_octet_stream()
        .to_string();

    let Some(raw) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
    else {
        return full_file_response(&state, id, index, total, content_type).await;
    };

    let request = match parse_range(raw) {
        Ok(request) => request,
        Err(RangeError::UnsatisfiableRange) => return Ok(unsatisfiable_response(total)),
        Err(e) => return Err(e.into()),
    };

    if request.unit != "bytes" {
        return full_file_response(&state, id, index, total, content_type).await;
    }
    if request.ranges.len() > 1 {
        return Ok(unsatisfiable_response(total));
    }

    let (start, end) = match request.ranges[0].resolve(total) {
        Ok(bounds) => bounds,
        Err(RangeError::UnsatisfiableRange) => return Ok(unsatisfiable_response(total)),
        Err(e) => return Err(e.into()),
    };

    let reader = state
        .source
        .open(
            id,
            index,
            ByteWindow {
                start: Some(start),
                end: Some(end),
            },
        )
        .await?;

    debug!("serving {content}/{index} bytes {start}-{end}/{total}");
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            ("Content-Type", content_type),
            ("Content-Range", format!("bytes {start}-{end}/{total}")),
            ("Content-Length", (end - start + 1).to_string()),
            ("Accept-Ranges", "bytes".to_string()),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

async fn full_file_response(
    state: &AppState,
    id: ContentId,
    index: u32,
    total: u64,
    content_type: String,
) -> Result<Response, ApiError> {
    let reader = state.source.open(id, index, ByteWindow::default()).await?;
    Ok((
        StatusCode::OK,
        [
            ("Content-Type", content_type),
            ("Content-Length", total.to_string()),
            ("Accept-Ranges", "bytes".to_string()),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

fn unsatisfiable_response(total: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [("Content-Range", format!("bytes */{total}"))],
    )
        .into_response()
}

/// GET /api/contents/{content}/files/{index}/transcoded
///
/// Serves the transcoded output as one MPEG-TS stream for DLNA renderers.
/// Seeking comes in through the `TimeSeekRange.dlna.org` header or a
/// `start` query parameter, in seconds.
pub async fn get_transcoded(
    State(state): State<AppState>,
    Path((content, index)): Path<(String, u32)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = ContentId::from_hex(&content)?;
    let file = state.engine.file_entry(id, index).await?;
    if !is_video(file.name()) {
        return Err(ApiError::NotFound(format!(
            "{} is not a video file",
            file.name()
        )));
    }
    if !params.contains_key("clientId") {
        return Err(ApiError::NotFound("missing clientId".to_string()));
    }

    let start_secs = seek_start_secs(&headers, &params);

    let job = state
        .registry
        .get_or_create(TranscodeKey::new(id, index))
        .await;
    job.ensure_running(false).await?;

    let duration = job.duration_secs().await.unwrap_or(0.0);
    let seek_range = format!(
        "npt={}-{}/{}",
        format_dlna_duration(start_secs),
        format_dlna_duration(duration),
        format_dlna_duration(duration)
    );

    let reader = job.read_output_from(start_secs).await?;
    let stream = TouchOnDrop {
        inner: ReaderStream::new(reader),
        job,
    };

    Ok((
        StatusCode::OK,
        [
            ("Content-Type", "video/mpegts".to_string()),
            ("TransferMode.dlna.org", "Streaming".to_string()),
            ("TimeSeekRange.dlna.org", seek_range.clone()),
            ("X-Seek-Range", seek_range),
            ("Cache-Control", "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Seek offset in seconds from the DLNA time-seek header, falling back to
/// the `start` query parameter.
fn seek_start_secs(headers: &HeaderMap, params: &HashMap<String, String>) -> f64 {
    if let Some(value) = headers
        .get("TimeSeekRange.dlna.org")
        .and_then(|value| value.to_str().ok())
        && let Ok(request) = parse_range(value)
        && let Some(start) = request.ranges[0].start
    {
        return start as f64;
    }
    params
        .get("start")
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

/// GET /api/contents/{content}/files/{index}/hls
///
/// Serves the current playlist, starting the encoder on first request.
/// `?force` discards a finished encode and redoes it from scratch.
pub async fn get_hls_manifest(
    State(state): State<AppState>,
    Path((content, index)): Path<(String, u32)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let id = ContentId::from_hex(&content)?;
    let file = state.engine.file_entry(id, index).await?;
    if !is_video(file.name()) {
        return Err(ApiError::NotFound(format!(
            "{} is not a video file",
            file.name()
        )));
    }

    let force = params.contains_key("force");
    let job = state
        .registry
        .get_or_create(TranscodeKey::new(id, index))
        .await;
    job.ensure_running(force).await?;

    let manifest = job.read_manifest().await?;
    Ok((
        StatusCode::OK,
        [
            ("Content-Type", "application/x-mpegURL".to_string()),
            ("Cache-Control", "no-cache".to_string()),
        ],
        manifest,
    )
        .into_response())
}

/// GET /api/contents/{content}/files/{index}/hls/{segment}
pub async fn get_hls_segment(
    State(state): State<AppState>,
    Path((content, index, segment)): Path<(String, u32, String)>,
) -> Result<Response, ApiError> {
    let id = ContentId::from_hex(&content)?;
    let job = state
        .registry
        .get(TranscodeKey::new(id, index))
        .await
        .ok_or_else(|| ApiError::NotFound("no transcode for this file".to_string()))?;

    let data = job.read_segment(&segment).await?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "video/mp2ts".to_string())],
        data,
    )
        .into_response())
}

/// DELETE /api/contents/{content}/files/{index}/hls
pub async fn delete_hls(
    State(state): State<AppState>,
    Path((content, index)): Path<(String, u32)>,
) -> Result<StatusCode, ApiError> {
    let id = ContentId::from_hex(&content)?;
    state.registry.remove(TranscodeKey::new(id, index)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/contents/{content}/hls
pub async fn delete_content_transcodes(
    State(state): State<AppState>,
    Path(content): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ContentId::from_hex(&content)?;
    state.registry.remove_content(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pass-through stream that restarts its job's idle clock when the
/// response body is dropped, so a client disconnect begins a clean idle
/// countdown instead of leaving the last mid-stream timer running.
struct TouchOnDrop<S> {
    inner: S,
    job: Arc<TranscodeJob>,
}

impl<S: Stream + Unpin> Stream for TouchOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<S> Drop for TouchOnDrop<S> {
    fn drop(&mut self) {
        self.job.keep_alive();
    }
}
