//! HTTP error mapping for delivery handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use slipstream_core::streaming::range::RangeError;
use slipstream_core::{SourceError, TranscodeError};
use tracing::warn;

/// Errors a delivery handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Range(RangeError::MalformedRange) => StatusCode::BAD_REQUEST,
            ApiError::Range(RangeError::UnsatisfiableRange) => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Source(SourceError::Io(e)) => io_status(e),
            ApiError::Source(_) => StatusCode::NOT_FOUND,
            ApiError::Transcode(e) => transcode_status(e),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

fn io_status(e: &std::io::Error) -> StatusCode {
    if e.kind() == std::io::ErrorKind::NotFound {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn transcode_status(e: &TranscodeError) -> StatusCode {
    match e {
        TranscodeError::StartupTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        TranscodeError::EncoderFailure { .. } | TranscodeError::Encoder(_) => {
            StatusCode::BAD_GATEWAY
        }
        TranscodeError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        TranscodeError::InvalidSegmentName { .. } => StatusCode::NOT_FOUND,
        TranscodeError::Source(SourceError::Io(e)) => io_status(e),
        TranscodeError::Source(_) => StatusCode::NOT_FOUND,
        TranscodeError::Io(e) => io_status(e),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}
