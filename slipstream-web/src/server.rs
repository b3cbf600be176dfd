//! HTTP server assembly.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};
use slipstream_core::SlipstreamConfig;
use slipstream_core::content::{ContentSource, MetadataStore};
use slipstream_core::streaming::SourceStream;
use slipstream_core::transcode::{Encoder, FfmpegEncoder, TranscodeRegistry};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{
    delete_content_transcodes, delete_hls, get_content, get_file, get_hls_manifest,
    get_hls_segment, get_transcoded, list_contents,
};

/// Shared state for all delivery handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn ContentSource>,
    pub source: Arc<SourceStream>,
    pub registry: Arc<TranscodeRegistry>,
}

/// Wires handler state from its collaborators.
pub fn app_state(
    config: SlipstreamConfig,
    engine: Arc<dyn ContentSource>,
    metadata: Arc<dyn MetadataStore>,
    encoder: Arc<dyn Encoder>,
) -> AppState {
    let source = Arc::new(SourceStream::new(
        config.storage.data_dir.clone(),
        Arc::clone(&engine),
    ));
    let registry = Arc::new(TranscodeRegistry::new(
        config,
        Arc::clone(&engine),
        metadata,
        encoder,
    ));
    AppState {
        engine,
        source,
        registry,
    }
}

/// Builds the delivery router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/contents", get(list_contents))
        .route("/api/contents/{content}", get(get_content))
        .route(
            "/api/contents/{content}/hls",
            delete(delete_content_transcodes),
        )
        .route("/api/contents/{content}/files/{index}", get(get_file))
        .route(
            "/api/contents/{content}/files/{index}/transcoded",
            get(get_transcoded),
        )
        .route(
            "/api/contents/{content}/files/{index}/hls",
            get(get_hls_manifest).delete(delete_hls),
        )
        .route(
            "/api/contents/{content}/files/{index}/hls/{segment}",
            get(get_hls_segment),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the delivery server until the listener fails.
pub async fn run_server(
    config: SlipstreamConfig,
    engine: Arc<dyn ContentSource>,
    metadata: Arc<dyn MetadataStore>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let encoder = Arc::new(FfmpegEncoder::new(config.transcode.ffmpeg_path.clone()));
    let state = app_state(config, engine, metadata, encoder);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
