//! Slipstream server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use slipstream_core::SlipstreamConfig;
use slipstream_web::local::{LocalContentSource, MemoryMetadataStore};
use slipstream_web::run_server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "slipstream",
    about = "Streams torrent-backed media with on-demand transcoding"
)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Root directory holding downloaded content
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for generated playlists and segments
    #[arg(long)]
    hls_dir: Option<PathBuf>,

    /// ffmpeg binary to invoke
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SlipstreamConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(dir) = cli.hls_dir {
        config.transcode.output_root = dir;
    }
    if let Some(path) = cli.ffmpeg {
        config.transcode.ffmpeg_path = path;
    }

    let engine = Arc::new(LocalContentSource::new(config.storage.data_dir.clone()));
    let metadata = Arc::new(MemoryMetadataStore::new());
    run_server(config, engine, metadata, cli.listen).await
}
