//! Slipstream Web - HTTP delivery for torrent-backed media
//!
//! Exposes the content catalog and three delivery paths over HTTP: raw
//! range-capable file access, DLNA-flavored MPEG-TS streaming, and HLS
//! playlists with per-segment endpoints.

pub mod error;
pub mod handlers;
pub mod local;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, app_state, router, run_server};
