//! HTTP request handlers for content delivery.

pub mod files;

pub use files::{
    delete_content_transcodes, delete_hls, get_content, get_file, get_hls_manifest,
    get_hls_segment, get_transcoded, list_contents,
};
