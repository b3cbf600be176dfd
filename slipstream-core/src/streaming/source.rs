//! Byte-window streams over complete or still-downloading files.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::content::{ByteStream, ByteWindow, ContentId, ContentSource, SourceError};

/// Opens bounded byte streams over content files.
///
/// Fully downloaded files are read from their on-disk copy, which supports
/// arbitrary seeks. Incomplete files go through the torrent engine's
/// streaming capability, which honors a start offset but not end
/// truncation; the end bound is enforced here so both paths look the same
/// to HTTP range semantics.
pub struct SourceStream {
    data_dir: PathBuf,
    engine: Arc<dyn ContentSource>,
}

impl SourceStream {
    pub fn new(data_dir: PathBuf, engine: Arc<dyn ContentSource>) -> Self {
        Self { data_dir, engine }
    }

    /// Opens a reader over `window` of the given file.
    ///
    /// # Errors
    /// - `SourceError::FileNotFound` - Unknown content or file index
    /// - `SourceError::Io` - Disk read failed
    pub async fn open(
        &self,
        content: ContentId,
        index: u32,
        window: ByteWindow,
    ) -> Result<ByteStream, SourceError> {
        let file = self.engine.file_entry(content, index).await?;
        let start = window.start.unwrap_or(0);

        if file.is_ready() {
            let path = self.data_dir.join(&file.path);
            debug!("serving {content}/{index} from disk: {}", path.display());

            let mut disk_file = tokio::fs::File::open(path).await?;
            if start > 0 {
                disk_file.seek(SeekFrom::Start(start)).await?;
            }
            return Ok(match window.end {
                Some(end) => Box::new(disk_file.take(end - start + 1)),
                None => Box::new(disk_file),
            });
        }

        debug!("serving {content}/{index} through engine stream (progress {:.2})", file.progress);
        let reader = self
            .engine
            .open_read_stream(
                content,
                index,
                ByteWindow {
                    start: window.start,
                    end: None,
                },
            )
            .await?;

        Ok(match window.end {
            Some(end) => Box::new(reader.take(end - start + 1)),
            None => reader,
        })
    }
}
