//! File storage module
//!
//! Writes a downloaded piece to a path on disk.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::{Result, TorrentError};
use crate::storage::backend::PieceSink;

/// Writes each piece to a single output file, replacing its contents
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PieceSink for FileSink {
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()> {
        let path = &self.path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                debug!("Creating directory: {}", parent.display());
                fs::create_dir_all(parent).await.map_err(|e| {
                    error!("Failed to create directory '{}': {}", parent.display(), e);
                    TorrentError::storage_error_full("Failed to create directory", parent.display().to_string(), e.to_string())
                })?;
            }
        }

        let mut f = fs::File::create(path).await.map_err(|e| {
            error!("Failed to create file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to create file", path.display().to_string(), e.to_string())
        })?;
        f.write_all(&data).await.map_err(|e| {
            error!("Failed to write piece {} to '{}': {}", piece_index, path.display(), e);
            TorrentError::storage_error_full("Failed to write piece", path.display().to_string(), e.to_string())
        })?;
        f.flush().await.map_err(|e| {
            error!("Failed to flush file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to flush file", path.display().to_string(), e.to_string())
        })?;

        info!("Wrote piece {} ({} bytes) to {}", piece_index, data.len(), path.display());
        Ok(())
    }
}
