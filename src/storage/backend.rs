//! Piece sink abstraction
//!
//! A verified piece is handed to a sink, which decides where the bytes go.
//! `FileSink` writes to disk; `MemorySink` keeps pieces in memory.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;

/// Destination for verified pieces
#[async_trait]
pub trait PieceSink: Send {
    /// Store a verified piece. Implementations must not modify the data.
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()>;
}

/// Collects pieces in memory, keyed by index
#[derive(Debug, Default)]
pub struct MemorySink {
    pieces: BTreeMap<u32, Bytes>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored piece
    pub fn piece(&self, piece_index: u32) -> Option<&Bytes> {
        self.pieces.get(&piece_index)
    }

    /// Number of pieces stored
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

#[async_trait]
impl PieceSink for MemorySink {
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()> {
        debug!("Storing piece {} in memory ({} bytes)", piece_index, data.len());
        self.pieces.insert(piece_index, data);
        Ok(())
    }
}
