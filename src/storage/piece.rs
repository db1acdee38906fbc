//! Piece assembly module
//!
//! Splits a piece into block requests, places received blocks by offset and
//! gates the result on its SHA-1 hash.

use bytes::Bytes;
use tracing::{debug, error, trace};

use crate::error::{Result, TorrentError};
use crate::protocol::BLOCK_SIZE;
use crate::torrent::{TorrentMetadata, MAX_PIECE_LENGTH};

/// One block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    /// Piece index this block belongs to
    pub piece_index: u32,
    /// Offset within the piece
    pub begin: u32,
    /// Length of the block
    pub length: u32,
}

/// Split a piece into blocks of at most `BLOCK_SIZE`, in ascending offset
/// order. The last block holds the remainder.
pub fn plan_blocks(piece_index: u32, piece_len: u32) -> Vec<BlockRequest> {
    (0..piece_len)
        .step_by(BLOCK_SIZE as usize)
        .map(|begin| BlockRequest {
            piece_index,
            begin,
            length: BLOCK_SIZE.min(piece_len - begin),
        })
        .collect()
}

/// A piece being assembled from blocks
#[derive(Debug, Clone)]
pub struct Piece {
    /// Piece index
    pub index: u32,
    /// Expected SHA1 hash
    pub hash: [u8; 20],
    data: Vec<u8>,
    /// Received flag per block
    blocks: Vec<bool>,
}

impl Piece {
    /// Create an empty piece of `length` bytes
    pub fn new(index: u32, length: u32, expected_hash: [u8; 20]) -> Self {
        let num_blocks = length.div_ceil(BLOCK_SIZE) as usize;
        Self {
            index,
            hash: expected_hash,
            data: vec![0u8; length as usize],
            blocks: vec![false; num_blocks],
        }
    }

    /// Create the piece at `index` of a torrent
    pub fn for_torrent(metadata: &TorrentMetadata, index: u32) -> Result<Self> {
        let (length, hash) = metadata
            .piece_len(index as usize)
            .zip(metadata.piece_hash(index as usize))
            .ok_or_else(|| {
                TorrentError::validation_error_with_field(
                    format!(
                        "Piece index {} out of range (torrent has {} pieces)",
                        index,
                        metadata.piece_count()
                    ),
                    "piece_index",
                )
            })?;

        if length > MAX_PIECE_LENGTH {
            return Err(TorrentError::validation_error_with_field(
                format!("Piece length {} exceeds the {} byte limit", length, MAX_PIECE_LENGTH),
                "piece length",
            ));
        }
        Ok(Self::new(index, length as u32, hash))
    }

    /// Piece length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All block requests for this piece
    pub fn block_requests(&self) -> Vec<BlockRequest> {
        plan_blocks(self.index, self.data.len() as u32)
    }

    /// Place a received block at its offset
    pub fn add_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let block_index = (begin / BLOCK_SIZE) as usize;
        if begin % BLOCK_SIZE != 0 || block_index >= self.blocks.len() {
            return Err(TorrentError::protocol_error(format!(
                "Block offset {} is not a block boundary of piece {}",
                begin, self.index
            )));
        }

        let start = begin as usize;
        let expected = (BLOCK_SIZE as usize).min(self.data.len() - start);
        if block.len() != expected {
            return Err(TorrentError::protocol_error(format!(
                "Block at offset {} of piece {} has {} bytes, expected {}",
                begin,
                self.index,
                block.len(),
                expected
            )));
        }

        self.data[start..start + expected].copy_from_slice(block);
        self.blocks[block_index] = true;
        trace!("Stored block {} of piece {}", block_index, self.index);
        Ok(())
    }

    /// Check if all blocks are downloaded
    pub fn is_complete(&self) -> bool {
        self.blocks.iter().all(|received| *received)
    }

    /// Verify the assembled piece and hand out its bytes.
    /// Nothing is returned unless every block arrived and the hash matches.
    pub fn verify(self) -> Result<Bytes> {
        if !self.is_complete() {
            let missing = self.blocks.iter().filter(|received| !**received).count();
            return Err(TorrentError::protocol_error(format!(
                "Piece {} incomplete: {} blocks missing",
                self.index, missing
            )));
        }

        let actual = TorrentMetadata::sha1(&self.data);
        if actual != self.hash {
            error!(
                "Piece {} failed verification: expected {}, got {}",
                self.index,
                hex::encode(self.hash),
                hex::encode(actual)
            );
            return Err(TorrentError::integrity_error(self.index, self.hash, actual));
        }

        debug!("Piece {} verified ({} bytes)", self.index, self.data.len());
        Ok(Bytes::from(self.data))
    }
}
