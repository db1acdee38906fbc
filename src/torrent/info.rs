//! Torrent metadata structures
//!
//! Provides the immutable view of a parsed .torrent file.

use serde::Serialize;
use sha1::{Digest, Sha1};

/// Length of a SHA-1 digest
pub const HASH_LEN: usize = 20;

/// Metadata derived from a .torrent file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Tracker announce URL
    pub announce: String,
    /// Total content length in bytes
    pub length: u64,
    /// Nominal size of each piece in bytes
    pub piece_length: u64,
    /// Expected SHA-1 of every piece, in piece order
    pub piece_hashes: Vec<[u8; 20]>,
    /// SHA-1 of the canonical encoding of the info dictionary
    pub info_hash: [u8; 20],
    /// Suggested file name, if the torrent carries one
    pub name: Option<String>,
}

/// Serializable summary used by `info --json`
#[derive(Debug, Clone, Serialize)]
pub struct TorrentSummary {
    pub tracker_url: String,
    pub length: u64,
    pub info_hash: String,
    pub piece_length: u64,
    pub piece_hashes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TorrentMetadata {
    /// Get number of pieces in torrent
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Get info hash as a lowercase hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Piece hashes as lowercase hex strings, in piece order
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.piece_hashes.iter().map(hex::encode).collect()
    }

    /// Get piece hash for a specific piece index
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        self.piece_hashes.get(index).copied()
    }

    /// Actual length of a piece. Every piece has the nominal length except the
    /// last, which holds whatever remains of the content.
    pub fn piece_len(&self, index: usize) -> Option<u64> {
        if index >= self.piece_count() {
            return None;
        }

        if index + 1 < self.piece_count() {
            return Some(self.piece_length);
        }

        match self.length % self.piece_length {
            0 => Some(self.piece_length),
            rem => Some(rem),
        }
    }

    /// Compute the SHA-1 digest of a byte sequence
    pub fn sha1(data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Split the concatenated `pieces` field into 20-byte hashes.
    /// Returns `None` when the length is not a multiple of 20.
    pub fn split_piece_hashes(pieces_bytes: &[u8]) -> Option<Vec<[u8; 20]>> {
        if pieces_bytes.len() % HASH_LEN != 0 {
            return None;
        }

        let mut pieces = Vec::with_capacity(pieces_bytes.len() / HASH_LEN);
        for chunk in pieces_bytes.chunks_exact(HASH_LEN) {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            pieces.push(hash);
        }

        Some(pieces)
    }

    pub fn summary(&self) -> TorrentSummary {
        TorrentSummary {
            tracker_url: self.announce.clone(),
            length: self.length,
            info_hash: self.info_hash_hex(),
            piece_length: self.piece_length,
            piece_hashes: self.piece_hashes_hex(),
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(length: u64, piece_length: u64, pieces: usize) -> TorrentMetadata {
        TorrentMetadata {
            announce: "http://tracker.example.com/announce".to_string(),
            length,
            piece_length,
            piece_hashes: (0..pieces).map(|i| [i as u8; 20]).collect(),
            info_hash: [1u8; 20],
            name: Some("test.txt".to_string()),
        }
    }

    #[test]
    fn test_piece_len_short_last_piece() {
        let info = metadata(17, 10, 2);
        assert_eq!(info.piece_len(0), Some(10));
        assert_eq!(info.piece_len(1), Some(7));
        assert_eq!(info.piece_len(2), None);
    }

    #[test]
    fn test_piece_len_exact_multiple() {
        let info = metadata(20, 10, 2);
        assert_eq!(info.piece_len(1), Some(10));
    }

    #[test]
    fn test_piece_hash() {
        let info = metadata(2048, 1024, 2);
        assert_eq!(info.piece_hash(0), Some([0u8; 20]));
        assert_eq!(info.piece_hash(1), Some([1u8; 20]));
        assert_eq!(info.piece_hash(2), None);
    }

    #[test]
    fn test_hex_views() {
        let info = metadata(2048, 1024, 2);
        assert_eq!(info.info_hash_hex(), "01".repeat(20));
        assert_eq!(info.piece_hashes_hex(), vec!["00".repeat(20), "01".repeat(20)]);
    }

    #[test]
    fn test_sha1_known_answer() {
        assert_eq!(
            hex::encode(TorrentMetadata::sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_split_piece_hashes() {
        let hashes: Vec<u8> = (0..40).map(|i| i as u8).collect();
        let result = TorrentMetadata::split_piece_hashes(&hashes).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1][0], 20);
        assert!(TorrentMetadata::split_piece_hashes(&[1u8; 21]).is_none());
        assert_eq!(TorrentMetadata::split_piece_hashes(&[]), Some(vec![]));
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_value(metadata(17, 10, 2).summary()).unwrap();
        assert_eq!(json["length"], 17);
        assert_eq!(json["piece_length"], 10);
        assert_eq!(json["piece_hashes"].as_array().unwrap().len(), 2);
        assert_eq!(json["name"], "test.txt");
    }
}
