//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use tracing::{debug, error, info, trace};

use crate::bencode::{self, BencodeDict, BencodeValue};
use crate::error::{Result, TorrentError};
use crate::torrent::info::TorrentMetadata;

/// Largest accepted `piece length`; a piece is buffered whole in memory
pub const MAX_PIECE_LENGTH: u64 = 64 * 1024 * 1024;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentMetadata> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let parsed = bencode::decode(data)?;
        Self::from_value(&parsed)
    }

    /// Parse a .torrent file from a file path
    pub async fn parse_file(path: &std::path::Path) -> Result<TorrentMetadata> {
        info!("Loading torrent file from: {}", path.display());

        let data = tokio::fs::read(path).await.map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// Extract metadata from an already decoded value tree
    pub fn from_value(parsed: &BencodeValue) -> Result<TorrentMetadata> {
        let root = parsed.as_dict().ok_or_else(|| {
            TorrentError::format_error(format!("Root must be a dictionary, found {}", parsed.kind()))
        })?;

        let announce = required(root, "announce")?
            .as_bytes()
            .ok_or_else(|| wrong_type("announce", "byte string"))?;
        let announce = String::from_utf8(announce.to_vec())
            .map_err(|_| TorrentError::format_error_with_field("Announce URL is not valid UTF-8", "announce"))?;

        let info_value = required(root, "info")?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| wrong_type("info", "dictionary"))?;

        let length = non_negative_int(info_dict, "length")?;
        let piece_length = non_negative_int(info_dict, "piece length")?;
        if piece_length == 0 {
            return Err(TorrentError::format_error_with_field("Piece length must be positive", "piece length"));
        }
        if piece_length > MAX_PIECE_LENGTH {
            return Err(TorrentError::format_error_with_field(
                format!("Piece length {} exceeds the {} byte limit", piece_length, MAX_PIECE_LENGTH),
                "piece length",
            ));
        }

        let pieces_bytes = required(info_dict, "pieces")?
            .as_bytes()
            .ok_or_else(|| wrong_type("pieces", "byte string"))?;
        let piece_hashes = TorrentMetadata::split_piece_hashes(pieces_bytes).ok_or_else(|| {
            TorrentError::format_error_with_field(
                format!("Pieces field length must be a multiple of 20, got {}", pieces_bytes.len()),
                "pieces",
            )
        })?;

        let name = info_value
            .get(b"name")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        // The input's key order is not guaranteed sorted, so hash the
        // canonical re-encoding rather than the original bytes.
        let info_bytes = bencode::encode(info_value);
        let info_hash = TorrentMetadata::sha1(&info_bytes);
        debug!("Info dictionary re-encoded to {} bytes", info_bytes.len());

        let expected_pieces = length.div_ceil(piece_length);
        if expected_pieces != piece_hashes.len() as u64 {
            error!(
                "Piece count mismatch: {} hashes for {} bytes at {} per piece",
                piece_hashes.len(),
                length,
                piece_length
            );
            return Err(TorrentError::format_error_with_field(
                format!(
                    "Expected {} piece hashes for {} bytes at {} per piece, found {}",
                    expected_pieces,
                    length,
                    piece_length,
                    piece_hashes.len()
                ),
                "pieces",
            ));
        }

        info!(
            "Successfully parsed torrent: info_hash={}, length={}, pieces={}",
            hex::encode(info_hash),
            length,
            piece_hashes.len()
        );
        Ok(TorrentMetadata {
            announce,
            length,
            piece_length,
            piece_hashes,
            info_hash,
            name,
        })
    }
}

fn required<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a BencodeValue> {
    dict.get(key.as_bytes())
        .ok_or_else(|| TorrentError::format_error_with_field(format!("Missing {} field", key), key))
}

fn wrong_type(key: &str, expected: &str) -> TorrentError {
    TorrentError::format_error_with_field(format!("Field {} must be a {}", key, expected), key)
}

fn non_negative_int(dict: &BencodeDict, key: &str) -> Result<u64> {
    let value = required(dict, key)?
        .as_int()
        .ok_or_else(|| wrong_type(key, "integer"))?;
    u64::try_from(value)
        .map_err(|_| TorrentError::format_error_with_field(format!("Field {} must not be negative", key), key))
}
