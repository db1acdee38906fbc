//! Output rendering
//!
//! Text printed on stdout by each command. Logs never go here.

use std::path::Path;

use crate::bencode::{self, BencodeValue};
use crate::peer::PeerAddress;
use crate::torrent::TorrentMetadata;

/// Decoded bencode as compact JSON
pub fn render_decoded(value: &BencodeValue) -> String {
    bencode::to_json(value).to_string()
}

/// Metadata in the line format of the `info` command
pub fn render_info(metadata: &TorrentMetadata) -> String {
    let mut out = format!(
        "Tracker URL: {}\nLength: {}\nInfo Hash: {}\nPiece Length: {}\nPiece Hashes:\n",
        metadata.announce,
        metadata.length,
        metadata.info_hash_hex(),
        metadata.piece_length
    );
    for hash in metadata.piece_hashes_hex() {
        out.push_str(&hash);
        out.push('\n');
    }
    out
}

/// Metadata as a pretty JSON object
pub fn render_info_json(metadata: &TorrentMetadata) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&metadata.summary())
}

/// One `ip:port` per line
pub fn render_peers(peers: &[PeerAddress]) -> String {
    peers.iter().map(|peer| format!("{}\n", peer)).collect()
}

pub fn render_peer_id(peer_id: &[u8; 20]) -> String {
    format!("Peer ID: {}", hex::encode(peer_id))
}

pub fn render_piece_saved(piece_index: u32, path: &Path) -> String {
    format!("Piece {} downloaded to {}.", piece_index, path.display())
}
