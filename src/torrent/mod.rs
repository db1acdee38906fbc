//! Torrent file handling module
//!
//! This module provides functionality for parsing .torrent files.

pub mod parser;
pub mod info;

pub use parser::{TorrentParser, MAX_PIECE_LENGTH};
pub use info::{TorrentMetadata, TorrentSummary, HASH_LEN};
