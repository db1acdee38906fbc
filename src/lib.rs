//! mybittorrent
//!
//! A minimal BitTorrent client: bencode codec, torrent metadata, HTTP tracker
//! announce and a peer wire engine that downloads single verified pieces.

pub mod bencode;
pub mod cli;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{BencodeDict, BencodeValue};
pub use cli::{CliArgs, Command, Config};
pub use peer::{parse_compact_peers, ConnectionOptions, Peer, PeerAddress, PeerConnection, PeerState};
pub use protocol::{Handshake, Message, MessageId};
pub use storage::{FileSink, MemorySink, Piece, PieceSink};
pub use torrent::{TorrentMetadata, TorrentParser, TorrentSummary};
pub use tracker::{AnnounceResponse, TrackerClient};
