//! Peer management module
//!
//! Peer addresses, connection state and the peer wire engine.

pub mod address;
pub mod connection;
pub mod state;

// Re-export main types
pub use address::{parse_compact_peers, PeerAddress, COMPACT_PEER_LEN};
pub use connection::{ConnectionOptions, PeerConnection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use state::{Peer, PeerState};
