//! Peer state module
//!
//! Defines the connection state machine and per-peer information.

use std::fmt;

use crate::peer::address::PeerAddress;

/// Where a connection is in the download sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// TCP connection established, nothing sent yet
    Connected,
    /// Handshake sent, waiting for the reply
    Handshaking,
    /// Handshake done, waiting for the peer's bitfield
    AwaitingBitfield,
    /// Bitfield received, interested not yet sent
    Interested,
    /// Interested sent, waiting for unchoke
    AwaitingUnchoke,
    /// Unchoked, exchanging block requests
    Requesting,
    /// A piece was assembled and verified
    Complete,
    /// A protocol violation or I/O error ended the connection
    Failed,
}

impl PeerState {
    /// The state a successful step leads to
    pub fn next(self) -> Option<PeerState> {
        match self {
            PeerState::Connected => Some(PeerState::Handshaking),
            PeerState::Handshaking => Some(PeerState::AwaitingBitfield),
            PeerState::AwaitingBitfield => Some(PeerState::Interested),
            PeerState::Interested => Some(PeerState::AwaitingUnchoke),
            PeerState::AwaitingUnchoke => Some(PeerState::Requesting),
            PeerState::Requesting => Some(PeerState::Complete),
            // Another piece may be requested on the same connection.
            PeerState::Complete => Some(PeerState::Requesting),
            PeerState::Failed => None,
        }
    }

    /// Check if block requests may be sent
    pub fn can_request(self) -> bool {
        matches!(self, PeerState::Requesting | PeerState::Complete)
    }

    pub fn is_failed(self) -> bool {
        self == PeerState::Failed
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::Connected => "connected",
            PeerState::Handshaking => "handshaking",
            PeerState::AwaitingBitfield => "awaiting bitfield",
            PeerState::Interested => "interested",
            PeerState::AwaitingUnchoke => "awaiting unchoke",
            PeerState::Requesting => "requesting",
            PeerState::Complete => "complete",
            PeerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What we know about the remote side of a connection
#[derive(Debug, Clone)]
pub struct Peer {
    /// Peer address
    pub addr: PeerAddress,
    /// Peer identifier from the handshake
    pub peer_id: Option<[u8; 20]>,
    /// Pieces they advertise (bitfield)
    pub bitfield: Option<Vec<u8>>,
    /// Pieces downloaded from this peer
    pub pieces_downloaded: u32,
}

impl Peer {
    /// Create a new peer
    pub fn new(addr: PeerAddress) -> Self {
        Self {
            addr,
            peer_id: None,
            bitfield: None,
            pieces_downloaded: 0,
        }
    }

    /// Check if peer advertises a specific piece
    pub fn has_piece(&self, piece_index: usize) -> bool {
        if let Some(ref bitfield) = self.bitfield {
            let byte_index = piece_index / 8;
            let bit_index = 7 - (piece_index % 8);

            if byte_index < bitfield.len() {
                return (bitfield[byte_index] >> bit_index) & 1 == 1;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Peer {
        Peer::new("127.0.0.1:6881".parse().unwrap())
    }

    #[test]
    fn test_state_sequence() {
        let mut state = PeerState::Connected;
        let mut seen = vec![state];
        while state != PeerState::Requesting {
            state = state.next().unwrap();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                PeerState::Connected,
                PeerState::Handshaking,
                PeerState::AwaitingBitfield,
                PeerState::Interested,
                PeerState::AwaitingUnchoke,
                PeerState::Requesting,
            ]
        );
        assert_eq!(PeerState::Requesting.next(), Some(PeerState::Complete));
        assert_eq!(PeerState::Complete.next(), Some(PeerState::Requesting));
        assert_eq!(PeerState::Failed.next(), None);
    }

    #[test]
    fn test_can_request() {
        assert!(!PeerState::AwaitingUnchoke.can_request());
        assert!(PeerState::Requesting.can_request());
        assert!(PeerState::Complete.can_request());
        assert!(!PeerState::Failed.can_request());
    }

    #[test]
    fn test_has_piece() {
        let mut peer = peer();
        assert!(!peer.has_piece(0));

        peer.bitfield = Some(vec![0b11000000]); // bits 0 and 1 are set
        assert!(peer.has_piece(0));
        assert!(peer.has_piece(1));
        assert!(!peer.has_piece(2));
        assert!(!peer.has_piece(8));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PeerState::AwaitingUnchoke.to_string(), "awaiting unchoke");
    }
}
