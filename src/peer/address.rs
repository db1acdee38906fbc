//! Peer network addresses
//!
//! Trackers return peers in the compact form: 4 bytes of IPv4 address
//! followed by a 2-byte big-endian port.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::{Result, TorrentError};

/// Size of one compact peer record
pub const COMPACT_PEER_LEN: usize = 6;

/// IPv4 address and port of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(SocketAddrV4);

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    /// Decode one 6-byte compact record
    pub fn from_compact(record: [u8; COMPACT_PEER_LEN]) -> Self {
        let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
        let port = u16::from_be_bytes([record[4], record[5]]);
        Self::new(ip, port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }
}

/// Decode a compact peer list, preserving order
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerAddress>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::format_error_with_field(
            format!("Compact peer list length must be a multiple of 6, got {}", data.len()),
            "peers",
        ));
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let mut record = [0u8; COMPACT_PEER_LEN];
            record.copy_from_slice(chunk);
            PeerAddress::from_compact(record)
        })
        .collect())
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddrV4 = s.trim().parse()?;
        Ok(Self(addr))
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}
