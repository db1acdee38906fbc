//! Tracker announce responses
//!
//! Decodes the bencoded body a tracker sends back for an announce.

use serde::Serialize;
use tracing::{debug, warn};

use crate::bencode::{self, BencodeDict};
use crate::error::{Result, TorrentError};
use crate::peer::address::{parse_compact_peers, PeerAddress};

/// Decoded announce response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait between announces
    pub interval: Option<u64>,
    pub min_interval: Option<u64>,
    /// Seeders
    pub complete: Option<u64>,
    /// Leechers
    pub incomplete: Option<u64>,
    pub warning_message: Option<String>,
    /// Peers in the order the tracker listed them
    pub peers: Vec<PeerAddress>,
}

impl AnnounceResponse {
    /// Parse a raw response body
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let value = bencode::decode(body).map_err(|e| {
            TorrentError::format_error(format!("Tracker response is not valid bencode: {}", e))
        })?;
        let dict = value.as_dict().ok_or_else(|| {
            TorrentError::format_error(format!("Tracker response must be a dictionary, found {}", value.kind()))
        })?;

        if let Some(reason) = dict.get(b"failure reason".as_slice()) {
            let reason = reason
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| format!("{:?}", reason));
            warn!("Tracker refused announce: {}", reason);
            return Err(TorrentError::tracker_failure(reason));
        }

        let warning_message = dict
            .get(b"warning message".as_slice())
            .and_then(|v| v.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned());
        if let Some(warning) = &warning_message {
            warn!("Tracker warning: {}", warning);
        }

        let peers_bytes = dict
            .get(b"peers".as_slice())
            .ok_or_else(|| TorrentError::format_error_with_field("Missing peers field", "peers"))?
            .as_bytes()
            .ok_or_else(|| TorrentError::format_error_with_field("Field peers must be a compact byte string", "peers"))?;
        let peers = parse_compact_peers(peers_bytes)?;

        let response = Self {
            interval: optional_count(dict, "interval"),
            min_interval: optional_count(dict, "min interval"),
            complete: optional_count(dict, "complete"),
            incomplete: optional_count(dict, "incomplete"),
            warning_message,
            peers,
        };

        debug!(
            "Tracker returned {} peers (interval {:?}, seeders {:?}, leechers {:?})",
            response.peers.len(),
            response.interval,
            response.complete,
            response.incomplete
        );
        Ok(response)
    }
}

/// Non-negative integer field; anything else is ignored
fn optional_count(dict: &BencodeDict, key: &str) -> Option<u64> {
    dict.get(key.as_bytes())
        .and_then(|v| v.as_int())
        .and_then(|v| u64::try_from(v).ok())
}
