//! HTTP tracker client
//!
//! Announces to an HTTP(S) tracker and returns the compact peer list.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use super::response::AnnounceResponse;
use crate::error::{Result, TorrentError};
use crate::torrent::TorrentMetadata;

/// Default HTTP timeout for announces
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default port we report to trackers
pub const DEFAULT_PORT: u16 = 6881;

/// Client for HTTP tracker announces
#[derive(Debug, Clone)]
pub struct TrackerClient {
    client: Client,
    peer_id: [u8; 20],
    port: u16,
}

impl TrackerClient {
    /// Create a client announcing as `peer_id`, listening on `port`
    pub fn new(peer_id: [u8; 20], port: u16, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            TorrentError::network_error(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client, peer_id, port })
    }

    /// Announce to the torrent's tracker
    pub async fn announce(&self, metadata: &TorrentMetadata) -> Result<AnnounceResponse> {
        let url = build_announce_url(&metadata.announce, &metadata.info_hash, &self.peer_id, self.port, metadata.length)?;
        info!("Announcing to tracker: {}", metadata.announce);
        debug!("Announce URL: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!("Tracker answered with HTTP {}", status);
            return Err(TorrentError::network_error_full(
                format!("Tracker answered with HTTP {}", status),
                metadata.announce.clone(),
                status.to_string(),
            ));
        }

        let body = response.bytes().await?;
        debug!("Tracker response: {} bytes", body.len());
        let announce = AnnounceResponse::from_bytes(&body)?;
        info!("Tracker returned {} peers", announce.peers.len());
        Ok(announce)
    }
}

/// Build the GET URL for an announce. Binary fields are percent-encoded as
/// opaque bytes.
pub fn build_announce_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<String> {
    let parsed = Url::parse(announce).map_err(|e| {
        TorrentError::validation_error_with_field(format!("Invalid announce URL '{}': {}", announce, e), "announce")
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TorrentError::validation_error_with_field(
            format!("Unsupported tracker scheme '{}'", parsed.scheme()),
            "announce",
        ));
    }

    let separator = if parsed.query().is_some() { '&' } else { '?' };
    Ok(format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        announce,
        separator,
        urlencoding::encode_binary(info_hash),
        urlencoding::encode_binary(peer_id),
        port,
        left
    ))
}
