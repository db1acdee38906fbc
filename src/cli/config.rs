//! CLI configuration module
//!
//! Runtime settings derived from the command line.

use std::time::Duration;

use crate::cli::args::CliArgs;
use crate::error::{Result, TorrentError};
use crate::peer::ConnectionOptions;
use crate::protocol::Handshake;

/// Configuration shared by every command
#[derive(Debug, Clone)]
pub struct Config {
    /// Our peer id for this process
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub tracker_timeout: Duration,
    /// Reject handshakes for other torrents
    pub verify_info_hash: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            peer_id: Handshake::generate_peer_id(),
            port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            read_timeout: Duration::from_secs(args.read_timeout),
            tracker_timeout: Duration::from_secs(args.read_timeout),
            verify_info_hash: !args.no_verify_info_hash,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }
        if self.connect_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("Connect timeout must be positive", "connect_timeout"));
        }
        if self.read_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("Read timeout must be positive", "read_timeout"));
        }
        Ok(())
    }

    /// Options for peer connections
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            verify_info_hash: self.verify_info_hash,
        }
    }
}
