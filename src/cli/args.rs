//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::peer::PeerAddress;

/// CLI arguments for the BitTorrent client
#[derive(Debug, Parser)]
#[command(name = "mybittorrent")]
#[command(about = "Inspect torrents, query trackers and download single pieces", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no logs except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Port reported to the tracker
    #[arg(long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// Peer connect timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 5)]
    pub connect_timeout: u64,

    /// Timeout for each peer message (and tracker request) in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 30)]
    pub read_timeout: u64,

    /// Accept peers whose handshake names a different info hash
    #[arg(long, global = true)]
    pub no_verify_info_hash: bool,
}

/// Subcommands
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(value_name = "BENCODED")]
        value: String,
    },

    /// Print the metadata of a .torrent file
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,

        /// Print as a JSON object
        #[arg(long)]
        json: bool,
    },

    /// Announce to the tracker and list peers
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Handshake with a peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,

        #[arg(value_name = "IP:PORT")]
        peer: PeerAddress,
    },

    /// Download and verify one piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Where to write the piece
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,

        #[arg(value_name = "PIECE_INDEX")]
        piece_index: u32,

        /// Peer to download from instead of the tracker's first peer
        #[arg(long, value_name = "IP:PORT")]
        peer: Option<PeerAddress>,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
