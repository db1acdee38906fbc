//! Error types for the BitTorrent client
//!
//! Every fallible step of the protocol stack reports one of these kinds so the
//! caller can tell a malformed file from a misbehaving peer or a corrupt piece.

use std::fmt;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencode input
    SyntaxError {
        message: String,
        position: Option<usize>,
    },

    /// Well-formed bencode with missing or mistyped fields
    FormatError {
        message: String,
        field: Option<String>,
    },

    /// Connection refused, DNS failure, HTTP failure, premature close
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// The tracker answered with a `failure reason`
    TrackerFailure {
        reason: String,
    },

    /// Unexpected message id or malformed message on the wire
    ProtocolError {
        message: String,
        peer: Option<String>,
    },

    /// The peer handshake was short, malformed, or for another torrent
    HandshakeError {
        message: String,
        peer: Option<String>,
    },

    /// The connection closed in the middle of a frame
    TruncatedMessage {
        expected: usize,
        received: usize,
    },

    /// A read or connect did not finish in time
    Timeout {
        operation: String,
        address: Option<String>,
    },

    /// An assembled piece does not match its expected hash
    IntegrityError {
        piece_index: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// File I/O errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Validation errors
    ValidationError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new SyntaxError at a byte offset
    pub fn syntax_error_at(message: impl Into<String>, position: usize) -> Self {
        TorrentError::SyntaxError {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Create a new FormatError
    pub fn format_error(message: impl Into<String>) -> Self {
        TorrentError::FormatError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new FormatError naming the offending field
    pub fn format_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::FormatError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new TrackerFailure
    pub fn tracker_failure(reason: impl Into<String>) -> Self {
        TorrentError::TrackerFailure {
            reason: reason.into(),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new ProtocolError with peer address
    pub fn protocol_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Create a new HandshakeError
    pub fn handshake_error(message: impl Into<String>) -> Self {
        TorrentError::HandshakeError {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new TruncatedMessage error
    pub fn truncated(expected: usize, received: usize) -> Self {
        TorrentError::TruncatedMessage { expected, received }
    }

    /// Create a new Timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        TorrentError::Timeout {
            operation: operation.into(),
            address: None,
        }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(piece_index: u32, expected: [u8; 20], actual: [u8; 20]) -> Self {
        TorrentError::IntegrityError {
            piece_index,
            expected,
            actual,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Attach the remote peer to errors raised on a connection
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        match &mut self {
            TorrentError::ProtocolError { peer, .. } | TorrentError::HandshakeError { peer, .. } => {
                peer.get_or_insert(addr);
            }
            TorrentError::NetworkError { address, .. } | TorrentError::Timeout { address, .. } => {
                address.get_or_insert(addr);
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::SyntaxError { message, position } => {
                if let Some(pos) = position {
                    write!(f, "Syntax error: {} (at byte {})", message, pos)
                } else {
                    write!(f, "Syntax error: {}", message)
                }
            }
            TorrentError::FormatError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Format error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Format error: {}", message)
                }
            }
            TorrentError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            TorrentError::TrackerFailure { reason } => {
                write!(f, "Tracker failure: {}", reason)
            }
            TorrentError::ProtocolError { message, peer } => {
                if let Some(p) = peer {
                    write!(f, "Protocol error: {} (peer: {})", message, p)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            TorrentError::HandshakeError { message, peer } => {
                if let Some(p) = peer {
                    write!(f, "Handshake error: {} (peer: {})", message, p)
                } else {
                    write!(f, "Handshake error: {}", message)
                }
            }
            TorrentError::TruncatedMessage { expected, received } => {
                write!(f, "Truncated message: expected {} bytes, received {}", expected, received)
            }
            TorrentError::Timeout { operation, address } => {
                if let Some(a) = address {
                    write!(f, "Timed out: {} (address: {})", operation, a)
                } else {
                    write!(f, "Timed out: {}", operation)
                }
            }
            TorrentError::IntegrityError { piece_index, expected, actual } => {
                write!(
                    f,
                    "Integrity error: piece {} hash mismatch (expected {}, got {})",
                    piece_index,
                    hex::encode(expected),
                    hex::encode(actual)
                )
            }
            TorrentError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            TorrentError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::StorageError {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::validation_error_with_field(format!("Failed to parse address: {}", err), "peer")
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        let address = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
        let message = if err.is_timeout() {
            "Tracker request timed out"
        } else {
            "Tracker request failed"
        };
        TorrentError::network_error_full(message, address, err.to_string())
    }
}
