//! Tracker module
//!
//! HTTP announce and response decoding.

pub mod http;
pub mod response;

pub use http::{build_announce_url, TrackerClient, DEFAULT_PORT, DEFAULT_TRACKER_TIMEOUT};
pub use response::AnnounceResponse;
