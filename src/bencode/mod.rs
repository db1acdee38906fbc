//! Bencode module
//!
//! Encoding and decoding of the bencode serialization format used by
//! .torrent files and tracker responses.

pub mod value;
pub mod decode;
pub mod encode;
pub mod json;

// Re-export main types
pub use value::{BencodeDict, BencodeValue};
pub use decode::{decode, decode_prefix, MAX_DEPTH};
pub use encode::{encode, encode_into};
pub use json::{to_json, render_bytes};
