//! JSON rendering of bencode values
//!
//! Byte strings that are valid UTF-8 become JSON strings. Anything else is
//! rendered as `"hex:"` followed by lowercase hex digits, so binary fields
//! such as `pieces` stay printable. Text that itself starts with `hex:` is
//! hex-tagged too, which keeps the mapping one-to-one: distinct dictionary
//! keys never render to the same JSON key. Dictionary keys follow the same
//! rule.

use serde_json::{Map, Value};

use crate::bencode::value::BencodeValue;

/// Prefix marking a hex-encoded byte string
pub const HEX_PREFIX: &str = "hex:";

/// Convert a bencode value into a JSON value
pub fn to_json(value: &BencodeValue) -> Value {
    match value {
        BencodeValue::Integer(i) => Value::from(*i),
        BencodeValue::ByteString(bytes) => Value::String(render_bytes(bytes)),
        BencodeValue::List(list) => Value::Array(list.iter().map(to_json).collect()),
        BencodeValue::Dictionary(dict) => {
            let mut map = Map::new();
            for (key, item) in dict {
                map.insert(render_bytes(key), to_json(item));
            }
            Value::Object(map)
        }
    }
}

/// Render a byte string as text using the policy above
pub fn render_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.starts_with(HEX_PREFIX) => text.to_string(),
        _ => format!("{}{}", HEX_PREFIX, hex::encode(bytes)),
    }
}
