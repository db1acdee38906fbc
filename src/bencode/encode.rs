//! Bencode encoder
//!
//! Output is canonical: dictionary keys are written in ascending byte order,
//! which the `BTreeMap` backing [`BencodeDict`] already guarantees. The info
//! hash depends on this.
//!
//! [`BencodeDict`]: crate::bencode::BencodeDict

use bytes::{BufMut, BytesMut};

use crate::bencode::value::BencodeValue;

/// Encode a value to its canonical byte form
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

/// Append the canonical encoding of `value` to `buf`
pub fn encode_into(value: &BencodeValue, buf: &mut BytesMut) {
    match value {
        BencodeValue::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeValue::ByteString(bytes) => put_byte_string(bytes, buf),
        BencodeValue::List(list) => {
            buf.put_u8(b'l');
            for item in list {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeValue::Dictionary(dict) => {
            buf.put_u8(b'd');
            for (key, item) in dict {
                put_byte_string(key, buf);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_byte_string(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}
