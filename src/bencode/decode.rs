//! Bencode decoder
//!
//! Single-pass recursive descent over a byte slice. Each parse function takes
//! the input and a cursor and leaves the cursor just past the value it read.

use tracing::trace;

use crate::bencode::value::{BencodeDict, BencodeValue};
use crate::error::{Result, TorrentError};

/// Maximum nesting of lists and dictionaries
pub const MAX_DEPTH: usize = 64;

/// Decode exactly one value; trailing bytes are an error
pub fn decode(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode_prefix(data)?;

    if consumed != data.len() {
        return Err(TorrentError::syntax_error_at(
            format!("{} trailing bytes after value", data.len() - consumed),
            consumed,
        ));
    }

    Ok(value)
}

/// Decode one value from the front of `data`, returning it with the number of
/// bytes it occupied
pub fn decode_prefix(data: &[u8]) -> Result<(BencodeValue, usize)> {
    trace!("Decoding bencode from {} bytes", data.len());
    let mut idx = 0;
    let value = parse_value(data, &mut idx, 0)?;
    Ok((value, idx))
}

fn parse_value(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::syntax_error_at("nesting too deep", *idx));
    }

    let byte = *data
        .get(*idx)
        .ok_or_else(|| TorrentError::syntax_error_at("unexpected end of input", *idx))?;

    match byte {
        b'i' => parse_integer(data, idx),
        b'l' => parse_list(data, idx, depth),
        b'd' => parse_dict(data, idx, depth),
        b'0'..=b'9' => parse_bytes(data, idx),
        _ => Err(TorrentError::syntax_error_at(
            format!("unexpected byte 0x{:02x}", byte),
            *idx,
        )),
    }
}

fn parse_integer(data: &[u8], idx: &mut usize) -> Result<BencodeValue> {
    let start = *idx + 1;
    let end = data[start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| p + start)
        .ok_or_else(|| TorrentError::syntax_error_at("unterminated integer", *idx))?;

    let token = &data[start..end];
    let digits = token.strip_prefix(b"-").unwrap_or(token);

    if digits.is_empty() {
        return Err(TorrentError::syntax_error_at("expected digit", start));
    }
    if let Some(pos) = digits.iter().position(|b| !b.is_ascii_digit()) {
        let offset = end - digits.len() + pos;
        return Err(TorrentError::syntax_error_at(
            format!("invalid character 0x{:02x} in integer", digits[pos]),
            offset,
        ));
    }
    if digits[0] == b'0' && (digits.len() > 1 || token.len() != digits.len()) {
        return Err(TorrentError::syntax_error_at("integer has leading zero", start));
    }

    // Only ASCII digits and '-' remain, so this is valid UTF-8.
    let text = std::str::from_utf8(token)
        .map_err(|_| TorrentError::syntax_error_at("invalid integer", start))?;
    let value: i64 = text
        .parse()
        .map_err(|_| TorrentError::syntax_error_at(format!("integer out of range: {}", text), start))?;

    *idx = end + 1;
    Ok(BencodeValue::Integer(value))
}

fn parse_bytes(data: &[u8], idx: &mut usize) -> Result<BencodeValue> {
    parse_raw_bytes(data, idx).map(BencodeValue::ByteString)
}

fn parse_raw_bytes(data: &[u8], idx: &mut usize) -> Result<Vec<u8>> {
    let start = *idx;
    let mut pos = start;
    while pos < data.len() && data[pos].is_ascii_digit() {
        pos += 1;
    }

    if pos == start {
        return Err(TorrentError::syntax_error_at("expected digit", start));
    }
    match data.get(pos) {
        Some(b':') => {}
        Some(&other) => {
            return Err(TorrentError::syntax_error_at(
                format!("expected ':' after string length, found 0x{:02x}", other),
                pos,
            ))
        }
        None => return Err(TorrentError::syntax_error_at("unterminated string length", start)),
    }

    let len: usize = std::str::from_utf8(&data[start..pos])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TorrentError::syntax_error_at("string length out of range", start))?;

    let body = pos + 1;
    let end = body
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            TorrentError::syntax_error_at(
                format!("string length {} exceeds remaining input of {} bytes", len, data.len() - body),
                start,
            )
        })?;

    *idx = end;
    Ok(data[body..end].to_vec())
}

fn parse_list(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *idx;
    *idx += 1;
    let mut list = Vec::new();

    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::syntax_error_at("unterminated list", start)),
            Some(b'e') => break,
            Some(_) => list.push(parse_value(data, idx, depth + 1)?),
        }
    }

    *idx += 1;
    Ok(BencodeValue::List(list))
}

fn parse_dict(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *idx;
    *idx += 1;
    let mut dict = BencodeDict::new();

    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::syntax_error_at("unterminated dictionary", start)),
            Some(b'e') => break,
            Some(b) if !b.is_ascii_digit() => {
                return Err(TorrentError::syntax_error_at("dictionary key must be a byte string", *idx));
            }
            Some(_) => {}
        }

        let key_pos = *idx;
        let key = parse_raw_bytes(data, idx)?;
        let value = parse_value(data, idx, depth + 1)?;

        if dict.insert(key, value).is_some() {
            return Err(TorrentError::syntax_error_at("duplicate dictionary key", key_pos));
        }
    }

    *idx += 1;
    Ok(BencodeValue::Dictionary(dict))
}
