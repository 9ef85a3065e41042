use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value spanning the whole input.
///
/// # Errors
///
/// Fails on truncated or malformed input, on nesting deeper than 64
/// levels, and on trailing bytes after the value.
///
/// # Examples
///
/// ```
/// use driftnet::bencode::decode;
///
/// let list = decode(b"li1e4:spami4ee").unwrap();
/// assert_eq!(list.as_list().unwrap().len(), 3);
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let (value, rest) = decode_value(data, 0)?;

    if !rest.is_empty() {
        return Err(BencodeError::TrailingData);
    }

    Ok(value)
}

/// Decodes one bencode value from the front of the input and returns it
/// together with the number of bytes it occupied.
///
/// Unlike [`decode`], trailing bytes are not an error. The metainfo
/// parser uses this to measure the exact extent of the encoded `info`
/// dictionary inside a `.torrent` file.
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize), BencodeError> {
    let (value, rest) = decode_value(data, 0)?;
    Ok((value, data.len() - rest.len()))
}

fn decode_value(data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::NestingTooDeep);
    }

    match data.first() {
        Some(b'i') => decode_integer(&data[1..]),
        Some(b'l') => decode_list(&data[1..], depth),
        Some(b'd') => decode_dict(&data[1..], depth),
        Some(b'0'..=b'9') => decode_bytes(data),
        Some(&c) => Err(BencodeError::UnexpectedChar(c as char)),
        None => Err(BencodeError::UnexpectedEof),
    }
}

fn decode_integer(data: &[u8]) -> Result<(Value, &[u8]), BencodeError> {
    let end = data
        .iter()
        .position(|&b| b == b'e')
        .ok_or(BencodeError::UnexpectedEof)?;

    let digits = std::str::from_utf8(&data[..end])
        .map_err(|_| BencodeError::InvalidInteger("invalid utf8".into()))?;

    if digits.is_empty() {
        return Err(BencodeError::InvalidInteger("empty".into()));
    }

    if digits.starts_with("-0") || (digits.starts_with('0') && digits.len() > 1) {
        return Err(BencodeError::InvalidInteger("leading zeros".into()));
    }

    let value: i64 = digits
        .parse()
        .map_err(|_| BencodeError::InvalidInteger(digits.into()))?;

    Ok((Value::Integer(value), &data[end + 1..]))
}

fn decode_bytes(data: &[u8]) -> Result<(Value, &[u8]), BencodeError> {
    let colon = data
        .iter()
        .position(|&b| b == b':')
        .ok_or(BencodeError::UnexpectedEof)?;

    let len: usize = std::str::from_utf8(&data[..colon])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::InvalidStringLength)?;

    let rest = &data[colon + 1..];
    if rest.len() < len {
        return Err(BencodeError::UnexpectedEof);
    }

    let bytes = Bytes::copy_from_slice(&rest[..len]);
    Ok((Value::Bytes(bytes), &rest[len..]))
}

fn decode_list(mut data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    let mut list = Vec::new();

    loop {
        match data.first() {
            Some(b'e') => return Ok((Value::List(list), &data[1..])),
            Some(_) => {
                let (item, rest) = decode_value(data, depth + 1)?;
                list.push(item);
                data = rest;
            }
            None => return Err(BencodeError::UnexpectedEof),
        }
    }
}

fn decode_dict(mut data: &[u8], depth: usize) -> Result<(Value, &[u8]), BencodeError> {
    let mut dict = BTreeMap::new();

    loop {
        match data.first() {
            Some(b'e') => return Ok((Value::Dict(dict), &data[1..])),
            Some(b'0'..=b'9') => {
                let (key, rest) = decode_bytes(data)?;
                let key = match key {
                    Value::Bytes(b) => b,
                    _ => return Err(BencodeError::InvalidDictKey),
                };

                let (value, rest) = decode_value(rest, depth + 1)?;
                dict.insert(key, value);
                data = rest;
            }
            Some(_) => return Err(BencodeError::InvalidDictKey),
            None => return Err(BencodeError::UnexpectedEof),
        }
    }
}
