use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;

#[test]
fn decode_integers() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
}

#[test]
fn decode_rejects_bad_integers() {
    assert!(decode(b"i-0e").is_err());
    assert!(decode(b"i03e").is_err());
    assert!(decode(b"ie").is_err());
    assert!(decode(b"i12").is_err());
    assert!(decode(b"iabce").is_err());
}

#[test]
fn decode_byte_strings() {
    assert_eq!(
        decode(b"4:spam").unwrap(),
        Value::Bytes(Bytes::from_static(b"spam"))
    );
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::new()));
}

#[test]
fn decode_rejects_truncated_string() {
    assert!(decode(b"5:spam").is_err());
    assert!(decode(b"5spam").is_err());
}

#[test]
fn decode_mixed_list() {
    let value = decode(b"li1e4:spami4ee").unwrap();
    let list = value.as_list().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0], Value::Integer(1));
    assert_eq!(list[1], Value::string("spam"));
    assert_eq!(list[2], Value::Integer(4));
}

#[test]
fn decode_dict() {
    let value = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
    let dict = value.as_dict().unwrap();
    assert_eq!(dict.len(), 2);
    assert_eq!(value.get(b"cow").and_then(Value::as_str), Some("moo"));
    assert_eq!(value.get(b"spam").and_then(Value::as_str), Some("eggs"));
}

#[test]
fn decode_rejects_non_string_dict_key() {
    assert!(matches!(
        decode(b"di1e4:spame"),
        Err(BencodeError::InvalidDictKey)
    ));
}

#[test]
fn decode_rejects_unknown_lead_byte() {
    assert!(matches!(
        decode(b"x42e"),
        Err(BencodeError::UnexpectedChar('x'))
    ));
}

#[test]
fn decode_rejects_trailing_data() {
    assert!(matches!(
        decode(b"i42eextra"),
        Err(BencodeError::TrailingData)
    ));
}

#[test]
fn decode_rejects_missing_terminator() {
    assert!(decode(b"l4:spam").is_err());
    assert!(decode(b"d4:spami1e").is_err());
}

#[test]
fn decode_prefix_reports_consumed_length() {
    let (value, consumed) = decode_prefix(b"d3:cow3:mooetrailing").unwrap();
    assert_eq!(consumed, 12);
    assert_eq!(value.get(b"cow").and_then(Value::as_str), Some("moo"));

    let (value, consumed) = decode_prefix(b"i42e").unwrap();
    assert_eq!(value, Value::Integer(42));
    assert_eq!(consumed, 4);
}

#[test]
fn encode_scalars() {
    assert_eq!(encode(&Value::Integer(-7)).unwrap(), b"i-7e");
    assert_eq!(encode(&Value::string("spam")).unwrap(), b"4:spam");
}

#[test]
fn encode_dict_sorted_by_key() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"zebra"), Value::Integer(1));
    dict.insert(Bytes::from_static(b"apple"), Value::Integer(2));
    let encoded = encode(&Value::Dict(dict)).unwrap();
    assert_eq!(encoded, b"d5:applei2e5:zebrai1ee");
}

#[test]
fn roundtrip_preserves_value() {
    let inputs: [&[u8]; 4] = [
        b"d8:announce15:http://test.com4:infod4:name4:test12:piece lengthi16384eee",
        b"li1e4:spami4ee",
        b"d4:listl4:spami42eee",
        b"0:",
    ];

    for input in inputs {
        let decoded = decode(input).unwrap();
        let encoded = encode(&decoded).unwrap();
        assert_eq!(encoded, input);
        assert_eq!(decode(&encoded).unwrap(), decoded);
    }
}

#[test]
fn nesting_limit_enforced() {
    let mut deep = Vec::new();
    deep.extend(std::iter::repeat(b'l').take(100));
    deep.extend(std::iter::repeat(b'e').take(100));
    assert!(matches!(
        decode(&deep),
        Err(BencodeError::NestingTooDeep)
    ));
}
