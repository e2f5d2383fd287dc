#![forbid(unsafe_code)]

//! Bencode codec used by the daemon's admin protocol.
//!
//! Values are integers (`i42e`), byte strings (`4:spam`), lists (`l...e`)
//! and dictionaries (`d...e`) whose keys are byte strings emitted in sorted
//! order. Dictionaries are held in a `BTreeMap` so encoding is canonical.

use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::take,
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, terminated},
    IResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    /// Build a dictionary from string keys.
    pub fn dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Vec<u8>>,
    {
        Value::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn str(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(d) => d.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        if let Value::Dict(d) = self {
            d.insert(key.as_bytes().to_vec(), value);
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// String field of a dictionary.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer field of a dictionary.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Int(i) => {
                out.push(b'i');
                out.extend_from_slice(i.to_string().as_bytes());
                out.push(b'e');
            }
            Value::Bytes(b) => encode_bytes(b, out),
            Value::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Value::Dict(entries) => {
                out.push(b'd');
                for (k, v) in entries {
                    encode_bytes(k, out);
                    v.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }
}

fn encode_bytes(b: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(b);
}

fn ascii_number<T: std::str::FromStr>(digits: &[u8]) -> Result<T, ()> {
    std::str::from_utf8(digits)
        .map_err(|_| ())?
        .parse::<T>()
        .map_err(|_| ())
}

fn parse_int(input: &[u8]) -> IResult<&[u8], i64> {
    delimited(
        char('i'),
        map_res(recognize(pair(opt(char('-')), digit1)), ascii_number::<i64>),
        char('e'),
    )(input)
}

fn parse_bytes(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = terminated(map_res(digit1, ascii_number::<usize>), char(':'))(input)?;
    take(len)(input)
}

fn parse_list(input: &[u8]) -> IResult<&[u8], Vec<Value>> {
    delimited(char('l'), many0(parse_value), char('e'))(input)
}

fn parse_dict(input: &[u8]) -> IResult<&[u8], BTreeMap<Vec<u8>, Value>> {
    map(
        delimited(char('d'), many0(pair(parse_bytes, parse_value)), char('e')),
        |entries: Vec<(&[u8], Value)>| entries.into_iter().map(|(k, v)| (k.to_vec(), v)).collect(),
    )(input)
}

/// Parse one value, returning the unconsumed remainder.
pub fn parse_value(input: &[u8]) -> IResult<&[u8], Value> {
    alt((
        map(parse_int, Value::Int),
        map(parse_bytes, |b: &[u8]| Value::Bytes(b.to_vec())),
        map(parse_list, Value::List),
        map(parse_dict, Value::Dict),
    ))(input)
}

/// Decode a complete datagram. Trailing bytes are an error.
pub fn decode(input: &[u8]) -> Option<Value> {
    match parse_value(input) {
        Ok((rest, v)) if rest.is_empty() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_sorted_dictionary() {
        let v = Value::dict([
            ("q", Value::str("auth")),
            ("args", Value::dict([("page", Value::Int(0))])),
            ("aq", Value::str("NodeStore_dumpTable")),
        ]);
        assert_eq!(
            v.encode(),
            b"d2:aq19:NodeStore_dumpTable4:argsd4:pagei0ee1:q4:authe".to_vec()
        );
    }

    #[test]
    fn decodes_nested_reply() {
        let raw = b"d4:morei1e12:routingTableld2:ip39:fc00:0000:0000:0000:0000:0000:0000:00014:linki-5e4:path19:0000.0000.0000.00137:versioni12eee4:txid4:abcde";
        let v = decode(raw).expect("decode");
        assert_eq!(v.int_field("more"), Some(1));
        assert_eq!(v.str_field("txid"), Some("abcd"));
        let rows = v.get("routingTable").and_then(Value::as_list).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_field("path"), Some("0000.0000.0000.0013"));
        assert_eq!(rows[0].int_field("link"), Some(-5));
        assert_eq!(rows[0].int_field("version"), Some(12));
    }

    #[test]
    fn decode_of_encode_is_identity() {
        let v = Value::dict([
            ("a", Value::List(vec![Value::Int(-1), Value::str(""), Value::List(vec![])])),
            ("b", Value::Bytes(vec![0, 255, b':'])),
        ]);
        assert_eq!(decode(&v.encode()), Some(v));
    }

    #[test]
    fn rejects_truncated_and_trailing_input() {
        assert_eq!(decode(b"d1:qi1e"), None);
        assert_eq!(decode(b"5:abc"), None);
        assert_eq!(decode(b"i1ei2e"), None);
        assert_eq!(decode(b"ie"), None);
    }
}
