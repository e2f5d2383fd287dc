#![forbid(unsafe_code)]

//! Switch label codec.
//!
//! The daemon prints a route label as four groups of four hex digits joined
//! by dots (`0000.0000.0000.0013`). Internally a label is a 64-bit source
//! route: the most significant set bits describe the hops closest to the
//! local node and the low bits hold the final hop's encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::{MeshError, MeshResult};

/// Number of raw bytes a label decodes to.
pub const LABEL_BYTES: usize = 8;

/// Length of the canonical dotted form (16 hex digits + 3 dots).
pub const LABEL_TEXT_LEN: usize = 19;

/// A decoded 64-bit route label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Label(pub u64);

impl Label {
    /// Label of the local node itself.
    pub const SELF: Label = Label(1);

    /// Decode the dotted-hex text form.
    ///
    /// Dots are stripped wherever they appear; the remaining digits must be
    /// valid hex and decode to exactly eight big-endian bytes.
    pub fn decode(text: &str) -> MeshResult<Self> {
        let digits: String = text.chars().filter(|c| *c != '.').collect();
        let bytes = hex::decode(&digits).map_err(|_| MeshError::MalformedLabel(text.to_string()))?;
        let raw: [u8; LABEL_BYTES] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| MeshError::MalformedLabel(text.to_string()))?;
        Ok(Label(u64::from_be_bytes(raw)))
    }

    /// Canonical 19-character dotted form, zero padded.
    pub fn encode(self) -> String {
        let v = self.0;
        format!(
            "{:04x}.{:04x}.{:04x}.{:04x}",
            v >> 48,
            (v >> 32) & 0xffff,
            (v >> 16) & 0xffff,
            v & 0xffff
        )
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Label {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::decode(s)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_canonical_form() {
        let l = Label::decode("0000.0000.0000.0013").unwrap();
        assert_eq!(l, Label(0x13));
        let l = Label::decode("0123.4567.89ab.cdef").unwrap();
        assert_eq!(l.value(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn encode_is_zero_padded() {
        assert_eq!(Label(1).encode(), "0000.0000.0000.0001");
        assert_eq!(Label(u64::MAX).encode(), "ffff.ffff.ffff.ffff");
        assert_eq!(Label(1).encode().len(), LABEL_TEXT_LEN);
    }

    #[test]
    fn text_round_trip_keeps_leading_zeros() {
        for text in ["0000.0000.0000.0001", "000f.0000.a000.0b0c", "8000.0000.0000.0000"] {
            assert_eq!(Label::decode(text).unwrap().encode(), text);
        }
        for v in [1u64, 0x13, 0x0000_0001_0000_0000, u64::MAX >> 1] {
            assert_eq!(Label::decode(&Label(v).encode()).unwrap(), Label(v));
        }
    }

    #[test]
    fn parses_through_from_str() {
        let l: Label = "0000.0000.0000.0001".parse().unwrap();
        assert_eq!(l, Label::SELF);
        assert!("0000.0000.0000.00zz".parse::<Label>().is_err());
    }

    #[test]
    fn dot_placement_is_not_significant() {
        let l = Label::decode("00.00.00.00.00.00.00.13").unwrap();
        assert_eq!(l, Label(0x13));
    }

    #[test]
    fn rejects_bad_hex_and_wrong_length() {
        assert!(matches!(
            Label::decode("00.00.00.00.00.00.00.0g"),
            Err(MeshError::MalformedLabel(_))
        ));
        assert!(Label::decode("0000.0000.0013").is_err());
        assert!(Label::decode("0000.0000.0000.0000.0001").is_err());
        assert!(Label::decode("").is_err());
        assert!(Label::decode("0000.0000.0000.001").is_err());
    }
}
