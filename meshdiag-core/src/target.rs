#![forbid(unsafe_code)]

//! Address formatting and command target classification.

use std::fmt;
use std::net::Ipv6Addr;

use crate::label::{Label, LABEL_TEXT_LEN};
use crate::{MeshError, MeshResult};

/// Length of the fully padded IPv6 text form (8 groups of 4 hex digits).
pub const PADDED_IPV6_LEN: usize = 39;

/// Format an IPv6 address as eight colon-separated, zero-padded groups.
#[must_use]
pub fn pad_ipv6(ip: &Ipv6Addr) -> String {
    ip.segments()
        .iter()
        .map(|s| format!("{s:04x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// A node named on the command line, either by address or by route label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Padded IPv6 literal.
    Ip(String),
    /// Route label; the string is the canonical dotted form.
    Path(Label),
}

impl Target {
    /// Classify user input.
    ///
    /// More than one colon means an IPv6 literal, exactly three dots means a
    /// route label. Anything else, or input that fails the length check after
    /// padding, is rejected before any request is made.
    pub fn parse(input: &str) -> MeshResult<Self> {
        let input = input.trim();
        if input.matches(':').count() > 1 {
            let ip: Ipv6Addr = input
                .parse()
                .map_err(|_| MeshError::InvalidTarget(format!("invalid IPv6 address `{input}`")))?;
            let padded = pad_ipv6(&ip);
            if padded.len() != PADDED_IPV6_LEN {
                return Err(MeshError::InvalidTarget(format!("invalid IPv6 address `{input}`")));
            }
            Ok(Target::Ip(padded))
        } else if input.matches('.').count() == 3 {
            if input.len() != LABEL_TEXT_LEN {
                return Err(MeshError::InvalidTarget(format!("invalid path `{input}`")));
            }
            let label = input
                .parse::<Label>()
                .map_err(|_| MeshError::InvalidTarget(format!("invalid path `{input}`")))?;
            Ok(Target::Path(label))
        } else {
            Err(MeshError::InvalidTarget(format!(
                "`{input}` is neither an IPv6 address nor a path"
            )))
        }
    }

    /// Text sent to the daemon when probing this target.
    #[must_use]
    pub fn wire_form(&self) -> String {
        match self {
            Target::Ip(ip) => ip.clone(),
            Target::Path(label) => label.encode(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_form())
    }
}
