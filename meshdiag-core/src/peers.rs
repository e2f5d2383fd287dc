#![forbid(unsafe_code)]

//! Direct peer discovery from route labels alone.

use std::collections::HashMap;

use crate::algebra::is_one_hop;
use crate::table::Route;
use crate::target::Target;

/// Nodes one hop away from any table row matching `target`.
///
/// Adjacency is tested in both directions since either label may be the
/// more compressed one. Results are keyed by IP; when the same IP turns up
/// again through another path, the numerically smaller path wins. Output
/// order carries no meaning.
#[must_use]
pub fn direct_peers(table: &[Route], target: &Target) -> Vec<Route> {
    let mut output: Vec<Route> = Vec::new();
    let mut by_ip: HashMap<&str, usize> = HashMap::new();

    for node in table.iter().filter(|r| r.matches(target)) {
        for candidate in table {
            let a = node.path.value();
            let b = candidate.path.value();
            if !(is_one_hop(a, b) || is_one_hop(b, a)) {
                continue;
            }
            match by_ip.get(candidate.ip.as_str()) {
                Some(&i) => {
                    if output[i].path > candidate.path {
                        output[i] = candidate.clone();
                    }
                }
                None => {
                    by_ip.insert(candidate.ip.as_str(), output.len());
                    output.push(candidate.clone());
                }
            }
        }
    }
    output
}
