#![forbid(unsafe_code)]

//! Routing table aggregation.
//!
//! The daemon hands out its table in pages. [`fetch_table`] walks the pages
//! in order and normalises each row into a [`Route`]. Rows whose path does
//! not decode are dropped, since the daemon may emit transient garbage while
//! the topology changes.

use std::cmp::Ordering;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::admin::{AdminConnection, RawRoute};
use crate::label::Label;
use crate::target::Target;
use crate::{MeshError, MeshResult};

/// Divisor turning the daemon's raw link metric into a link-quality score.
///
/// Empirically derived from the daemon's internal quality units; it has no
/// analytical derivation and must be revisited if the daemon changes how it
/// reports link state.
pub const LINK_QUALITY_DIVISOR: f64 = 5_366_870.0;

/// Error value the daemon uses to say "no error".
const NO_ERROR: &str = "none";

/// One routing table entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Padded IPv6 literal, empty when unknown.
    pub ip: String,
    /// Path as printed by the daemon.
    pub raw_path: String,
    /// Decoded label used for path algebra.
    #[serde(skip)]
    pub path: Label,
    pub raw_link: i64,
    /// Normalised link quality.
    pub link: f64,
    pub version: i64,
}

impl Route {
    /// Normalise a raw row; fails with `MalformedLabel` on a bad path.
    pub fn from_raw(raw: RawRoute) -> MeshResult<Self> {
        let path = Label::decode(&raw.path)?;
        Ok(Self {
            link: raw.link as f64 / LINK_QUALITY_DIVISOR,
            ip: raw.ip,
            raw_path: raw.path,
            path,
            raw_link: raw.link,
            version: raw.version,
        })
    }

    /// Whether this row describes `target`.
    #[must_use]
    pub fn matches(&self, target: &Target) -> bool {
        match target {
            Target::Ip(ip) => self.ip == *ip,
            Target::Path(label) => self.raw_path == label.encode(),
        }
    }
}

/// Download the whole routing table, page by page.
///
/// Rows are kept in the order received; no deduplication is done here.
pub async fn fetch_table<C>(conn: &mut C) -> MeshResult<Vec<Route>>
where
    C: AdminConnection + ?Sized,
{
    let mut table = Vec::new();
    let mut page: u32 = 0;
    loop {
        let response = conn.dump_table_page(page).await?;
        if let Some(err) = response.error.as_deref() {
            if err != NO_ERROR {
                return Err(MeshError::DaemonReported(err.to_string()));
            }
        }

        let received = response.rows.len();
        for raw in response.rows {
            match Route::from_raw(raw) {
                Ok(route) => table.push(route),
                Err(e) => debug!("dropping routing table row: {e}"),
            }
        }
        debug!(page, received, total = table.len(), "routing table page fetched");

        match response.more {
            Some(more) if more != 0 => page += 1,
            _ => break,
        }
    }
    Ok(table)
}

/// [`fetch_table`], abandoned with [`MeshError::Cancelled`] once `cancel` trips.
pub async fn fetch_table_until<C>(conn: &mut C, cancel: &CancellationToken) -> MeshResult<Vec<Route>>
where
    C: AdminConnection + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MeshError::Cancelled),
        table = fetch_table(conn) => table,
    }
}

/// Rows whose IP or path equals `target`.
#[must_use]
pub fn routes_to<'a>(table: &'a [Route], target: &Target) -> Vec<&'a Route> {
    table.iter().filter(|r| r.matches(target)).collect()
}

/// Sort key used by listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Keep daemon order.
    #[default]
    None,
    Ip,
    Path,
    /// Best link first.
    Link,
}

/// Select and order rows for display. Rows with link quality below 1 are
/// hidden unless `include_unlinked` is set. The input is left untouched.
#[must_use]
pub fn listing(table: &[Route], include_unlinked: bool, sort: SortKey) -> Vec<&Route> {
    let mut rows: Vec<&Route> = table
        .iter()
        .filter(|r| include_unlinked || r.link >= 1.0)
        .collect();
    match sort {
        SortKey::None => {}
        SortKey::Ip => rows.sort_by(|a, b| a.ip.cmp(&b.ip).then(a.path.cmp(&b.path))),
        SortKey::Path => rows.sort_by_key(|r| r.path),
        SortKey::Link => rows.sort_by(|a, b| b.link.partial_cmp(&a.link).unwrap_or(Ordering::Equal)),
    }
    rows
}
