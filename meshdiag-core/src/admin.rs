#![forbid(unsafe_code)]

//! Seam towards the daemon's admin interface.
//!
//! The core never opens sockets. Every request goes through an
//! [`AdminConnection`], issued one at a time; implementations are expected to
//! enforce their own per-request timeout and to report failures as
//! [`MeshError::Transport`](crate::MeshError::Transport).

use async_trait::async_trait;
use serde::Serialize;

use crate::MeshResult;

/// One row of a routing-table page exactly as the daemon reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRoute {
    pub ip: String,
    pub path: String,
    pub link: i64,
    pub version: i64,
}

/// One page of `NodeStore_dumpTable`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePage {
    pub rows: Vec<RawRoute>,
    /// Error field as sent by the daemon; `"none"` means success.
    pub error: Option<String>,
    /// Continuation indicator; absent or zero on the last page.
    pub more: Option<i64>,
}

/// Reply to a single probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingReply {
    /// `"timeout"` when the target did not answer in time.
    pub result: String,
    /// Round-trip time in milliseconds as measured by the daemon.
    pub time_ms: u64,
    pub version: String,
    /// Explicit remote error, already stripped of the `"none"` marker.
    pub error: Option<String>,
}

impl PingReply {
    pub const TIMEOUT: &'static str = "timeout";

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.result == Self::TIMEOUT
    }
}

/// Log subscription filter. Empty file and zero line match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub level: String,
    pub file: String,
    pub line: u32,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            level: "DEBUG".to_string(),
            file: String::new(),
            line: 0,
        }
    }
}

/// A log line pushed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub time: i64,
    pub level: String,
    pub file: String,
    pub line: i64,
    pub message: String,
}

/// Request/response calls offered by the daemon's admin interface.
#[async_trait]
pub trait AdminConnection: Send {
    /// Fetch one page of the routing table.
    async fn dump_table_page(&mut self, page: u32) -> MeshResult<TablePage>;

    /// Send one probe towards `target` (padded IPv6 or dotted label).
    async fn ping_node(&mut self, target: &str, timeout_ms: u64) -> MeshResult<PingReply>;

    /// Subscribe to the daemon log, returning the stream identifier.
    async fn subscribe_log(&mut self, filter: &LogFilter) -> MeshResult<String>;

    /// Wait for the next pushed log entry. `None` once the stream is closed.
    async fn next_log_entry(&mut self) -> MeshResult<Option<LogEntry>>;

    async fn unsubscribe_log(&mut self, stream_id: &str) -> MeshResult<()>;

    /// Ask the daemon to exit gracefully.
    async fn exit(&mut self) -> MeshResult<()>;

    /// Unauthenticated liveness check.
    async fn is_alive(&mut self, timeout_ms: u64) -> MeshResult<bool>;
}
