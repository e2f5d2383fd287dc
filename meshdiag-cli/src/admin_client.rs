#![forbid(unsafe_code)]

//! UDP admin client for the mesh daemon.
//!
//! Every authenticated call fetches a fresh cookie, signs the request with
//! `sha256(password || cookie)`, then replaces that hash with the sha256 of
//! the whole bencoded request. Replies are matched on `txid`; log lines
//! pushed by an active subscription are queued until asked for.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use meshdiag_core::admin::{AdminConnection, LogEntry, LogFilter, PingReply, RawRoute, TablePage};
use meshdiag_core::{AdminCredentials, MeshError, MeshResult};

use crate::bencode::{self, Value};

/// Upper bound for a single request/response exchange.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest datagram the daemon sends.
const MAX_DATAGRAM: usize = 64 * 1024;

fn transport<E: std::fmt::Display>(e: E) -> MeshError {
    MeshError::Transport(e.to_string())
}

/// Deadline `wait` from now, refusing waits the clock cannot represent.
fn deadline_after(wait: Duration) -> MeshResult<Instant> {
    Instant::now()
        .checked_add(wait)
        .ok_or_else(|| MeshError::Transport(format!("wait of {wait:?} is out of range")))
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Authenticated connection to the admin interface.
pub struct UdpAdmin {
    socket: UdpSocket,
    password: String,
    pending_logs: VecDeque<Value>,
}

impl UdpAdmin {
    /// Bind an ephemeral local port and connect it to the admin address.
    pub async fn connect(creds: &AdminCredentials) -> MeshResult<Self> {
        let local: SocketAddr = if creds.bind.is_ipv4() {
            "0.0.0.0:0".parse().map_err(transport)?
        } else {
            "[::]:0".parse().map_err(transport)?
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(creds.bind).await?;
        debug!(bind = %creds.bind, "admin socket connected");
        let mut admin = Self {
            socket,
            password: creds.password.clone(),
            pending_logs: VecDeque::new(),
        };
        if !admin.is_alive(REQUEST_TIMEOUT.as_millis() as u64).await? {
            return Err(MeshError::Transport(format!("no answer from daemon at {}", creds.bind)));
        }
        Ok(admin)
    }

    fn next_txid() -> String {
        format!("{:08x}", rand::random::<u32>())
    }

    async fn send(&self, msg: &Value) -> MeshResult<()> {
        let bytes = msg.encode();
        trace!(len = bytes.len(), "admin request");
        self.socket.send(&bytes).await.map_err(transport)?;
        Ok(())
    }

    /// Receive datagrams until one carries `txid`, or `wait` elapses.
    async fn recv_reply(&mut self, txid: &str, wait: Duration) -> MeshResult<Value> {
        let deadline = deadline_after(wait)?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = timeout(remaining, self.socket.recv(&mut buf))
                .await
                .map_err(|_| MeshError::Transport("timed out waiting for daemon".into()))?
                .map_err(transport)?;
            let Some(msg) = bencode::decode(&buf[..n]) else {
                debug!(len = n, "dropping undecodable datagram");
                continue;
            };
            if is_log_push(&msg) {
                self.pending_logs.push_back(msg);
                continue;
            }
            if msg.str_field("txid") == Some(txid) {
                return Ok(msg);
            }
            debug!("dropping reply for unknown txid");
        }
    }

    async fn cookie(&mut self) -> MeshResult<String> {
        let txid = Self::next_txid();
        self.send(&Value::dict([("q", Value::str("cookie")), ("txid", Value::str(&txid))]))
            .await?;
        let reply = self.recv_reply(&txid, REQUEST_TIMEOUT).await?;
        reply
            .str_field("cookie")
            .map(str::to_string)
            .ok_or_else(|| MeshError::Transport("cookie reply without cookie".into()))
    }

    /// Issue an authenticated call and wait up to `wait` for the reply.
    async fn call(&mut self, function: &str, args: Value, wait: Duration) -> MeshResult<Value> {
        let cookie = self.cookie().await?;
        let txid = Self::next_txid();
        let mut request = Value::dict([
            ("q", Value::str("auth")),
            ("aq", Value::str(function)),
            ("args", args),
            ("cookie", Value::str(&cookie)),
            ("hash", Value::str(&sha256_hex(format!("{}{}", self.password, cookie).as_bytes()))),
            ("txid", Value::str(&txid)),
        ]);
        let signed = sha256_hex(&request.encode());
        request.insert("hash", Value::str(&signed));
        self.send(&request).await?;

        let reply = self.recv_reply(&txid, wait).await?;
        if let Some(err) = reply.str_field("error") {
            if is_auth_failure(err) {
                return Err(MeshError::Transport(format!("{function}: {err}")));
            }
        }
        Ok(reply)
    }
}

fn is_log_push(msg: &Value) -> bool {
    msg.get("streamId").is_some() && msg.get("message").is_some()
}

fn is_auth_failure(err: &str) -> bool {
    err.eq_ignore_ascii_case("auth failed.") || err.eq_ignore_ascii_case("auth failed")
}

/// Error field with the daemon's "none" marker folded into `None`.
fn error_field(reply: &Value) -> Option<String> {
    match reply.str_field("error") {
        None | Some("") | Some("none") => None,
        Some(e) => Some(e.to_string()),
    }
}

fn raw_route(row: &Value) -> Option<RawRoute> {
    Some(RawRoute {
        ip: row.str_field("ip").unwrap_or_default().to_string(),
        path: row.str_field("path")?.to_string(),
        link: row.int_field("link").unwrap_or(0),
        version: row.int_field("version").unwrap_or(0),
    })
}

fn table_page(reply: &Value) -> TablePage {
    let rows = reply
        .get("routingTable")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(raw_route)
        .collect();
    TablePage {
        rows,
        error: reply.str_field("error").map(str::to_string),
        more: reply.int_field("more"),
    }
}

fn ping_reply(reply: &Value) -> PingReply {
    PingReply {
        result: reply.str_field("result").unwrap_or_default().to_string(),
        time_ms: reply.int_field("ms").unwrap_or(0).max(0) as u64,
        version: reply.str_field("version").unwrap_or_default().to_string(),
        error: error_field(reply),
    }
}

fn log_entry(msg: &Value) -> LogEntry {
    LogEntry {
        time: msg.int_field("time").unwrap_or(0),
        level: msg.str_field("level").unwrap_or_default().to_string(),
        file: msg.str_field("file").unwrap_or_default().to_string(),
        line: msg.int_field("line").unwrap_or(0),
        message: msg.str_field("message").unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl AdminConnection for UdpAdmin {
    async fn dump_table_page(&mut self, page: u32) -> MeshResult<TablePage> {
        let args = Value::dict([("page", Value::Int(i64::from(page)))]);
        let reply = self.call("NodeStore_dumpTable", args, REQUEST_TIMEOUT).await?;
        Ok(table_page(&reply))
    }

    async fn ping_node(&mut self, target: &str, timeout_ms: u64) -> MeshResult<PingReply> {
        let args = Value::dict([
            ("path", Value::str(target)),
            ("timeout", Value::Int(i64::try_from(timeout_ms).unwrap_or(i64::MAX))),
        ]);
        // the daemon answers only after its own probe timeout has run out
        let wait = Duration::from_millis(timeout_ms).saturating_add(REQUEST_TIMEOUT);
        let reply = self.call("RouterModule_pingNode", args, wait).await?;
        Ok(ping_reply(&reply))
    }

    async fn subscribe_log(&mut self, filter: &LogFilter) -> MeshResult<String> {
        let mut args = Value::dict([("level", Value::str(&filter.level))]);
        if !filter.file.is_empty() {
            args.insert("file", Value::str(&filter.file));
        }
        if filter.line != 0 {
            args.insert("line", Value::Int(i64::from(filter.line)));
        }
        let reply = self.call("AdminLog_subscribe", args, REQUEST_TIMEOUT).await?;
        if let Some(err) = error_field(&reply) {
            return Err(MeshError::DaemonReported(err));
        }
        reply
            .str_field("streamId")
            .map(str::to_string)
            .ok_or_else(|| MeshError::Transport("subscribe reply without streamId".into()))
    }

    async fn next_log_entry(&mut self) -> MeshResult<Option<LogEntry>> {
        if let Some(msg) = self.pending_logs.pop_front() {
            return Ok(Some(log_entry(&msg)));
        }
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let n = self.socket.recv(&mut buf).await.map_err(transport)?;
            match bencode::decode(&buf[..n]) {
                Some(msg) if is_log_push(&msg) => return Ok(Some(log_entry(&msg))),
                _ => debug!(len = n, "ignoring non-log datagram"),
            }
        }
    }

    async fn unsubscribe_log(&mut self, stream_id: &str) -> MeshResult<()> {
        let args = Value::dict([("streamId", Value::str(stream_id))]);
        let reply = self.call("AdminLog_unsubscribe", args, REQUEST_TIMEOUT).await?;
        match error_field(&reply) {
            Some(err) => Err(MeshError::DaemonReported(err)),
            None => Ok(()),
        }
    }

    async fn exit(&mut self) -> MeshResult<()> {
        let reply = self.call("Core_exit", Value::Dict(Default::default()), REQUEST_TIMEOUT).await?;
        match error_field(&reply) {
            Some(err) => Err(MeshError::DaemonReported(err)),
            None => Ok(()),
        }
    }

    async fn is_alive(&mut self, timeout_ms: u64) -> MeshResult<bool> {
        let txid = Self::next_txid();
        let ping = Value::dict([("q", Value::str("ping")), ("txid", Value::str(&txid))]);
        if self.send(&ping).await.is_err() {
            return Ok(false);
        }
        match self.recv_reply(&txid, Duration::from_millis(timeout_ms)).await {
            Ok(reply) => Ok(reply.str_field("q") == Some("pong")),
            Err(_) => Ok(false),
        }
    }
}
