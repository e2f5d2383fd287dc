#![forbid(unsafe_code)]

//! Probe statistics engine.
//!
//! A [`PingSession`] accumulates counters and round-trip sums for one target.
//! It lives behind a [`parking_lot::Mutex`] so a cancellation path can take a
//! consistent snapshot at any time; the probe loop only locks it after a
//! reply has arrived and never holds the guard across an await.
//!
//! Variance is derived from the running sum and sum of squares of the
//! successful round-trip times (population standard deviation).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admin::AdminConnection;
use crate::{MeshError, MeshResult};

/// Loop settings for one ping run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PingConfig {
    /// Time the daemon waits for each reply, in milliseconds.
    pub timeout_ms: u64,
    /// Number of probes; `None` or `0` probes until cancelled.
    pub count: Option<u32>,
    /// Pause between probes, in milliseconds.
    pub interval_ms: u64,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            count: None,
            interval_ms: 1_000,
        }
    }
}

impl PingConfig {
    /// Probe budget, if the run is bounded at all.
    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.count.filter(|&n| n > 0)
    }
}

/// Running accumulator for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingSession {
    pub target: String,
    /// Version reported by the first successful reply.
    pub version: Option<String>,
    pub sent: u64,
    pub success: u64,
    pub failed: u64,
    /// Last successful round-trip time.
    pub ctime: f64,
    pub ttime: f64,
    pub ttime2: f64,
    pub tmin: f64,
    pub tmax: f64,
}

/// What a single probe produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Reply {
        time_ms: f64,
        /// Set when the target reported a version different from earlier replies.
        version_mismatch: bool,
    },
    Timeout {
        time_ms: f64,
    },
}

impl PingSession {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Record a reply that timed out.
    pub fn record_timeout(&mut self) {
        self.sent += 1;
        self.failed += 1;
    }

    /// Record a reply carrying an explicit remote error.
    pub fn record_error(&mut self) {
        self.sent += 1;
        self.failed += 1;
    }

    /// Record a successful round trip; returns `true` on a version mismatch.
    pub fn record_success(&mut self, time_ms: f64, version: &str) -> bool {
        self.sent += 1;
        self.success += 1;
        self.ctime = time_ms;
        self.ttime += time_ms;
        self.ttime2 += time_ms * time_ms;
        if self.success == 1 {
            self.tmin = time_ms;
            self.tmax = time_ms;
        } else {
            self.tmin = self.tmin.min(time_ms);
            self.tmax = self.tmax.max(time_ms);
        }
        // a reply without a version neither sets nor contradicts the known one
        if version.is_empty() {
            return false;
        }
        match &self.version {
            None => {
                self.version = Some(version.to_string());
                false
            }
            Some(known) => known != version,
        }
    }

    /// Derived statistics over whatever has been accumulated so far.
    #[must_use]
    pub fn summarize(&self) -> PingSummary {
        let (avg, mdev) = if self.success > 0 {
            let n = self.success as f64;
            let avg = self.ttime / n;
            // rounding may push the variance slightly below zero
            let var = (self.ttime2 / n - avg * avg).max(0.0);
            (avg, var.sqrt())
        } else {
            (0.0, 0.0)
        };
        let loss_percent = if self.sent > 0 {
            Some(self.failed as f64 / self.sent as f64 * 100.0)
        } else {
            None
        };
        PingSummary {
            target: self.target.clone(),
            version: self.version.clone(),
            sent: self.sent,
            success: self.success,
            failed: self.failed,
            total_ms: self.ttime,
            min_ms: self.tmin,
            avg_ms: avg,
            max_ms: self.tmax,
            mdev_ms: mdev,
            loss_percent,
        }
    }
}

/// Final statistics for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingSummary {
    pub target: String,
    pub version: Option<String>,
    pub sent: u64,
    pub success: u64,
    pub failed: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub mdev_ms: f64,
    /// `None` when nothing was sent.
    pub loss_percent: Option<f64>,
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ping statistics ---", self.target)?;
        let loss = match self.loss_percent {
            Some(p) => format!("{p:.2}%"),
            None => "n/a".to_string(),
        };
        writeln!(
            f,
            "{} packets transmitted, {} received, {} packet loss, time {}ms",
            self.sent, self.success, loss, self.total_ms
        )?;
        write!(
            f,
            "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            self.min_ms, self.avg_ms, self.max_ms, self.mdev_ms
        )?;
        if let Some(v) = &self.version {
            write!(f, "\nTarget is using version {v}")?;
        }
        Ok(())
    }
}

/// Send one probe and fold the reply into `session`.
///
/// Transport failures propagate without touching the counters. An explicit
/// remote error is counted as failed and returned as
/// [`MeshError::ProbeFailure`]; a timeout is counted as failed but is not an
/// error.
pub async fn probe<C>(conn: &mut C, session: &Mutex<PingSession>, timeout_ms: u64) -> MeshResult<ProbeOutcome>
where
    C: AdminConnection + ?Sized,
{
    let target = session.lock().target.clone();
    let reply = conn.ping_node(&target, timeout_ms).await?;

    let mut s = session.lock();
    if let Some(err) = reply.error.as_deref() {
        s.record_error();
        return Err(MeshError::ProbeFailure(err.to_string()));
    }
    let time_ms = reply.time_ms as f64;
    if reply.is_timeout() {
        s.record_timeout();
        return Ok(ProbeOutcome::Timeout { time_ms });
    }
    let version_mismatch = s.record_success(time_ms, &reply.version);
    if version_mismatch {
        warn!(node = %s.target, version = %reply.version, "host is sending back mismatched versions");
    }
    Ok(ProbeOutcome::Reply { time_ms, version_mismatch })
}

/// Lifecycle of a ping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingState {
    Idle,
    Probing,
    /// Cancelled or aborted by a transport failure.
    Stopped,
    /// Configured probe count reached.
    Completed,
}

/// Result of [`Pinger::run`]: the terminal state, the summary computed from the
/// session at that moment, and the error that stopped the loop, if any.
#[derive(Debug)]
pub struct PingRun {
    pub state: PingState,
    pub summary: PingSummary,
    pub error: Option<MeshError>,
}

/// Drives the probe loop for one target.
pub struct Pinger {
    config: PingConfig,
    session: Arc<Mutex<PingSession>>,
    state: PingState,
}

impl Pinger {
    #[must_use]
    pub fn new(target: impl Into<String>, config: PingConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(PingSession::new(target))),
            state: PingState::Idle,
        }
    }

    /// Shared handle on the session, for snapshots taken outside the loop.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<PingSession>> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn state(&self) -> PingState {
        self.state
    }

    /// Probe until the configured count is reached, `cancel` trips, or the
    /// connection fails. `on_probe` sees every counted probe.
    ///
    /// Remote probe errors are reported and the loop carries on; a transport
    /// failure stops it.
    pub async fn run<C, F>(&mut self, conn: &mut C, cancel: &CancellationToken, mut on_probe: F) -> PingRun
    where
        C: AdminConnection + ?Sized,
        F: FnMut(&str, &MeshResult<ProbeOutcome>),
    {
        self.state = PingState::Probing;
        let node = self.session.lock().target.clone();
        let limit = self.config.limit();
        info!(%node, count = ?limit, "probing");

        let mut error = None;
        let mut iteration: u32 = 0;
        loop {
            if let Some(count) = limit {
                if iteration >= count {
                    self.state = PingState::Completed;
                    break;
                }
            }
            if iteration > 0 && self.config.interval_ms > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.state = PingState::Stopped;
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(self.config.interval_ms)) => {}
                }
            }
            iteration = iteration.saturating_add(1);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.state = PingState::Stopped;
                    break;
                }
                r = probe(&mut *conn, &self.session, self.config.timeout_ms) => r,
            };
            match result {
                Err(e @ MeshError::ProbeFailure(_)) => {
                    warn!(%node, "{e}");
                    on_probe(&node, &Err(e));
                }
                Err(e) => {
                    self.state = PingState::Stopped;
                    error = Some(e);
                    break;
                }
                ok => on_probe(&node, &ok),
            }
        }

        let summary = self.session.lock().summarize();
        info!(%node, sent = summary.sent, state = ?self.state, "probing finished");
        PingRun {
            state: self.state,
            summary,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_summary_is_defined() {
        let s = PingSession::new("x").summarize();
        assert_eq!(s.sent, 0);
        assert_eq!(s.avg_ms, 0.0);
        assert_eq!(s.mdev_ms, 0.0);
        assert_eq!(s.loss_percent, None);
    }

    #[test]
    fn single_success_has_zero_deviation() {
        let mut s = PingSession::new("x");
        s.record_success(42.0, "v1");
        let sum = s.summarize();
        assert_eq!(sum.avg_ms, 42.0);
        assert_eq!(sum.mdev_ms, 0.0);
        assert_eq!(sum.min_ms, 42.0);
        assert_eq!(sum.max_ms, 42.0);
        assert_eq!(sum.loss_percent, Some(0.0));
    }

    #[test]
    fn all_failed_reports_zero_average() {
        let mut s = PingSession::new("x");
        s.record_timeout();
        s.record_error();
        let sum = s.summarize();
        assert_eq!(sum.sent, 2);
        assert_eq!(sum.failed, 2);
        assert_eq!(sum.avg_ms, 0.0);
        assert_eq!(sum.loss_percent, Some(100.0));
    }

    #[test]
    fn mixed_results() {
        let mut s = PingSession::new("x");
        s.record_success(10.0, "v");
        s.record_timeout();
        s.record_success(20.0, "v");
        assert_eq!(s.sent, s.success + s.failed);
        let sum = s.summarize();
        assert_eq!((sum.sent, sum.success, sum.failed), (3, 2, 1));
        assert_eq!(sum.avg_ms, 15.0);
        assert_eq!(sum.min_ms, 10.0);
        assert_eq!(sum.max_ms, 20.0);
        assert!((sum.mdev_ms - 5.0).abs() < 1e-9);
        assert!((sum.loss_percent.unwrap() - 33.333).abs() < 0.01);
    }

    #[test]
    fn zero_millisecond_sample_sets_minimum() {
        let mut s = PingSession::new("x");
        s.record_success(0.0, "v");
        s.record_success(5.0, "v");
        assert_eq!(s.tmin, 0.0);
        assert_eq!(s.tmax, 5.0);
    }

    #[test]
    fn version_mismatch_flagged() {
        let mut s = PingSession::new("x");
        assert!(!s.record_success(1.0, "a"));
        assert!(!s.record_success(1.0, "a"));
        assert!(s.record_success(1.0, "b"));
        assert_eq!(s.version.as_deref(), Some("a"));
    }

    #[test]
    fn zero_count_means_unbounded() {
        let mut cfg = PingConfig::default();
        assert_eq!(cfg.limit(), None);
        cfg.count = Some(0);
        assert_eq!(cfg.limit(), None);
        cfg.count = Some(4);
        assert_eq!(cfg.limit(), Some(4));
    }

    #[test]
    fn version_captured_after_reply_without_one() {
        let mut s = PingSession::new("x");
        assert!(!s.record_success(1.0, ""));
        assert_eq!(s.version, None);
        assert!(!s.record_success(1.0, "v18"));
        assert_eq!(s.version.as_deref(), Some("v18"));
        assert!(!s.record_success(1.0, ""));
        assert!(s.record_success(1.0, "v19"));
        assert_eq!(s.success, 4);
    }

    #[test]
    fn summary_display() {
        let mut s = PingSession::new("0000.0000.0000.0013");
        s.record_success(10.0, "v9");
        let text = s.summarize().to_string();
        assert!(text.contains("--- 0000.0000.0000.0013 ping statistics ---"));
        assert!(text.contains("1 packets transmitted, 1 received, 0.00% packet loss"));
        assert!(text.contains("rtt min/avg/max/mdev = 10.000/10.000/10.000/0.000 ms"));
        assert!(text.contains("version v9"));
    }
}
