//! Heartbeat ping/pong liveness monitoring.
//!
//! One monitor task runs per session generation. It polls the clock and acts
//! on wall-clock boundaries: every `ping_every` seconds it sends a PING, and
//! every `check_every` seconds it judges the ping/pong timestamps. A stale
//! verdict triggers a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::client::{Inner, Trigger};
use crate::config::HeartbeatPolicy;
use crate::state::ConnectionState;

/// Ping/pong timestamps, in clock seconds.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    last_ping: AtomicI64,
    last_pong: AtomicI64,
}

impl Heartbeat {
    pub(crate) fn new(now: i64) -> Self {
        Self {
            last_ping: AtomicI64::new(now),
            last_pong: AtomicI64::new(now),
        }
    }

    pub(crate) fn reset(&self, now: i64) {
        self.last_ping.store(now, Ordering::Release);
        self.last_pong.store(now, Ordering::Release);
    }

    pub(crate) fn record_ping(&self, now: i64) {
        self.last_ping.store(now, Ordering::Release);
    }

    pub(crate) fn record_pong(&self, now: i64) {
        self.last_pong.store(now, Ordering::Release);
    }

    pub(crate) fn last_ping(&self) -> i64 {
        self.last_ping.load(Ordering::Acquire)
    }

    pub(crate) fn last_pong(&self) -> i64 {
        self.last_pong.load(Ordering::Acquire)
    }
}

/// Outcome of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// No ping has been written for `since` seconds.
    PingStale { since: i64 },
    /// The last ping has gone unanswered for `waited` seconds.
    PongLate { waited: i64 },
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Healthy => write!(f, "healthy"),
            Verdict::PingStale { since } => write!(f, "no successful ping for {since}s"),
            Verdict::PongLate { waited } => write!(f, "ping unanswered for {waited}s"),
        }
    }
}

/// Judge the timestamps. The ping rule wins when both apply.
pub(crate) fn evaluate(
    policy: &HeartbeatPolicy,
    now: i64,
    last_ping: i64,
    last_pong: i64,
) -> Verdict {
    let since_ping = now - last_ping;
    if since_ping > policy.ping_timeout {
        return Verdict::PingStale { since: since_ping };
    }
    if last_pong < last_ping && since_ping > policy.pong_grace {
        return Verdict::PongLate { waited: since_ping };
    }
    Verdict::Healthy
}

fn aligned(now: i64, period: i64) -> bool {
    period > 0 && now % period == 0
}

/// Run the monitor for session `generation` until it is superseded or the
/// client is closed.
///
/// While a dial is in flight the monitor idles. After a failed dial it keeps
/// checking, so its staleness rules retry the connection.
pub(crate) async fn run(inner: Arc<Inner>, generation: u64) {
    let policy = inner.config.heartbeat.clone();
    let mut last_tick = None;

    loop {
        if inner.generation() != generation {
            tracing::debug!(generation, "heartbeat superseded by a newer session");
            return;
        }
        let state = inner.state();
        if state == ConnectionState::Closed {
            tracing::debug!(generation, "heartbeat stopped, client closed");
            return;
        }

        let now = inner.clock.now();
        if state != ConnectionState::Connecting && last_tick != Some(now) {
            last_tick = Some(now);

            if state == ConnectionState::Up && aligned(now, policy.ping_every) {
                if let Err(e) = inner.ping().await {
                    tracing::debug!(error = %e, "heartbeat ping failed");
                }
            }

            if aligned(now, policy.check_every) {
                let verdict = evaluate(
                    &policy,
                    now,
                    inner.heartbeat.last_ping(),
                    inner.heartbeat.last_pong(),
                );
                if verdict != Verdict::Healthy {
                    tracing::warn!(generation, %verdict, "connection looks stale, reconnecting");
                    inner.reconnect(Trigger::Heartbeat(verdict)).await;
                    continue;
                }
            }
        }

        tokio::time::sleep(policy.poll_interval()).await;
    }
}
