//! Connection supervisor state machine.
//!
//! `Idle → Connecting → Open → ClosedPendingRetry → Connecting → …` with a
//! constant retry delay, until `stop()` forces a terminal `Idle`.
//!
//! Every event carries the attempt number it belongs to. Events for any
//! attempt other than the current one, and every event after `stop()`, are
//! ignored, so a stale timer or a late handshake result can never move a
//! stopped or newer connection.
//!
//! Pure, deterministic, no IO. The async supervisor loop in
//! `chatsync-client` drives it.

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionState, CoreError};

/// Default delay between a closed connection and the next attempt (milliseconds).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

/// Sequence number of one connection attempt (1-based).
pub type Attempt = u64;

// ─── Reconnect Policy ────────────────────────────────────────────

/// Retry policy: constant backoff, retried indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before every retry in milliseconds (default 3000).
    pub delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn constant(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.delay_ms == 0 {
            return Err(CoreError::ZeroDuration {
                field: "reconnect_delay_ms",
            });
        }
        Ok(())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::constant(DEFAULT_RECONNECT_DELAY_MS)
    }
}

/// Returned when an attempt fails: schedule [`ConnectionTracker::retry_due`]
/// for `attempt` after `after_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub attempt: Attempt,
    pub after_ms: u64,
}

// ─── Tracker ─────────────────────────────────────────────────────

/// Lifecycle of the live connection for one conversation view.
///
/// A tracker is single-use: once stopped it never leaves `Idle`, and
/// `start()` after `stop()` is refused.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempt: Attempt,
    started: bool,
    stopped: bool,
    consecutive_failures: u32,
}

impl ConnectionTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            attempt: 0,
            started: false,
            stopped: false,
            consecutive_failures: 0,
        }
    }

    /// `Idle → Connecting` for the first attempt.
    ///
    /// Returns `None` if already started or stopped.
    pub fn start(&mut self) -> Option<Attempt> {
        if self.started || self.stopped {
            return None;
        }
        self.started = true;
        self.attempt = 1;
        self.state = ConnectionState::Connecting;
        Some(self.attempt)
    }

    /// `Connecting → Open` after a successful handshake.
    pub fn on_open(&mut self, attempt: Attempt) -> bool {
        if !self.is_current(attempt) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.consecutive_failures = 0;
        true
    }

    /// `Connecting | Open → ClosedPendingRetry` on ticket failure, handshake
    /// failure, close or transport error.
    pub fn on_failure(&mut self, attempt: Attempt) -> Option<RetryDecision> {
        if !self.is_current(attempt) {
            return None;
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::ClosedPendingRetry;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Some(RetryDecision {
                    attempt,
                    after_ms: self.policy.delay_ms,
                })
            }
            _ => None,
        }
    }

    /// `ClosedPendingRetry → Connecting` when the retry delay for `attempt`
    /// has elapsed. Returns the new attempt number.
    pub fn retry_due(&mut self, attempt: Attempt) -> Option<Attempt> {
        if !self.is_current(attempt) || self.state != ConnectionState::ClosedPendingRetry {
            return None;
        }
        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        Some(self.attempt)
    }

    /// Any state → terminal `Idle`. Safe to call repeatedly.
    ///
    /// Returns the state the tracker was in.
    pub fn stop(&mut self) -> ConnectionState {
        let previous = self.state;
        self.stopped = true;
        self.state = ConnectionState::Idle;
        previous
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Current attempt number (0 before `start`).
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Failures since the last successful open.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn is_current(&self, attempt: Attempt) -> bool {
        !self.stopped && self.started && attempt == self.attempt
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

// ─── Tests ───────────────────────────────────────────────────────
