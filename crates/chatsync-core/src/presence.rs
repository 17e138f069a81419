//! Typing presence with a decaying flag.
//!
//! Typing signals have no matching "stopped" event. The flag is raised on
//! each signal and dropped once `quiet_ms` passes without another one.
//! A new signal re-arms the deadline (debounce, not accumulate).
//!
//! Pure and deterministic: the caller passes `now_ms` and is responsible
//! for waking up at [`PresenceTracker::deadline_ms`].

use crate::types::UserId;

/// Default quiet period before the typing flag clears (milliseconds).
pub const DEFAULT_TYPING_QUIET_MS: u64 = 3_000;

/// Effect of one presence update on the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Unchanged,
    /// Flag went false → true.
    Started,
    /// Flag was already true; deadline moved forward.
    Extended,
    /// Flag went true → false.
    Stopped,
}

impl PresenceChange {
    /// Whether the observable flag flipped.
    pub fn flipped(self) -> bool {
        matches!(self, Self::Started | Self::Stopped)
    }
}

/// Presence flag for one conversation.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    quiet_ms: u64,
    deadline_ms: Option<u64>,
    typing_user: Option<UserId>,
}

impl PresenceTracker {
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            deadline_ms: None,
            typing_user: None,
        }
    }

    pub fn quiet_ms(&self) -> u64 {
        self.quiet_ms
    }

    /// Record a typing signal at `now_ms`.
    ///
    /// Sets the flag and (re)arms the quiet-period deadline, replacing any
    /// previously armed one.
    pub fn on_signal(&mut self, from: Option<UserId>, now_ms: u64) -> PresenceChange {
        let was_typing = self.is_typing();
        self.deadline_ms = Some(now_ms.saturating_add(self.quiet_ms));
        if from.is_some() {
            self.typing_user = from;
        }
        if was_typing {
            PresenceChange::Extended
        } else {
            PresenceChange::Started
        }
    }

    /// Advance to `now_ms`, clearing the flag if the deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> PresenceChange {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.clear();
                PresenceChange::Stopped
            }
            _ => PresenceChange::Unchanged,
        }
    }

    /// The live connection went down; presence can no longer be trusted.
    pub fn on_connection_closed(&mut self) -> PresenceChange {
        if self.is_typing() {
            self.clear();
            PresenceChange::Stopped
        } else {
            PresenceChange::Unchanged
        }
    }

    pub fn is_typing(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// When the flag will clear absent another signal.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    /// Sender of the most recent signal, when the frame carried one.
    pub fn typing_user(&self) -> Option<&UserId> {
        self.typing_user.as_ref()
    }

    fn clear(&mut self) {
        self.deadline_ms = None;
        self.typing_user = None;
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_QUIET_MS)
    }
}

// ─── Tests ────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The flag is up exactly when the last signal is younger than the quiet period.
        #[test]
        fn flag_matches_last_signal_age(
            gaps in proptest::collection::vec(0u64..5_000, 1..20),
            offset in 0u64..10_000,
        ) {
            let quiet = 3_000;
            let mut tracker = PresenceTracker::new(quiet);
            let mut now = 0u64;
            for gap in &gaps {
                now += gap;
                tracker.poll(now);
                tracker.on_signal(None, now);
            }
            let last_signal = now;
            tracker.poll(last_signal + offset);
            prop_assert_eq!(tracker.is_typing(), offset < quiet);
        }
    }
}
