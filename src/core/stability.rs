//! StabilityTracker: how long the subject has been continuously acceptable
//!
//! Knows nothing about countdowns; it only turns a stream of verdicts into a
//! duration.

/// Tracks the start of the current acceptable streak
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilityTracker {
    /// When the current streak began
    ready_since: Option<u64>,
    /// Duration reported by the last update
    last_stable_ms: u64,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one verdict, return the continuous acceptable duration (milliseconds)
    pub fn update(&mut self, now_ms: u64, is_acceptable: bool) -> u64 {
        if is_acceptable {
            let since = *self.ready_since.get_or_insert(now_ms);
            self.last_stable_ms = now_ms.saturating_sub(since);
        } else {
            if self.ready_since.is_some() {
                tracing::debug!(at_ms = now_ms, "stability reset");
            }
            self.ready_since = None;
            self.last_stable_ms = 0;
        }
        self.last_stable_ms
    }

    /// Duration reported by the last update
    pub fn stable_ms(&self) -> u64 {
        self.last_stable_ms
    }

    pub fn ready_since(&self) -> Option<u64> {
        self.ready_since
    }

    /// Reset tracker to initial state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
