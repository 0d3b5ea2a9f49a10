//! CountdownController: sustained stability → timed, cancellable capture trigger
//!
//! State transitions:
//! - IDLE → COUNTING: stable ≥ stability time (once per ready streak)
//! - COUNTING → IDLE: quality lost or caller cancel (no partial credit)
//! - COUNTING → FIRED: countdown seconds elapsed

use serde::{Deserialize, Serialize};

use crate::types::CountdownEvent;

/// Countdown phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownPhase {
    Idle,
    Counting { since_ms: u64 },
    Fired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownController {
    stability_time_ms: u64,
    countdown_seconds: u32,
    phase: CountdownPhase,
    /// Last whole-second value emitted while counting
    last_emitted: Option<u32>,
}

impl CountdownController {
    pub fn new(stability_time_ms: u64, countdown_seconds: u32) -> Self {
        Self {
            stability_time_ms,
            countdown_seconds: countdown_seconds.max(1),
            phase: CountdownPhase::Idle,
            last_emitted: None,
        }
    }

    /// Feed one tick, return at most one countdown event
    pub fn update(&mut self, now_ms: u64, stable_ms: u64, is_acceptable: bool) -> Option<CountdownEvent> {
        match self.phase {
            CountdownPhase::Idle => {
                if is_acceptable && stable_ms >= self.stability_time_ms {
                    self.phase = CountdownPhase::Counting { since_ms: now_ms };
                    self.last_emitted = Some(self.countdown_seconds);
                    tracing::info!(
                        at_ms = now_ms,
                        seconds = self.countdown_seconds,
                        "countdown started"
                    );
                    Some(CountdownEvent::Tick {
                        remaining: self.countdown_seconds,
                    })
                } else {
                    None
                }
            }

            CountdownPhase::Counting { since_ms } => {
                if !is_acceptable {
                    tracing::info!(at_ms = now_ms, "countdown cancelled: quality lost");
                    self.to_idle();
                    return Some(CountdownEvent::Cancelled);
                }

                let elapsed = now_ms.saturating_sub(since_ms);
                let total_ms = u64::from(self.countdown_seconds) * 1000;
                if elapsed >= total_ms {
                    self.phase = CountdownPhase::Fired;
                    self.last_emitted = None;
                    tracing::info!(at_ms = now_ms, "countdown complete");
                    return Some(CountdownEvent::Complete);
                }

                let remaining = self.countdown_seconds - (elapsed / 1000) as u32;
                if self.last_emitted != Some(remaining) {
                    self.last_emitted = Some(remaining);
                    Some(CountdownEvent::Tick { remaining })
                } else {
                    None
                }
            }

            CountdownPhase::Fired => None,
        }
    }

    /// Caller-initiated abort; idempotent
    pub fn cancel(&mut self) -> Option<CountdownEvent> {
        if self.is_counting() {
            tracing::info!("countdown cancelled by caller");
            self.to_idle();
            Some(CountdownEvent::Cancelled)
        } else {
            None
        }
    }

    fn to_idle(&mut self) {
        self.phase = CountdownPhase::Idle;
        self.last_emitted = None;
    }

    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.phase, CountdownPhase::Counting { .. })
    }

    pub fn has_fired(&self) -> bool {
        self.phase == CountdownPhase::Fired
    }

    /// Whole seconds left, while counting
    pub fn remaining(&self) -> Option<u32> {
        match self.phase {
            CountdownPhase::Counting { .. } => self.last_emitted,
            _ => None,
        }
    }

    /// Back to idle, ready for the next streak
    pub fn reset(&mut self) {
        self.to_idle();
    }
}
