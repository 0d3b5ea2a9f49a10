//! Per-tick output structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChallengeEvent, ChallengeRun, Detection, DetectionState, SequenceResult};

/// Countdown progress reported on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountdownEvent {
    /// Whole seconds left before capture
    Tick { remaining: u32 },
    /// Countdown finished; capture should happen now
    Complete,
    /// Countdown abandoned before completion
    Cancelled,
}

/// Full result of the latest tick, for observers and polling consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    /// Wall-clock time the snapshot was produced
    pub timestamp: DateTime<Utc>,
    /// Tick counter since start or last reset
    pub tick: u64,
    /// Sample time on the source clock (milliseconds)
    pub sample_time_ms: u64,
    pub state: DetectionState,
    pub detection: Detection,
    /// Continuous acceptable time (milliseconds)
    pub stable_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_challenge: Option<ChallengeRun>,
    pub challenges_completed: usize,
    /// Liveness sequence finished without passing; no capture until reset
    #[serde(default)]
    pub liveness_failed: bool,
}

impl DetectionSnapshot {
    /// Snapshot before any sample was processed
    pub fn initializing() -> Self {
        Self {
            timestamp: Utc::now(),
            tick: 0,
            sample_time_ms: 0,
            state: DetectionState::Initializing,
            detection: Detection::NoFace,
            stable_ms: 0,
            countdown_remaining: None,
            active_challenge: None,
            challenges_completed: 0,
            liveness_failed: false,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        format!(
            "{}{} {}{}",
            self.state.color_code(),
            self.state.emoji(),
            self.to_parseable_string(),
            DetectionState::color_reset()
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let score = self
            .detection
            .quality()
            .map(|q| format!("{:.3}", q.overall_score))
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "t={}ms | state={} | score={} | stable={:.1}s",
            self.sample_time_ms,
            self.state,
            score,
            self.stable_ms as f64 / 1000.0,
        );
        if let Some(remaining) = self.countdown_remaining {
            line.push_str(&format!(" | countdown={}", remaining));
        }
        if let Some(run) = &self.active_challenge {
            line.push_str(&format!(" | challenge={}:{:?}", run.spec.kind, run.phase));
        }
        if self.liveness_failed {
            line.push_str(" | liveness=failed");
        }
        line
    }
}

/// Everything a tick can notify, in dispatch order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    StateChange(DetectionSnapshot),
    Countdown(CountdownEvent),
    Challenge(ChallengeEvent),
    SequenceComplete(SequenceResult),
    CaptureReady,
}
