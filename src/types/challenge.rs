//! Liveness challenge definitions

use serde::{Deserialize, Serialize};

use crate::types::PoseEstimate;

/// A pose or action the subject is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    TurnLeft,
    TurnRight,
    Blink,
}

/// Which way the measured axis has to move from the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl ChallengeKind {
    pub fn code(&self) -> &'static str {
        match self {
            ChallengeKind::TurnLeft => "turn_left",
            ChallengeKind::TurnRight => "turn_right",
            ChallengeKind::Blink => "blink",
        }
    }

    /// Prompt shown while the challenge is active
    pub fn instruction(&self) -> &'static str {
        match self {
            ChallengeKind::TurnLeft => "Slowly turn your head to the left",
            ChallengeKind::TurnRight => "Slowly turn your head to the right",
            ChallengeKind::Blink => "Blink your eyes",
        }
    }

    /// Value of the axis this challenge is measured on
    pub fn axis_value(&self, pose: &PoseEstimate) -> f64 {
        match self {
            ChallengeKind::TurnLeft | ChallengeKind::TurnRight => pose.yaw_degrees,
            ChallengeKind::Blink => pose.eye_openness,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            ChallengeKind::TurnLeft => Direction::Increase,
            ChallengeKind::TurnRight | ChallengeKind::Blink => Direction::Decrease,
        }
    }
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for ChallengeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turn_left" | "left" => Ok(ChallengeKind::TurnLeft),
            "turn_right" | "right" => Ok(ChallengeKind::TurnRight),
            "blink" => Ok(ChallengeKind::Blink),
            other => Err(format!("unknown challenge kind '{}'", other)),
        }
    }
}

/// Immutable challenge parameters, fixed per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSpec {
    pub kind: ChallengeKind,
    /// Degrees for head turns, aspect-ratio units for blinks
    pub threshold: f64,
    pub timeout_ms: u64,
}

impl ChallengeSpec {
    pub fn new(kind: ChallengeKind, threshold: f64, timeout_ms: u64) -> Self {
        Self {
            kind,
            threshold,
            timeout_ms,
        }
    }

    /// Whether the signed delta from baseline completes the challenge
    pub fn is_satisfied_by(&self, diff: f64) -> bool {
        match self.kind.direction() {
            Direction::Increase => diff >= self.threshold,
            Direction::Decrease => diff <= -self.threshold,
        }
    }
}

/// Phase of a single challenge run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePhase {
    /// Waiting for the subject to face forward before the baseline is taken
    AwaitingNeutral,
    /// Baseline captured, measuring deltas
    Armed,
    Succeeded,
    FailedTimeout,
}

impl ChallengePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChallengePhase::Succeeded | ChallengePhase::FailedTimeout)
    }
}

/// One challenge in progress or completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRun {
    pub spec: ChallengeSpec,
    /// Captured once, while the subject is neutral
    pub baseline_pose: Option<PoseEstimate>,
    pub phase: ChallengePhase,
    pub started_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// How far past the threshold the best sample went, 0.0-1.0
    pub confidence: f64,
}

impl ChallengeRun {
    pub fn new(spec: ChallengeSpec, phase: ChallengePhase, started_at_ms: u64) -> Self {
        Self {
            spec,
            baseline_pose: None,
            phase,
            started_at_ms,
            finished_at_ms: None,
            confidence: 0.0,
        }
    }
}

/// What happened to a challenge on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeOutcome {
    Started,
    Succeeded,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChallengeEvent {
    pub kind: ChallengeKind,
    pub outcome: ChallengeOutcome,
    /// Position in the sequence, 0-based
    pub index: usize,
}

/// Final verdict of a liveness sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceResult {
    pub passed: bool,
    pub failed_kinds: Vec<ChallengeKind>,
    pub challenges: Vec<ChallengeRun>,
}
