//! Detection state definitions

use serde::{Deserialize, Serialize};

/// The single state tag shown for the latest tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    /// Loop started, no sample processed yet
    Initializing,
    NoFace,
    FaceTooSmall,
    FaceTooLarge,
    FaceNotCentered,
    /// Face placed correctly but quality below threshold
    PoorLighting,
    MultipleFaces,
    /// Acceptable frame, waiting for stability
    Ready,
    /// Auto-capture countdown running
    Countdown,
    /// Countdown completed, capture in flight
    Capturing,
    /// Detection model failed; loop stopped
    Error,
}

impl DetectionState {
    pub const ALL: [DetectionState; 11] = [
        DetectionState::Initializing,
        DetectionState::NoFace,
        DetectionState::FaceTooSmall,
        DetectionState::FaceTooLarge,
        DetectionState::FaceNotCentered,
        DetectionState::PoorLighting,
        DetectionState::MultipleFaces,
        DetectionState::Ready,
        DetectionState::Countdown,
        DetectionState::Capturing,
        DetectionState::Error,
    ];

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            DetectionState::Initializing => "initializing",
            DetectionState::NoFace => "no_face",
            DetectionState::FaceTooSmall => "face_too_small",
            DetectionState::FaceTooLarge => "face_too_large",
            DetectionState::FaceNotCentered => "face_not_centered",
            DetectionState::PoorLighting => "poor_lighting",
            DetectionState::MultipleFaces => "multiple_faces",
            DetectionState::Ready => "ready",
            DetectionState::Countdown => "countdown",
            DetectionState::Capturing => "capturing",
            DetectionState::Error => "error",
        }
    }

    /// Status line for the person in front of the camera
    pub fn message(&self) -> &'static str {
        match self {
            DetectionState::Initializing => "Starting camera...",
            DetectionState::NoFace => "Position your face in the frame",
            DetectionState::FaceTooSmall => "Move closer to the camera",
            DetectionState::FaceTooLarge => "Move back a little",
            DetectionState::FaceNotCentered => "Center your face in the frame",
            DetectionState::PoorLighting => "Find better lighting",
            DetectionState::MultipleFaces => "Only one person should be in the frame",
            DetectionState::Ready => "Hold still",
            DetectionState::Countdown => "Get ready...",
            DetectionState::Capturing => "Capturing",
            DetectionState::Error => "Camera unavailable. Please try again",
        }
    }

    /// Whether a face is usable for capture in this state
    pub fn is_capture_ready(&self) -> bool {
        matches!(
            self,
            DetectionState::Ready | DetectionState::Countdown | DetectionState::Capturing
        )
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            DetectionState::Initializing => "\x1b[90m",  // Gray
            DetectionState::Ready => "\x1b[32m",         // Green
            DetectionState::Countdown => "\x1b[36m",     // Cyan
            DetectionState::Capturing => "\x1b[35m",     // Magenta
            DetectionState::Error => "\x1b[31m",         // Red
            _ => "\x1b[33m",                             // Yellow
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for state
    pub fn emoji(&self) -> &'static str {
        match self {
            DetectionState::Initializing => "⏳",
            DetectionState::NoFace => "👤",
            DetectionState::FaceTooSmall | DetectionState::FaceTooLarge => "↕",
            DetectionState::FaceNotCentered => "↔",
            DetectionState::PoorLighting => "💡",
            DetectionState::MultipleFaces => "👥",
            DetectionState::Ready => "🟢",
            DetectionState::Countdown => "⏱",
            DetectionState::Capturing => "📸",
            DetectionState::Error => "🔴",
        }
    }
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code().to_uppercase())
    }
}
