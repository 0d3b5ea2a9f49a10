//! Facegate: face-quality gating, auto-capture countdown and active liveness
//!
//! Pipeline: sample source → QualityEvaluator → StabilityTracker / LivenessSequencer
//! → CountdownController → one DetectionState per tick → observer

pub mod config;
pub mod core;
pub mod error;
pub mod types;

pub use config::GateConfig;
pub use error::{GateError, Result, SourceError};

// =============================================================================
// FACE POSITION DEFAULTS
// =============================================================================

/// Minimum face area as a fraction of the image area
pub const DEFAULT_MIN_FACE_SIZE: f64 = 0.05;

/// Maximum face area as a fraction of the image area
pub const DEFAULT_MAX_FACE_SIZE: f64 = 0.60;

/// Maximum normalized distance between face center and image center
pub const DEFAULT_MAX_CENTER_OFFSET: f64 = 0.15;

/// Minimum overall quality score for an acceptable frame
pub const DEFAULT_MIN_DETECTION_SCORE: f64 = 0.70;

// =============================================================================
// QUALITY HEURISTICS - proxies layered on the detector score, tunable
// =============================================================================

/// Eyes count as visible when their separation exceeds this fraction of box width
pub const EYE_VISIBILITY_RATIO: f64 = 0.20;

/// Expected eye separation as a fraction of box width for a frontal face
pub const EXPECTED_EYE_RATIO: f64 = 0.40;

/// Gain applied to the raw score for the lighting proxy
pub const LIGHTING_GAIN: f64 = 1.2;

// =============================================================================
// TIMING DEFAULTS
// =============================================================================

/// Continuous acceptable time before the countdown starts (milliseconds)
pub const DEFAULT_STABILITY_TIME_MS: u64 = 1500;

/// Countdown length (seconds)
pub const DEFAULT_COUNTDOWN_SECONDS: u32 = 3;

/// Sampling rate on regular devices
pub const DEFAULT_TARGET_FPS: u32 = 10;

/// Sampling rate on constrained devices
pub const DEFAULT_CONSTRAINED_FPS: u32 = 5;

/// A sample source that stays silent longer than this counts as no face (milliseconds)
pub const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// LIVENESS DEFAULTS
// =============================================================================

/// Per-challenge timeout, covering both the neutral wait and the armed phase (milliseconds)
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 8000;

/// |yaw| below this is a neutral, forward-facing pose (degrees)
pub const DEFAULT_NEUTRAL_YAW_THRESHOLD: f64 = 8.0;

/// Yaw delta required for a head turn (degrees)
pub const DEFAULT_TURN_THRESHOLD_DEGREES: f64 = 15.0;

/// Eye-openness drop required for a blink (aspect ratio units)
pub const DEFAULT_BLINK_THRESHOLD: f64 = 0.10;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
