//! Gate configuration
//!
//! Loaded from defaults, an optional TOML file, then `FACEGATE_*` environment
//! overrides. `validate()` runs before any loop is constructed.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::types::{ChallengeKind, ChallengeSpec};
use crate::{
    DEFAULT_BLINK_THRESHOLD, DEFAULT_CONSTRAINED_FPS, DEFAULT_COUNTDOWN_SECONDS,
    DEFAULT_LIVENESS_TIMEOUT_MS, DEFAULT_MAX_CENTER_OFFSET, DEFAULT_MAX_FACE_SIZE,
    DEFAULT_MIN_DETECTION_SCORE, DEFAULT_MIN_FACE_SIZE, DEFAULT_NEUTRAL_YAW_THRESHOLD,
    DEFAULT_SAMPLE_TIMEOUT_MS, DEFAULT_STABILITY_TIME_MS, DEFAULT_TARGET_FPS,
    DEFAULT_TURN_THRESHOLD_DEGREES,
};

/// Per-kind challenge thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeThresholds {
    /// Degrees
    pub turn_left: f64,
    /// Degrees
    pub turn_right: f64,
    /// Eye aspect ratio drop
    pub blink: f64,
}

impl Default for ChallengeThresholds {
    fn default() -> Self {
        Self {
            turn_left: DEFAULT_TURN_THRESHOLD_DEGREES,
            turn_right: DEFAULT_TURN_THRESHOLD_DEGREES,
            blink: DEFAULT_BLINK_THRESHOLD,
        }
    }
}

/// Everything the gating core can be tuned with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum face area / image area
    pub min_face_size: f64,
    /// Maximum face area / image area
    pub max_face_size: f64,
    /// Maximum normalized center distance
    pub max_center_offset: f64,
    /// Minimum overall quality score
    pub min_detection_score: f64,
    /// Acceptable time required before the countdown starts (milliseconds)
    pub stability_time_ms: u64,
    /// Countdown length (seconds)
    pub countdown_seconds: u32,
    /// Sampling rate
    pub target_fps: u32,
    /// Sampling rate used when `constrained_device` is set
    pub constrained_fps: u32,
    pub constrained_device: bool,
    /// Silence from the source longer than this counts as no face (milliseconds)
    pub sample_timeout_ms: u64,
    /// Per-challenge timeout (milliseconds)
    pub liveness_timeout_ms: u64,
    /// |yaw| below this counts as facing forward (degrees)
    pub neutral_yaw_threshold: f64,
    pub thresholds: ChallengeThresholds,
    /// Ordered liveness challenges; empty disables liveness
    pub challenges: Vec<ChallengeKind>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            max_face_size: DEFAULT_MAX_FACE_SIZE,
            max_center_offset: DEFAULT_MAX_CENTER_OFFSET,
            min_detection_score: DEFAULT_MIN_DETECTION_SCORE,
            stability_time_ms: DEFAULT_STABILITY_TIME_MS,
            countdown_seconds: DEFAULT_COUNTDOWN_SECONDS,
            target_fps: DEFAULT_TARGET_FPS,
            constrained_fps: DEFAULT_CONSTRAINED_FPS,
            constrained_device: false,
            sample_timeout_ms: DEFAULT_SAMPLE_TIMEOUT_MS,
            liveness_timeout_ms: DEFAULT_LIVENESS_TIMEOUT_MS,
            neutral_yaw_threshold: DEFAULT_NEUTRAL_YAW_THRESHOLD,
            thresholds: ChallengeThresholds::default(),
            challenges: Vec::new(),
        }
    }
}

impl GateConfig {
    /// Tighter framing and longer hold
    pub fn strict() -> Self {
        Self {
            max_center_offset: 0.10,
            min_detection_score: 0.80,
            stability_time_ms: 2500,
            neutral_yaw_threshold: 5.0,
            thresholds: ChallengeThresholds {
                turn_left: 20.0,
                turn_right: 20.0,
                blink: 0.12,
            },
            ..Default::default()
        }
    }

    /// Looser framing for low-end cameras
    pub fn lenient() -> Self {
        Self {
            min_face_size: 0.03,
            max_face_size: 0.75,
            max_center_offset: 0.25,
            min_detection_score: 0.55,
            stability_time_ms: 1000,
            constrained_device: true,
            neutral_yaw_threshold: 12.0,
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| GateError::Parse(e.to_string()))
    }

    /// Load a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GateError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Apply `FACEGATE_*` environment variables over the current values
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get_f64 = |key: &str, default: f64| parse_or(lookup(key), default);
        self.min_face_size = get_f64("FACEGATE_MIN_FACE_SIZE", self.min_face_size);
        self.max_face_size = get_f64("FACEGATE_MAX_FACE_SIZE", self.max_face_size);
        self.max_center_offset = get_f64("FACEGATE_MAX_CENTER_OFFSET", self.max_center_offset);
        self.min_detection_score =
            get_f64("FACEGATE_MIN_DETECTION_SCORE", self.min_detection_score);
        self.neutral_yaw_threshold =
            get_f64("FACEGATE_NEUTRAL_YAW_THRESHOLD", self.neutral_yaw_threshold);
        self.stability_time_ms =
            parse_or(lookup("FACEGATE_STABILITY_TIME_MS"), self.stability_time_ms);
        self.countdown_seconds =
            parse_or(lookup("FACEGATE_COUNTDOWN_SECONDS"), self.countdown_seconds);
        self.target_fps = parse_or(lookup("FACEGATE_TARGET_FPS"), self.target_fps);
        self.liveness_timeout_ms =
            parse_or(lookup("FACEGATE_LIVENESS_TIMEOUT_MS"), self.liveness_timeout_ms);
        if let Some(v) = lookup("FACEGATE_CONSTRAINED_DEVICE") {
            self.constrained_device = v != "0";
        }
        if let Some(list) = lookup("FACEGATE_CHALLENGES") {
            let parsed: std::result::Result<Vec<ChallengeKind>, _> = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(kinds) => self.challenges = kinds,
                Err(e) => tracing::warn!(error = %e, "ignoring FACEGATE_CHALLENGES"),
            }
        }
        self
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        check_unit("min_face_size", self.min_face_size)?;
        check_unit("max_face_size", self.max_face_size)?;
        check_unit("max_center_offset", self.max_center_offset)?;
        check_unit("min_detection_score", self.min_detection_score)?;
        if self.min_face_size > self.max_face_size {
            return Err(invalid(
                "min_face_size",
                self.min_face_size,
                "must not exceed max_face_size",
            ));
        }
        if self.countdown_seconds == 0 {
            return Err(invalid("countdown_seconds", 0, "must be at least 1"));
        }
        if self.target_fps == 0 || self.target_fps > 120 {
            return Err(invalid("target_fps", self.target_fps, "must be within 1..=120"));
        }
        if self.constrained_fps == 0 || self.constrained_fps > 120 {
            return Err(invalid(
                "constrained_fps",
                self.constrained_fps,
                "must be within 1..=120",
            ));
        }
        if self.sample_timeout_ms == 0 {
            return Err(invalid("sample_timeout_ms", 0, "must be positive"));
        }
        if self.liveness_timeout_ms == 0 {
            return Err(invalid("liveness_timeout_ms", 0, "must be positive"));
        }
        if !(self.neutral_yaw_threshold > 0.0 && self.neutral_yaw_threshold < 90.0) {
            return Err(invalid(
                "neutral_yaw_threshold",
                self.neutral_yaw_threshold,
                "must be within (0, 90) degrees",
            ));
        }
        for (field, value) in [
            ("thresholds.turn_left", self.thresholds.turn_left),
            ("thresholds.turn_right", self.thresholds.turn_right),
        ] {
            if !(value > 0.0 && value < 90.0) {
                return Err(invalid(field, value, "must be within (0, 90) degrees"));
            }
        }
        if !(self.thresholds.blink > 0.0 && self.thresholds.blink < 1.0) {
            return Err(invalid(
                "thresholds.blink",
                self.thresholds.blink,
                "must be within (0, 1)",
            ));
        }
        Ok(())
    }

    /// Frames per second actually used for sampling
    pub fn effective_fps(&self) -> u32 {
        if self.constrained_device {
            self.constrained_fps
        } else {
            self.target_fps
        }
    }

    /// Delay between ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.effective_fps().max(1)))
    }

    pub fn threshold_for(&self, kind: ChallengeKind) -> f64 {
        match kind {
            ChallengeKind::TurnLeft => self.thresholds.turn_left,
            ChallengeKind::TurnRight => self.thresholds.turn_right,
            ChallengeKind::Blink => self.thresholds.blink,
        }
    }

    /// Challenge list expanded into immutable specs
    pub fn challenge_specs(&self) -> Vec<ChallengeSpec> {
        self.challenges
            .iter()
            .map(|&kind| ChallengeSpec::new(kind, self.threshold_for(kind), self.liveness_timeout_ms))
            .collect()
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, value, "must be within [0, 1]"))
    }
}

fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> GateError {
    GateError::ConfigInvalid {
        field,
        value: value.to_string(),
        reason,
    }
}
