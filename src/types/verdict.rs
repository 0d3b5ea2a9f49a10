//! Per-sample verdicts and the tagged detection result

use serde::{Deserialize, Serialize};

use crate::types::RawSample;

/// Where the face sits in the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionVerdict {
    /// Face area / image area
    pub size_ratio: f64,
    /// Normalized distance between face center and image center
    pub center_offset: f64,
    pub is_size_valid: bool,
    pub is_centered: bool,
    /// Which way the size check failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_issue: Option<SizeIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeIssue {
    TooSmall,
    TooLarge,
}

/// How usable the face is for capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub overall_score: f64,
    pub lighting_score: f64,
    pub sharpness_score: f64,
    pub eyes_visible: bool,
    pub mouth_visible: bool,
    /// overall ≥ min score, size valid, centered and eyes visible
    pub is_acceptable: bool,
}

/// Head orientation proxy derived from landmark geometry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Positive when the nose sits right of the eye midpoint in image space
    pub yaw_degrees: f64,
    /// Mean eye aspect ratio of both eyes
    pub eye_openness: f64,
}

/// Result of evaluating one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
    NoFace,
    MultipleFaces {
        count: usize,
    },
    Detected {
        position: PositionVerdict,
        quality: QualityVerdict,
        #[serde(skip_serializing_if = "Option::is_none")]
        pose: Option<PoseEstimate>,
        sample: RawSample,
    },
}

impl Detection {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Detection::Detected { quality, .. } if quality.is_acceptable)
    }

    pub fn pose(&self) -> Option<PoseEstimate> {
        match self {
            Detection::Detected { pose, .. } => *pose,
            _ => None,
        }
    }

    pub fn quality(&self) -> Option<&QualityVerdict> {
        match self {
            Detection::Detected { quality, .. } => Some(quality),
            _ => None,
        }
    }
}
