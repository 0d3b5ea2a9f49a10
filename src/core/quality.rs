//! QualityEvaluator: raw detection → position and quality verdicts
//!
//! Pure and stateless. The lighting and sharpness scores are proxies built on
//! the detector confidence and eye geometry, not image-signal analysis.

use crate::config::GateConfig;
use crate::core::pose::{eye_separation, estimate_pose};
use crate::types::{
    Detection, FrameSample, PositionVerdict, QualityVerdict, RawSample, SizeIssue,
};
use crate::{EXPECTED_EYE_RATIO, EYE_VISIBILITY_RATIO, LIGHTING_GAIN};

/// Thresholds the evaluator needs, copied out of [`GateConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityEvaluator {
    min_face_size: f64,
    max_face_size: f64,
    max_center_offset: f64,
    min_detection_score: f64,
}

impl QualityEvaluator {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            min_face_size: config.min_face_size,
            max_face_size: config.max_face_size,
            max_center_offset: config.max_center_offset,
            min_detection_score: config.min_detection_score,
        }
    }

    /// Evaluate a single face against the image it was found in
    pub fn evaluate(
        &self,
        sample: &RawSample,
        image_width: f64,
        image_height: f64,
    ) -> (PositionVerdict, QualityVerdict) {
        let position = self.position(sample, image_width, image_height);

        let bbox = &sample.bounding_box;
        let separation = eye_separation(sample).unwrap_or(0.0);
        let eye_ratio = if bbox.width > 0.0 { separation / bbox.width } else { 0.0 };
        let eyes_visible = eye_ratio > EYE_VISIBILITY_RATIO;

        let score = sample.score.clamp(0.0, 1.0);
        let lighting_score = (score * LIGHTING_GAIN).min(1.0);
        let sharpness_score = if separation > 0.0 {
            (1.0 - (eye_ratio - EXPECTED_EYE_RATIO).abs()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let overall_score = (score + lighting_score + sharpness_score) / 3.0;

        let is_acceptable = overall_score >= self.min_detection_score
            && position.is_size_valid
            && position.is_centered
            && eyes_visible;

        let quality = QualityVerdict {
            overall_score,
            lighting_score,
            sharpness_score,
            eyes_visible,
            mouth_visible: sample.has_mouth(),
            is_acceptable,
        };

        (position, quality)
    }

    fn position(&self, sample: &RawSample, image_width: f64, image_height: f64) -> PositionVerdict {
        let bbox = &sample.bounding_box;
        let image_area = image_width * image_height;
        let size_ratio = if image_area > 0.0 { bbox.area() / image_area } else { 0.0 };

        let size_issue = if size_ratio < self.min_face_size {
            Some(SizeIssue::TooSmall)
        } else if size_ratio > self.max_face_size {
            Some(SizeIssue::TooLarge)
        } else {
            None
        };

        let center = bbox.center();
        let dx = if image_width > 0.0 { (center.x - image_width / 2.0) / image_width } else { 1.0 };
        let dy = if image_height > 0.0 { (center.y - image_height / 2.0) / image_height } else { 1.0 };
        let center_offset = (dx * dx + dy * dy).sqrt();

        PositionVerdict {
            size_ratio,
            center_offset,
            is_size_valid: size_issue.is_none(),
            is_centered: center_offset <= self.max_center_offset,
            size_issue,
        }
    }

    /// Evaluate a whole frame into the tagged detection result
    pub fn evaluate_frame(&self, frame: &FrameSample) -> Detection {
        match frame.faces.as_slice() {
            [] => Detection::NoFace,
            [face] => {
                let (position, quality) =
                    self.evaluate(face, frame.image_width, frame.image_height);
                Detection::Detected {
                    position,
                    quality,
                    pose: estimate_pose(face),
                    sample: face.clone(),
                }
            }
            faces => Detection::MultipleFaces { count: faces.len() },
        }
    }
}

/// Free-function form for callers that hold only a config
pub fn evaluate(
    sample: &RawSample,
    image_width: f64,
    image_height: f64,
    config: &GateConfig,
) -> (PositionVerdict, QualityVerdict) {
    QualityEvaluator::new(config).evaluate(sample, image_width, image_height)
}
