//! Synthetic 68-point faces for simulation and tests
//!
//! Geometry is chosen so that `estimate_pose` recovers the requested yaw and
//! eye openness exactly.

use crate::types::{BoundingBox, FrameSample, Point, RawSample, LANDMARK_COUNT};
use crate::EXPECTED_EYE_RATIO;

/// Half-width of an eye as a fraction of box width
const EYE_HALF_WIDTH: f64 = 0.06;

/// Parameters of a generated face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFace {
    pub bounding_box: BoundingBox,
    pub yaw_degrees: f64,
    pub eye_openness: f64,
    pub score: f64,
}

impl SyntheticFace {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            yaw_degrees: 0.0,
            eye_openness: 0.3,
            score: 0.95,
        }
    }

    /// Frontal face covering 20% of the image, dead center
    pub fn centered(image_width: f64, image_height: f64) -> Self {
        let width = image_width * 0.4;
        let height = image_height * 0.5;
        Self::new(BoundingBox::new(
            (image_width - width) / 2.0,
            (image_height - height) / 2.0,
            width,
            height,
        ))
    }

    pub fn with_yaw(mut self, yaw_degrees: f64) -> Self {
        self.yaw_degrees = yaw_degrees;
        self
    }

    pub fn with_eye_openness(mut self, eye_openness: f64) -> Self {
        self.eye_openness = eye_openness;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn to_sample(&self) -> RawSample {
        let b = self.bounding_box;
        let cx = b.x + b.width / 2.0;
        let eye_y = b.y + 0.4 * b.height;
        let half_sep = EXPECTED_EYE_RATIO * b.width / 2.0;

        let mut landmarks = Vec::with_capacity(LANDMARK_COUNT);

        // 0..=16 jaw line
        for i in 0..17 {
            let t = i as f64 / 16.0;
            let angle = std::f64::consts::PI * t;
            landmarks.push(Point::new(
                b.x + b.width * t,
                b.y + 0.5 * b.height + 0.45 * b.height * angle.sin(),
            ));
        }
        // 17..=26 brows
        for i in 0..10 {
            let t = i as f64 / 9.0;
            landmarks.push(Point::new(b.x + b.width * (0.2 + 0.6 * t), b.y + 0.3 * b.height));
        }
        // 27..=35 nose bridge and base; 30 is the tip
        let nose_x = cx + self.yaw_degrees.to_radians().tan() * half_sep;
        for i in 0..9 {
            let y = b.y + (0.42 + 0.03 * i as f64) * b.height;
            let x = if i == 3 { nose_x } else { cx + (i as f64 - 4.0) * 0.01 * b.width };
            landmarks.push(Point::new(x, y));
        }
        // 36..=41 right eye, 42..=47 left eye
        landmarks.extend(self.eye(cx - half_sep, eye_y));
        landmarks.extend(self.eye(cx + half_sep, eye_y));
        // 48..=67 mouth
        for i in 0..20 {
            let angle = std::f64::consts::TAU * i as f64 / 20.0;
            landmarks.push(Point::new(
                cx + 0.15 * b.width * angle.cos(),
                b.y + 0.78 * b.height + 0.04 * b.height * angle.sin(),
            ));
        }

        RawSample {
            bounding_box: b,
            landmarks,
            score: self.score,
        }
    }

    fn eye(&self, ex: f64, ey: f64) -> [Point; 6] {
        let w = self.bounding_box.width;
        let half = EYE_HALF_WIDTH * w;
        let lid = self.eye_openness * half;
        let inner = half / 3.0;
        [
            Point::new(ex - half, ey),
            Point::new(ex - inner, ey - lid),
            Point::new(ex + inner, ey - lid),
            Point::new(ex + half, ey),
            Point::new(ex + inner, ey + lid),
            Point::new(ex - inner, ey + lid),
        ]
    }

    /// Single-face frame at the given time
    pub fn frame(&self, timestamp_ms: u64, image_width: f64, image_height: f64) -> FrameSample {
        FrameSample::new(timestamp_ms, image_width, image_height, vec![self.to_sample()])
    }
}
