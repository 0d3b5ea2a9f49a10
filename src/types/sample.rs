//! Raw detector output for a single frame

use serde::{Deserialize, Serialize};

/// First landmark of the right-eye cluster (68-point iBUG layout)
pub const RIGHT_EYE_START: usize = 36;
/// First landmark of the left-eye cluster
pub const LEFT_EYE_START: usize = 42;
/// Points per eye cluster
pub const EYE_POINTS: usize = 6;
/// Nose tip
pub const NOSE_TIP: usize = 30;
/// First landmark of the mouth cluster
pub const MOUTH_START: usize = 48;
/// Full landmark count
pub const LANDMARK_COUNT: usize = 68;

/// 2D point in image units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Arithmetic mean of a point group, `None` when empty
    pub fn centroid(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

/// Face bounding box, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One detected face: box, landmarks and detector confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub bounding_box: BoundingBox,
    /// Ordered landmark points, 68-point layout
    pub landmarks: Vec<Point>,
    /// Detector confidence 0.0-1.0
    pub score: f64,
}

impl RawSample {
    /// Landmarks of the right-eye cluster, if present
    pub fn right_eye(&self) -> Option<&[Point]> {
        self.landmarks
            .get(RIGHT_EYE_START..RIGHT_EYE_START + EYE_POINTS)
    }

    /// Landmarks of the left-eye cluster, if present
    pub fn left_eye(&self) -> Option<&[Point]> {
        self.landmarks.get(LEFT_EYE_START..LEFT_EYE_START + EYE_POINTS)
    }

    pub fn nose_tip(&self) -> Option<Point> {
        self.landmarks.get(NOSE_TIP).copied()
    }

    pub fn has_mouth(&self) -> bool {
        self.landmarks.len() >= LANDMARK_COUNT
    }
}

/// Everything the detector reported for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// Capture time on the source's monotonic clock (milliseconds)
    pub timestamp_ms: u64,
    pub image_width: f64,
    pub image_height: f64,
    /// Zero, one or several candidate faces
    pub faces: Vec<RawSample>,
}

impl FrameSample {
    pub fn new(timestamp_ms: u64, image_width: f64, image_height: f64, faces: Vec<RawSample>) -> Self {
        Self {
            timestamp_ms,
            image_width,
            image_height,
            faces,
        }
    }

    /// Frame with no detection
    pub fn empty(timestamp_ms: u64, image_width: f64, image_height: f64) -> Self {
        Self::new(timestamp_ms, image_width, image_height, Vec::new())
    }
}
