//! Pose estimation from landmark geometry

use crate::types::{Point, PoseEstimate, RawSample};

/// Distance between the two eye-cluster centroids
pub fn eye_separation(sample: &RawSample) -> Option<f64> {
    let right = Point::centroid(sample.right_eye()?)?;
    let left = Point::centroid(sample.left_eye()?)?;
    Some(right.distance(&left))
}

/// Eye aspect ratio of one 6-point eye cluster
///
/// Points 0 and 3 are the corners; 1, 2 the upper lid; 5, 4 the lower lid.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f64> {
    if eye.len() < 6 {
        return None;
    }
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f64::EPSILON {
        return None;
    }
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    Some(vertical / (2.0 * horizontal))
}

/// Yaw and eye openness, `None` when the landmarks cannot support them
pub fn estimate_pose(sample: &RawSample) -> Option<PoseEstimate> {
    let right_eye = sample.right_eye()?;
    let left_eye = sample.left_eye()?;
    let right = Point::centroid(right_eye)?;
    let left = Point::centroid(left_eye)?;
    let nose = sample.nose_tip()?;

    let separation = right.distance(&left);
    if separation <= f64::EPSILON {
        return None;
    }

    let mid_x = (right.x + left.x) / 2.0;
    let yaw_degrees = (2.0 * (nose.x - mid_x) / separation).atan().to_degrees();

    let eye_openness =
        (eye_aspect_ratio(right_eye)? + eye_aspect_ratio(left_eye)?) / 2.0;

    Some(PoseEstimate {
        yaw_degrees,
        eye_openness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::synthetic::SyntheticFace;

    #[test]
    fn test_frontal_face_has_zero_yaw() {
        let pose = estimate_pose(&SyntheticFace::centered(1.0, 1.0).to_sample()).unwrap();
        assert!(pose.yaw_degrees.abs() < 1e-6);
    }

    #[test]
    fn test_yaw_sign_follows_nose() {
        for yaw in [-30.0, -12.5, 7.0, 25.0] {
            let sample = SyntheticFace::centered(1.0, 1.0).with_yaw(yaw).to_sample();
            let pose = estimate_pose(&sample).unwrap();
            assert!((pose.yaw_degrees - yaw).abs() < 1e-6, "yaw {} → {}", yaw, pose.yaw_degrees);
        }
    }

    #[test]
    fn test_eye_openness_tracks_lids() {
        let open = estimate_pose(&SyntheticFace::centered(1.0, 1.0).to_sample()).unwrap();
        let shut = estimate_pose(
            &SyntheticFace::centered(1.0, 1.0).with_eye_openness(0.05).to_sample(),
        )
        .unwrap();
        assert!(open.eye_openness > shut.eye_openness);
        assert!((shut.eye_openness - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_short_landmark_list_has_no_pose() {
        let mut sample = SyntheticFace::centered(1.0, 1.0).to_sample();
        sample.landmarks.truncate(40);
        assert!(estimate_pose(&sample).is_none());
        assert!(eye_separation(&sample).is_none());
    }
}
