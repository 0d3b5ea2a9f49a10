//! Core types for Facegate

mod challenge;
mod output;
mod sample;
mod state;
mod verdict;

pub use challenge::{
    ChallengeEvent, ChallengeKind, ChallengeOutcome, ChallengePhase, ChallengeRun, ChallengeSpec,
    Direction, SequenceResult,
};
pub use output::{CountdownEvent, DetectionSnapshot, LoopEvent};
pub use sample::{
    BoundingBox, FrameSample, Point, RawSample, EYE_POINTS, LANDMARK_COUNT, LEFT_EYE_START,
    MOUTH_START, NOSE_TIP, RIGHT_EYE_START,
};
pub use state::DetectionState;
pub use verdict::{Detection, PoseEstimate, PositionVerdict, QualityVerdict, SizeIssue};
