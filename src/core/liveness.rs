//! LivenessSequencer: ordered pose/action challenges over the sample stream
//!
//! Per-challenge states:
//! - AWAITING_NEUTRAL → ARMED: |yaw| < neutral threshold, baseline taken from that sample
//! - ARMED → SUCCEEDED: signed delta from baseline crosses the threshold in the required direction
//! - AWAITING_NEUTRAL | ARMED → FAILED_TIMEOUT: one combined timeout per challenge
//!
//! The first challenge skips the neutral wait and takes its baseline from the
//! first usable sample. Every later challenge waits for neutral so its baseline
//! never inherits the rotation left over from the previous one.

use crate::error::GateError;
use crate::types::{
    ChallengeEvent, ChallengeOutcome, ChallengePhase, ChallengeRun, ChallengeSpec, PoseEstimate,
    SequenceResult,
};

/// What one observation changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequencerUpdate {
    pub events: Vec<ChallengeEvent>,
    /// Set on the observation that finished the sequence
    pub completed: Option<SequenceResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivenessSequencer {
    specs: Vec<ChallengeSpec>,
    neutral_yaw_threshold: f64,
    /// Index of the challenge in `active`, or next to start
    index: usize,
    active: Option<ChallengeRun>,
    completed: Vec<ChallengeRun>,
    result: Option<SequenceResult>,
}

impl LivenessSequencer {
    pub fn new(specs: Vec<ChallengeSpec>, neutral_yaw_threshold: f64) -> Self {
        Self {
            specs,
            neutral_yaw_threshold,
            index: 0,
            active: None,
            completed: Vec::new(),
            result: None,
        }
    }

    /// Feed one sample's pose (`None` when no single face was usable)
    pub fn observe(&mut self, now_ms: u64, pose: Option<PoseEstimate>) -> SequencerUpdate {
        let mut update = SequencerUpdate::default();
        if self.result.is_some() {
            return update;
        }

        let Some(run) = self.active.as_mut() else {
            if self.index == 0 && !self.specs.is_empty() {
                // The first challenge needs no recovery from a previous pose
                self.start_challenge(now_ms, ChallengePhase::Armed, &mut update);
                if let Some(run) = self.active.as_mut() {
                    run.baseline_pose = pose;
                }
            } else {
                self.finish(&mut update);
            }
            return update;
        };

        match run.phase {
            ChallengePhase::AwaitingNeutral => {
                if let Some(pose) = pose {
                    if pose.yaw_degrees.abs() < self.neutral_yaw_threshold {
                        run.baseline_pose = Some(pose);
                        run.phase = ChallengePhase::Armed;
                        tracing::debug!(
                            kind = %run.spec.kind,
                            baseline_yaw = pose.yaw_degrees,
                            "neutral reached, challenge armed"
                        );
                    }
                }
            }
            ChallengePhase::Armed => match (run.baseline_pose, pose) {
                (None, Some(pose)) => run.baseline_pose = Some(pose),
                (Some(baseline), Some(pose)) => {
                    let kind = run.spec.kind;
                    let diff = kind.axis_value(&pose) - kind.axis_value(&baseline);
                    let confidence = (diff.abs() / run.spec.threshold).min(2.0) / 2.0;
                    if run.spec.is_satisfied_by(diff) {
                        run.confidence = confidence;
                        run.phase = ChallengePhase::Succeeded;
                    } else if diff.signum() == expected_sign(&run.spec) {
                        run.confidence = run.confidence.max(confidence);
                    }
                }
                (_, None) => {}
            },
            ChallengePhase::Succeeded | ChallengePhase::FailedTimeout => {}
        }

        if !run.phase.is_terminal() && now_ms.saturating_sub(run.started_at_ms) >= run.spec.timeout_ms {
            run.phase = ChallengePhase::FailedTimeout;
        }

        if run.phase.is_terminal() {
            run.finished_at_ms = Some(now_ms);
            let outcome = if run.phase == ChallengePhase::Succeeded {
                ChallengeOutcome::Succeeded
            } else {
                ChallengeOutcome::TimedOut
            };
            tracing::info!(
                kind = %run.spec.kind,
                ?outcome,
                confidence = run.confidence,
                "challenge finished"
            );
            update.events.push(ChallengeEvent {
                kind: run.spec.kind,
                outcome,
                index: self.index,
            });

            if let Some(done) = self.active.take() {
                self.completed.push(done);
            }
            self.index += 1;

            if self.index < self.specs.len() {
                self.start_challenge(now_ms, ChallengePhase::AwaitingNeutral, &mut update);
            } else {
                self.finish(&mut update);
            }
        }

        update
    }

    fn start_challenge(&mut self, now_ms: u64, phase: ChallengePhase, update: &mut SequencerUpdate) {
        let spec = self.specs[self.index];
        tracing::info!(kind = %spec.kind, index = self.index, "challenge started");
        self.active = Some(ChallengeRun::new(spec, phase, now_ms));
        update.events.push(ChallengeEvent {
            kind: spec.kind,
            outcome: ChallengeOutcome::Started,
            index: self.index,
        });
    }

    fn finish(&mut self, update: &mut SequencerUpdate) {
        let failed_kinds: Vec<_> = self
            .completed
            .iter()
            .filter(|run| run.phase != ChallengePhase::Succeeded)
            .map(|run| run.spec.kind)
            .collect();
        let result = SequenceResult {
            passed: failed_kinds.is_empty() && self.completed.len() == self.specs.len(),
            failed_kinds,
            challenges: self.completed.clone(),
        };
        tracing::info!(passed = result.passed, failed = ?result.failed_kinds, "liveness sequence complete");
        self.result = Some(result.clone());
        update.completed = Some(result);
    }

    /// Challenge currently in progress
    pub fn active(&self) -> Option<&ChallengeRun> {
        self.active.as_ref()
    }

    /// Finished runs, in order; never mutated after being appended
    pub fn completed(&self) -> &[ChallengeRun] {
        &self.completed
    }

    pub fn specs(&self) -> &[ChallengeSpec] {
        &self.specs
    }

    pub fn result(&self) -> Option<&SequenceResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn passed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.passed)
    }

    /// One `ChallengeTimeout` per failed challenge
    pub fn timeout_errors(&self) -> Vec<GateError> {
        self.completed
            .iter()
            .filter(|run| run.phase == ChallengePhase::FailedTimeout)
            .map(|run| GateError::ChallengeTimeout {
                kind: run.spec.kind,
                timeout_ms: run.spec.timeout_ms,
            })
            .collect()
    }

    /// Start over with the same challenges
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.specs), self.neutral_yaw_threshold);
    }
}

fn expected_sign(spec: &ChallengeSpec) -> f64 {
    match spec.kind.direction() {
        crate::types::Direction::Increase => 1.0,
        crate::types::Direction::Decrease => -1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChallengeKind, Direction};

    fn yaw(deg: f64) -> Option<PoseEstimate> {
        Some(PoseEstimate {
            yaw_degrees: deg,
            eye_openness: 0.3,
        })
    }

    fn sequencer(kinds: &[ChallengeKind], timeout_ms: u64) -> LivenessSequencer {
        let specs = kinds
            .iter()
            .map(|&k| {
                let threshold = if k == ChallengeKind::Blink { 0.1 } else { 15.0 };
                ChallengeSpec::new(k, threshold, timeout_ms)
            })
            .collect();
        LivenessSequencer::new(specs, 8.0)
    }

    /// Feed (time, yaw) pairs, return the final result if the sequence finished
    fn run(seq: &mut LivenessSequencer, steps: &[(u64, f64)]) -> Option<SequenceResult> {
        let mut result = None;
        for &(t, deg) in steps {
            if let Some(r) = seq.observe(t, yaw(deg)).completed {
                result = Some(r);
            }
        }
        result
    }

    #[test]
    fn test_first_challenge_baseline_from_first_sample() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight], 5000);
        let update = seq.observe(0, yaw(3.0));
        assert_eq!(update.events[0].outcome, ChallengeOutcome::Started);

        let run = seq.active().unwrap();
        assert_eq!(run.phase, ChallengePhase::Armed);
        assert_eq!(run.baseline_pose.unwrap().yaw_degrees, 3.0);
    }

    #[test]
    fn test_neutral_return_between_turns_passes() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight, ChallengeKind::TurnLeft], 5000);
        let result = run(
            &mut seq,
            &[(0, 0.0), (100, -25.0), (200, -25.0), (300, -25.0), (400, 0.0), (500, 20.0)],
        )
        .expect("sequence should finish");

        assert!(result.passed);
        assert!(result.failed_kinds.is_empty());
        assert_eq!(result.challenges.len(), 2);
        assert!(result
            .challenges
            .iter()
            .all(|c| c.phase == ChallengePhase::Succeeded));
        // Second baseline was recaptured at neutral, not inherited at -25°
        assert_eq!(result.challenges[1].baseline_pose.unwrap().yaw_degrees, 0.0);
    }

    #[test]
    fn test_held_turn_makes_no_progress_on_next_challenge() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight, ChallengeKind::TurnLeft], 5000);
        run(&mut seq, &[(0, 0.0), (100, -25.0)]);
        for t in (200..1000).step_by(100) {
            let update = seq.observe(t, yaw(-25.0));
            assert!(update.events.is_empty());
            let run = seq.active().unwrap();
            assert_eq!(run.phase, ChallengePhase::AwaitingNeutral);
            assert!(run.baseline_pose.is_none());
        }
    }

    #[test]
    fn test_without_neutral_return_second_challenge_times_out() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight, ChallengeKind::TurnLeft], 2000);
        let mut steps = vec![(0, 0.0), (100, -25.0), (200, -25.0)];
        steps.extend((300..=2200).step_by(100).map(|t| (t, 20.0)));
        let result = run(&mut seq, &steps).expect("sequence should finish");

        assert!(!result.passed);
        assert_eq!(result.failed_kinds, vec![ChallengeKind::TurnLeft]);
        assert_eq!(result.challenges[0].phase, ChallengePhase::Succeeded);
        assert_eq!(result.challenges[1].phase, ChallengePhase::FailedTimeout);
        assert!(matches!(
            seq.timeout_errors().as_slice(),
            [GateError::ChallengeTimeout { kind: ChallengeKind::TurnLeft, .. }]
        ));
    }

    #[test]
    fn test_wrong_direction_does_not_succeed() {
        let mut seq = sequencer(&[ChallengeKind::TurnLeft], 1000);
        let result = run(&mut seq, &[(0, 0.0), (100, -30.0), (500, -30.0), (1000, -30.0)]).unwrap();
        assert!(!result.passed);
        assert_eq!(result.failed_kinds, vec![ChallengeKind::TurnLeft]);
    }

    #[test]
    fn test_timeout_continues_with_remaining_challenges() {
        let mut seq = sequencer(&[ChallengeKind::TurnLeft, ChallengeKind::TurnRight], 1000);
        // Left never happens; right is done after returning to neutral
        let result = run(
            &mut seq,
            &[(0, 0.0), (500, 2.0), (1000, 2.0), (1100, 1.0), (1200, -20.0)],
        )
        .unwrap();
        assert!(!result.passed);
        assert_eq!(result.failed_kinds, vec![ChallengeKind::TurnLeft]);
        assert_eq!(result.challenges[1].phase, ChallengePhase::Succeeded);
    }

    #[test]
    fn test_missing_pose_consumes_time_without_progress() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight], 1000);
        seq.observe(0, yaw(0.0));
        assert!(seq.observe(500, None).events.is_empty());
        let update = seq.observe(1000, None);
        assert_eq!(update.events[0].outcome, ChallengeOutcome::TimedOut);
        assert!(update.completed.is_some());
    }

    #[test]
    fn test_blink_uses_eye_openness() {
        let mut seq = sequencer(&[ChallengeKind::Blink], 2000);
        assert_eq!(ChallengeKind::Blink.direction(), Direction::Decrease);
        seq.observe(0, yaw(0.0));
        let closed = Some(PoseEstimate {
            yaw_degrees: 0.0,
            eye_openness: 0.12,
        });
        let update = seq.observe(100, closed);
        assert!(update.completed.unwrap().passed);
    }

    #[test]
    fn test_finished_sequence_ignores_samples() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight], 5000);
        run(&mut seq, &[(0, 0.0), (100, -20.0)]);
        assert!(seq.passed());
        assert_eq!(seq.observe(200, yaw(0.0)), SequencerUpdate::default());
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut seq = sequencer(&[ChallengeKind::TurnRight], 5000);
        run(&mut seq, &[(0, 0.0), (100, -20.0)]);
        seq.reset();
        let once = seq.clone();
        seq.reset();
        assert_eq!(seq, once);
        assert!(!seq.is_finished());
        assert!(seq.completed().is_empty());
        assert_eq!(seq.specs().len(), 1);
    }

    #[test]
    fn test_empty_sequence_passes_immediately() {
        let mut seq = LivenessSequencer::new(Vec::new(), 8.0);
        let update = seq.observe(0, None);
        assert!(update.completed.unwrap().passed);
    }
}
