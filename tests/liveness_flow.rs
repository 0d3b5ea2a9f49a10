//! Integration tests for active liveness
//!
//! Tests challenge sequencing through the detection loop, including the
//! neutral-pose gate between consecutive turns

use facegate::core::{DetectionLoop, ScriptedSource, SyntheticFace};
use facegate::types::{
    ChallengeEvent, ChallengeKind, ChallengeOutcome, ChallengePhase, DetectionState, FrameSample,
    LoopEvent, SequenceResult,
};
use facegate::{GateConfig, GateError};
use pretty_assertions::assert_eq;

const W: f64 = 640.0;
const H: f64 = 480.0;

fn config(challenges: Vec<ChallengeKind>) -> GateConfig {
    GateConfig {
        stability_time_ms: 500,
        countdown_seconds: 3,
        liveness_timeout_ms: 8000,
        challenges,
        ..Default::default()
    }
}

fn face(yaw: f64) -> SyntheticFace {
    SyntheticFace::centered(W, H).with_yaw(yaw)
}

/// Frames every 100ms, one (yaw, count) segment after another
fn script(segments: &[(f64, usize)]) -> Vec<FrameSample> {
    let mut frames = Vec::new();
    let mut t = 0;
    for &(yaw, count) in segments {
        for _ in 0..count {
            frames.push(face(yaw).frame(t, W, H));
            t += 100;
        }
    }
    frames
}

fn drive(dl: &mut DetectionLoop, frames: &[FrameSample]) -> Vec<LoopEvent> {
    frames.iter().flat_map(|f| dl.process(f).events).collect()
}

fn challenge_events(events: &[LoopEvent]) -> Vec<ChallengeEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Challenge(c) => Some(*c),
            _ => None,
        })
        .collect()
}

fn sequence_result(events: &[LoopEvent]) -> Option<SequenceResult> {
    events.iter().find_map(|e| match e {
        LoopEvent::SequenceComplete(r) => Some(r.clone()),
        _ => None,
    })
}

fn event(kind: ChallengeKind, outcome: ChallengeOutcome, index: usize) -> ChallengeEvent {
    ChallengeEvent { kind, outcome, index }
}

#[test]
fn test_turn_right_then_left_with_neutral_return_passes() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft])).unwrap();
    let frames = script(&[(0.0, 10), (-25.0, 1), (0.0, 1), (25.0, 1), (0.0, 40)]);

    let events = drive(&mut dl, &frames);

    assert_eq!(
        challenge_events(&events),
        vec![
            event(ChallengeKind::TurnRight, ChallengeOutcome::Started, 0),
            event(ChallengeKind::TurnRight, ChallengeOutcome::Succeeded, 0),
            event(ChallengeKind::TurnLeft, ChallengeOutcome::Started, 1),
            event(ChallengeKind::TurnLeft, ChallengeOutcome::Succeeded, 1),
        ]
    );
    let result = sequence_result(&events).unwrap();
    assert!(result.passed);
    assert!(result.failed_kinds.is_empty());

    // Second baseline was taken at neutral, not at the right-turn pose
    let left = &result.challenges[1];
    assert_eq!(left.phase, ChallengePhase::Succeeded);
    assert!(left.baseline_pose.unwrap().yaw_degrees.abs() < 8.0);

    let captures = events.iter().filter(|e| **e == LoopEvent::CaptureReady).count();
    assert_eq!(captures, 1);
}

#[test]
fn test_swinging_straight_across_does_not_pass_second_turn() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft])).unwrap();
    // Right turn, then directly to a left turn and held there
    let frames = script(&[(0.0, 10), (-25.0, 1), (25.0, 85)]);

    let events = drive(&mut dl, &frames);

    let result = sequence_result(&events).unwrap();
    assert!(!result.passed);
    assert_eq!(result.failed_kinds, vec![ChallengeKind::TurnLeft]);
    assert_eq!(result.challenges[1].phase, ChallengePhase::FailedTimeout);
    assert!(result.challenges[1].baseline_pose.is_none());
    assert!(challenge_events(&events)
        .contains(&event(ChallengeKind::TurnLeft, ChallengeOutcome::TimedOut, 1)));
}

#[test]
fn test_no_countdown_until_liveness_passes() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft])).unwrap();
    let frames = script(&[(0.0, 30), (-25.0, 30)]);

    for frame in &frames {
        let out = dl.process(frame);
        assert_ne!(out.snapshot.state, DetectionState::Countdown);
        assert!(!out.events.contains(&LoopEvent::CaptureReady));
    }
    assert!(!dl.sequencer().unwrap().is_finished());
}

#[test]
fn test_timeout_is_reported_and_sequence_continues() {
    let mut dl = DetectionLoop::new(config(vec![
        ChallengeKind::TurnLeft,
        ChallengeKind::TurnRight,
    ]))
    .unwrap();
    // Never turns left; recenters and turns right after the first timeout
    let frames = script(&[(0.0, 82), (-25.0, 2), (0.0, 5)]);

    let events = drive(&mut dl, &frames);

    let seq = dl.sequencer().unwrap();
    let result = seq.result().unwrap();
    assert!(!result.passed);
    assert_eq!(result.failed_kinds, vec![ChallengeKind::TurnLeft]);
    assert_eq!(result.challenges[1].phase, ChallengePhase::Succeeded);

    let errors = seq.timeout_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        GateError::ChallengeTimeout { kind: ChallengeKind::TurnLeft, timeout_ms: 8000 }
    ));

    // A failed sequence never unlocks capture
    assert!(!events.contains(&LoopEvent::CaptureReady));
}

#[test]
fn test_failed_sequence_is_visible_in_snapshot() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnLeft])).unwrap();

    let out = dl.process(&face(0.0).frame(0, W, H));
    assert!(!out.snapshot.liveness_failed);

    drive(&mut dl, &script(&[(0.0, 81)])[1..]);
    let out = dl.process(&face(0.0).frame(8100, W, H));
    assert!(dl.sequencer().unwrap().is_finished());
    assert!(out.snapshot.liveness_failed);
    assert_eq!(out.snapshot.state, DetectionState::Ready);
    assert!(out.snapshot.to_parseable_string().contains("liveness=failed"));

    dl.reset();
    assert!(!dl.current_detection().liveness_failed);
}

#[test]
fn test_passed_sequence_is_not_flagged() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight])).unwrap();
    let events = drive(&mut dl, &script(&[(0.0, 3), (-25.0, 1)]));

    assert!(sequence_result(&events).unwrap().passed);
    assert!(!dl.current_detection().liveness_failed);
}

#[test]
fn test_blink_challenge() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::Blink])).unwrap();
    let open = SyntheticFace::centered(W, H);
    let closed = open.with_eye_openness(0.05);

    let mut events = Vec::new();
    events.extend(dl.process(&open.frame(0, W, H)).events);
    events.extend(dl.process(&open.frame(100, W, H)).events);
    events.extend(dl.process(&closed.frame(200, W, H)).events);

    let result = sequence_result(&events).unwrap();
    assert!(result.passed);
    assert!(result.challenges[0].confidence > 0.5);
}

#[test]
fn test_reset_restarts_sequence() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight])).unwrap();
    drive(&mut dl, &script(&[(0.0, 3), (-25.0, 1)]));
    assert!(dl.sequencer().unwrap().passed());

    dl.reset();

    let seq = dl.sequencer().unwrap();
    assert!(!seq.is_finished());
    assert!(seq.completed().is_empty());
    assert!(seq.active().is_none());
    assert_eq!(dl.state(), DetectionState::Initializing);
}

#[test]
fn test_snapshot_reports_active_challenge() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft])).unwrap();
    let out = dl.process(&face(0.0).frame(0, W, H));

    let active = out.snapshot.active_challenge.unwrap();
    assert_eq!(active.spec.kind, ChallengeKind::TurnRight);
    assert_eq!(active.phase, ChallengePhase::Armed);
    assert_eq!(out.snapshot.challenges_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_through_run() {
    let mut dl = DetectionLoop::new(config(vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft])).unwrap();
    let mut source = ScriptedSource::new(script(&[(0.0, 5), (-25.0, 2), (0.0, 2), (25.0, 2), (0.0, 40)]));
    let mut observer: Vec<LoopEvent> = Vec::new();

    dl.run(&mut source, &mut observer).await.unwrap();

    assert!(sequence_result(&observer).unwrap().passed);
    assert!(observer.contains(&LoopEvent::CaptureReady));
}
