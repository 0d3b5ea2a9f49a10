//! DetectionLoop: the scheduling shell around the per-tick pipeline
//!
//! Each tick runs evaluate → track → liveness → countdown → classify as one
//! synchronous step and produces exactly one state notification. The only
//! suspension points are the sample query and the inter-tick delay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::GateConfig;
use crate::core::countdown::CountdownController;
use crate::core::liveness::LivenessSequencer;
use crate::core::observer::{deliver, DetectionObserver};
use crate::core::quality::QualityEvaluator;
use crate::core::source::SampleSource;
use crate::core::stability::StabilityTracker;
use crate::error::{GateError, Result, SourceError};
use crate::types::{
    CountdownEvent, Detection, DetectionSnapshot, DetectionState, FrameSample, LoopEvent,
    SizeIssue,
};

/// Requests applied by the loop between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Reset,
    CaptureFinished,
    CancelCountdown,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub snapshot: DetectionSnapshot,
    /// State change first, then the tick's other events
    pub events: Vec<LoopEvent>,
}

/// Stop flag plus the gate observers are called under
#[derive(Debug)]
struct LoopSignal {
    stop_tx: watch::Sender<bool>,
    dispatch: Mutex<()>,
    dispatcher: Mutex<Option<ThreadId>>,
}

impl LoopSignal {
    fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            dispatch: Mutex::new(()),
            dispatcher: Mutex::new(None),
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// After this returns no observer call is in progress on another thread
    /// and none will start.
    fn stop(&self) {
        self.stop_tx.send_replace(true);
        let inside_tick = *lock(&self.dispatcher) == Some(std::thread::current().id());
        if !inside_tick {
            drop(lock(&self.dispatch));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clone-safe handle for controlling a running loop
#[derive(Debug, Clone)]
pub struct LoopHandle {
    signal: Arc<LoopSignal>,
    commands: mpsc::UnboundedSender<LoopCommand>,
    snapshot: watch::Receiver<DetectionSnapshot>,
}

impl LoopHandle {
    /// Stop the loop; safe from inside an observer and idempotent
    pub fn stop(&self) {
        self.signal.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Clear tracking, countdown and liveness progress before the next tick
    pub fn reset(&self) {
        self.send(LoopCommand::Reset);
    }

    /// Caller finished the capture triggered by `on_capture_ready`
    pub fn capture_finished(&self) {
        self.send(LoopCommand::CaptureFinished);
    }

    pub fn cancel_countdown(&self) {
        self.send(LoopCommand::CancelCountdown);
    }

    /// Latest full result, for polling consumers
    pub fn current_detection(&self) -> DetectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that changes once per tick
    pub fn subscribe(&self) -> watch::Receiver<DetectionSnapshot> {
        self.snapshot.clone()
    }

    fn send(&self, command: LoopCommand) {
        if self.commands.send(command).is_err() {
            debug!(?command, "loop gone, command dropped");
        }
    }
}

/// Owns all mutable detection state; nothing outside a tick mutates it
#[derive(Debug)]
pub struct DetectionLoop {
    config: GateConfig,
    evaluator: QualityEvaluator,
    tracker: StabilityTracker,
    countdown: CountdownController,
    sequencer: Option<LivenessSequencer>,
    capture_in_flight: bool,
    tick: u64,
    snapshot: DetectionSnapshot,
    /// Source time of the last frame and when it arrived
    last_sample: Option<(u64, Instant)>,
    signal: Arc<LoopSignal>,
    snapshot_tx: watch::Sender<DetectionSnapshot>,
    commands_tx: mpsc::UnboundedSender<LoopCommand>,
    commands_rx: mpsc::UnboundedReceiver<LoopCommand>,
}

impl DetectionLoop {
    /// Validate config and build the loop; fails before anything can start
    pub fn new(config: GateConfig) -> Result<Self> {
        config.validate()?;

        let specs = config.challenge_specs();
        let sequencer = (!specs.is_empty())
            .then(|| LivenessSequencer::new(specs, config.neutral_yaw_threshold));
        let snapshot = DetectionSnapshot::initializing();
        let (snapshot_tx, _) = watch::channel(snapshot.clone());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Ok(Self {
            evaluator: QualityEvaluator::new(&config),
            tracker: StabilityTracker::new(),
            countdown: CountdownController::new(config.stability_time_ms, config.countdown_seconds),
            sequencer,
            capture_in_flight: false,
            tick: 0,
            snapshot,
            last_sample: None,
            signal: Arc::new(LoopSignal::new()),
            snapshot_tx,
            commands_tx,
            commands_rx,
            config,
        })
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            signal: Arc::clone(&self.signal),
            commands: self.commands_tx.clone(),
            snapshot: self.snapshot_tx.subscribe(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn state(&self) -> DetectionState {
        self.snapshot.state
    }

    pub fn current_detection(&self) -> &DetectionSnapshot {
        &self.snapshot
    }

    pub fn sequencer(&self) -> Option<&LivenessSequencer> {
        self.sequencer.as_ref()
    }

    pub fn is_capture_in_flight(&self) -> bool {
        self.capture_in_flight
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Idempotent
    pub fn stop(&self) {
        self.signal.stop();
    }

    /// Clear an earlier stop so `run` can drive ticks again
    pub fn start(&self) {
        if self.signal.stop_tx.send_replace(false) {
            info!("detection loop restarted");
        }
    }

    /// Back to the post-start state; idempotent
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.countdown.reset();
        if let Some(seq) = self.sequencer.as_mut() {
            seq.reset();
        }
        self.capture_in_flight = false;
        self.tick = 0;
        self.snapshot = DetectionSnapshot::initializing();
        self.snapshot_tx.send_replace(self.snapshot.clone());
        info!("detection loop reset");
    }

    /// Capture done; a fresh ready streak is needed for the next one
    pub fn capture_finished(&mut self) {
        if self.capture_in_flight {
            info!("capture finished");
        }
        self.capture_in_flight = false;
        self.countdown.reset();
        self.tracker.reset();
    }

    /// Caller-initiated abort; the subject must earn stability again
    pub fn cancel_countdown(&mut self) -> Option<CountdownEvent> {
        let event = self.countdown.cancel();
        if event.is_some() {
            self.tracker.reset();
        }
        event
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                LoopCommand::Reset => self.reset(),
                LoopCommand::CaptureFinished => self.capture_finished(),
                LoopCommand::CancelCountdown => {
                    self.cancel_countdown();
                }
            }
        }
    }

    /// One tick: the whole pipeline for one frame, no I/O
    pub fn process(&mut self, frame: &FrameSample) -> TickOutput {
        let now_ms = frame.timestamp_ms;
        self.tick += 1;
        self.last_sample = Some((now_ms, Instant::now()));

        let detection = self.evaluator.evaluate_frame(frame);
        let acceptable = detection.is_acceptable();
        let stable_ms = self.tracker.update(now_ms, acceptable);

        let mut events = Vec::new();

        if let Some(seq) = self.sequencer.as_mut() {
            let update = seq.observe(now_ms, detection.pose());
            events.extend(update.events.into_iter().map(LoopEvent::Challenge));
            if let Some(result) = update.completed {
                events.push(LoopEvent::SequenceComplete(result));
            }
        }

        let liveness_ok = self.sequencer.as_ref().map_or(true, |s| s.passed());
        if liveness_ok && !self.capture_in_flight {
            if let Some(event) = self.countdown.update(now_ms, stable_ms, acceptable) {
                events.push(LoopEvent::Countdown(event));
                if event == CountdownEvent::Complete {
                    self.capture_in_flight = true;
                    events.push(LoopEvent::CaptureReady);
                }
            }
        }

        let state = classify(&detection, self.countdown.is_counting(), self.capture_in_flight);
        if state != self.snapshot.state {
            info!(from = %self.snapshot.state, to = %state, at_ms = now_ms, "state transition");
        }
        debug!(tick = self.tick, %state, stable_ms, "tick");

        self.snapshot = DetectionSnapshot {
            timestamp: chrono::Utc::now(),
            tick: self.tick,
            sample_time_ms: now_ms,
            state,
            detection,
            stable_ms,
            countdown_remaining: self.countdown.remaining(),
            active_challenge: self.sequencer.as_ref().and_then(|s| s.active().cloned()),
            challenges_completed: self.sequencer.as_ref().map_or(0, |s| s.completed().len()),
            liveness_failed: self.sequencer.as_ref().is_some_and(|s| s.is_finished() && !s.passed()),
        };
        self.snapshot_tx.send_replace(self.snapshot.clone());

        events.insert(0, LoopEvent::StateChange(self.snapshot.clone()));
        TickOutput {
            snapshot: self.snapshot.clone(),
            events,
        }
    }

    /// Deliver one tick's events; returns false once stopped
    fn dispatch<O: DetectionObserver + ?Sized>(&self, events: &[LoopEvent], observer: &mut O) -> bool {
        let _gate = lock(&self.signal.dispatch);
        *lock(&self.signal.dispatcher) = Some(std::thread::current().id());
        for event in events {
            if self.signal.is_stopped() {
                break;
            }
            deliver(observer, event);
        }
        *lock(&self.signal.dispatcher) = None;
        !self.signal.is_stopped()
    }

    /// Source time to stamp a tick that produced no frame
    fn synthetic_now(&self) -> u64 {
        match self.last_sample {
            Some((ms, at)) => ms + at.elapsed().as_millis() as u64,
            None => 0,
        }
    }

    /// Drive ticks until stopped, the source closes or the model fails
    ///
    /// Returns at once if `stop()` was already called; `start()` clears it.
    pub async fn run<S, O>(&mut self, source: &mut S, observer: &mut O) -> Result<()>
    where
        S: SampleSource,
        O: DetectionObserver + ?Sized,
    {
        let mut stop_rx = self.signal.stop_tx.subscribe();
        let interval = self.config.tick_interval();
        let sample_timeout = std::time::Duration::from_millis(self.config.sample_timeout_ms);
        info!(
            interval_ms = interval.as_millis() as u64,
            challenges = self.config.challenges.len(),
            "detection loop started"
        );

        loop {
            self.apply_commands();
            if self.signal.is_stopped() {
                break;
            }

            let queried = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                r = tokio::time::timeout(sample_timeout, source.next_sample()) => r,
            };

            let frame = match queried {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) | Ok(Err(SourceError::Timeout)) => self.empty_frame(),
                Err(_) => {
                    debug!(error = %GateError::SampleTimeout(self.config.sample_timeout_ms), "treating as no face");
                    self.empty_frame()
                }
                Ok(Err(SourceError::Transient(msg))) => {
                    warn!(error = %msg, "transient sample failure, treating as no face");
                    self.empty_frame()
                }
                Ok(Err(SourceError::Closed)) => {
                    info!("sample source closed");
                    break;
                }
                Ok(Err(SourceError::Unavailable(msg))) => {
                    error!(error = %msg, "detection model unavailable, stopping loop");
                    self.fail(observer);
                    return Err(GateError::ModelUnavailable(msg));
                }
            };

            self.apply_commands();
            let output = self.process(&frame);
            if !self.dispatch(&output.events, observer) {
                break;
            }

            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(ticks = self.tick, "detection loop stopped");
        Ok(())
    }

    fn empty_frame(&self) -> FrameSample {
        FrameSample::empty(self.synthetic_now(), 1.0, 1.0)
    }

    /// Enter the error state, notify once, stop
    fn fail<O: DetectionObserver + ?Sized>(&mut self, observer: &mut O) {
        self.countdown.cancel();
        self.snapshot = DetectionSnapshot {
            timestamp: chrono::Utc::now(),
            state: DetectionState::Error,
            detection: Detection::NoFace,
            stable_ms: 0,
            countdown_remaining: None,
            ..self.snapshot.clone()
        };
        self.snapshot_tx.send_replace(self.snapshot.clone());
        self.dispatch(&[LoopEvent::StateChange(self.snapshot.clone())], observer);
        self.signal.stop();
    }
}

/// Resolves once the stop flag is set
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Priority order, first match wins
fn classify(detection: &Detection, counting: bool, capture_in_flight: bool) -> DetectionState {
    match detection {
        Detection::NoFace => DetectionState::NoFace,
        Detection::MultipleFaces { .. } => DetectionState::MultipleFaces,
        Detection::Detected { position, quality, .. } => match position.size_issue {
            Some(SizeIssue::TooSmall) => DetectionState::FaceTooSmall,
            Some(SizeIssue::TooLarge) => DetectionState::FaceTooLarge,
            None if !position.is_centered => DetectionState::FaceNotCentered,
            None if !quality.is_acceptable => DetectionState::PoorLighting,
            None if counting => DetectionState::Countdown,
            None if capture_in_flight => DetectionState::Capturing,
            None => DetectionState::Ready,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::synthetic::SyntheticFace;
    use crate::types::BoundingBox;

    fn config() -> GateConfig {
        GateConfig {
            stability_time_ms: 500,
            countdown_seconds: 3,
            ..Default::default()
        }
    }

    fn good(t: u64) -> FrameSample {
        SyntheticFace::centered(1.0, 1.0).frame(t, 1.0, 1.0)
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let err = DetectionLoop::new(GateConfig {
            max_center_offset: 2.0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, GateError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_starts_initializing() {
        let dl = DetectionLoop::new(config()).unwrap();
        assert_eq!(dl.state(), DetectionState::Initializing);
        assert_eq!(dl.handle().current_detection().state, DetectionState::Initializing);
    }

    #[test]
    fn test_priority_order() {
        let mut dl = DetectionLoop::new(config()).unwrap();
        let face = SyntheticFace::centered(1.0, 1.0);

        assert_eq!(dl.process(&FrameSample::empty(0, 1.0, 1.0)).snapshot.state, DetectionState::NoFace);

        let two = FrameSample::new(1, 1.0, 1.0, vec![face.to_sample(), face.to_sample()]);
        assert_eq!(dl.process(&two).snapshot.state, DetectionState::MultipleFaces);

        let tiny = SyntheticFace::new(BoundingBox::new(0.0, 0.0, 0.1, 0.1)).frame(2, 1.0, 1.0);
        assert_eq!(dl.process(&tiny).snapshot.state, DetectionState::FaceTooSmall);

        let huge = SyntheticFace::new(BoundingBox::new(0.0, 0.0, 1.0, 0.9)).frame(3, 1.0, 1.0);
        assert_eq!(dl.process(&huge).snapshot.state, DetectionState::FaceTooLarge);

        let off = SyntheticFace::new(BoundingBox::new(0.55, 0.1, 0.4, 0.5)).frame(4, 1.0, 1.0);
        assert_eq!(dl.process(&off).snapshot.state, DetectionState::FaceNotCentered);

        let dim = face.with_score(0.2).frame(5, 1.0, 1.0);
        assert_eq!(dl.process(&dim).snapshot.state, DetectionState::PoorLighting);

        assert_eq!(dl.process(&good(6)).snapshot.state, DetectionState::Ready);
    }

    #[test]
    fn test_one_state_change_per_tick() {
        let mut dl = DetectionLoop::new(config()).unwrap();
        for t in (0..5000).step_by(100) {
            let out = dl.process(&good(t));
            let state_changes = out
                .events
                .iter()
                .filter(|e| matches!(e, LoopEvent::StateChange(_)))
                .count();
            assert_eq!(state_changes, 1);
            assert!(matches!(out.events[0], LoopEvent::StateChange(_)));
        }
    }

    #[test]
    fn test_capture_finished_requires_new_streak() {
        let mut dl = DetectionLoop::new(config()).unwrap();
        for t in (0..=3500).step_by(100) {
            dl.process(&good(t));
        }
        assert_eq!(dl.state(), DetectionState::Capturing);

        dl.capture_finished();
        assert_eq!(dl.process(&good(3600)).snapshot.state, DetectionState::Ready);
        assert_eq!(dl.process(&good(4100)).snapshot.state, DetectionState::Countdown);
    }

    #[test]
    fn test_cancel_countdown_restarts_from_scratch() {
        let mut dl = DetectionLoop::new(config()).unwrap();
        for t in (0..=1000).step_by(100) {
            dl.process(&good(t));
        }
        assert_eq!(dl.state(), DetectionState::Countdown);
        assert_eq!(dl.cancel_countdown(), Some(CountdownEvent::Cancelled));
        assert_eq!(dl.cancel_countdown(), None);
        assert_eq!(dl.process(&good(1100)).snapshot.state, DetectionState::Ready);
    }

    #[test]
    fn test_liveness_gates_countdown() {
        let mut dl = DetectionLoop::new(GateConfig {
            challenges: vec![crate::types::ChallengeKind::TurnRight],
            ..config()
        })
        .unwrap();
        let face = SyntheticFace::centered(1.0, 1.0);

        for t in (0..=2000).step_by(100) {
            let out = dl.process(&face.frame(t, 1.0, 1.0));
            assert_ne!(out.snapshot.state, DetectionState::Countdown);
        }
        // Turn right, then come back
        dl.process(&face.with_yaw(-25.0).frame(2100, 1.0, 1.0));
        assert!(dl.sequencer().unwrap().passed());
        let out = dl.process(&face.frame(2200, 1.0, 1.0));
        assert_eq!(out.snapshot.state, DetectionState::Countdown);
    }

    #[test]
    fn test_reset_twice_matches_once() {
        let mut dl = DetectionLoop::new(config()).unwrap();
        for t in (0..=1000).step_by(100) {
            dl.process(&good(t));
        }
        dl.reset();
        let first = dl.current_detection().clone();
        dl.reset();
        let second = dl.current_detection().clone();

        assert_eq!(first.state, DetectionState::Initializing);
        assert_eq!(
            (first.state, first.tick, first.stable_ms, first.countdown_remaining),
            (second.state, second.tick, second.stable_ms, second.countdown_remaining)
        );
        assert!(!dl.countdown.is_counting());
        assert_eq!(dl.tracker, StabilityTracker::new());
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let dl = DetectionLoop::new(config()).unwrap();
        dl.stop();
        dl.stop();
        assert!(dl.is_stopped());
        assert!(dl.handle().is_stopped());
    }
}
