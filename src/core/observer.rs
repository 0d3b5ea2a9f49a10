//! Observers receiving the per-tick notifications

use tokio::sync::broadcast;

use crate::types::{ChallengeEvent, CountdownEvent, DetectionSnapshot, LoopEvent, SequenceResult};

/// Receives notifications from the detection loop
///
/// Calls for one tick arrive in a fixed order: state change first, then
/// countdown, challenge, sequence and capture events. Only
/// `on_state_change` is called on every tick.
pub trait DetectionObserver: Send {
    fn on_state_change(&mut self, snapshot: &DetectionSnapshot);

    fn on_countdown(&mut self, _event: CountdownEvent) {}

    fn on_challenge_event(&mut self, _event: &ChallengeEvent) {}

    fn on_sequence_complete(&mut self, _result: &SequenceResult) {}

    /// Fires once per completed countdown
    fn on_capture_ready(&mut self) {}
}

/// Route one event to the matching callback
pub fn deliver<O: DetectionObserver + ?Sized>(observer: &mut O, event: &LoopEvent) {
    match event {
        LoopEvent::StateChange(snapshot) => observer.on_state_change(snapshot),
        LoopEvent::Countdown(e) => observer.on_countdown(*e),
        LoopEvent::Challenge(e) => observer.on_challenge_event(e),
        LoopEvent::SequenceComplete(r) => observer.on_sequence_complete(r),
        LoopEvent::CaptureReady => observer.on_capture_ready(),
    }
}

/// Records every event, in order
impl DetectionObserver for Vec<LoopEvent> {
    fn on_state_change(&mut self, snapshot: &DetectionSnapshot) {
        self.push(LoopEvent::StateChange(snapshot.clone()));
    }

    fn on_countdown(&mut self, event: CountdownEvent) {
        self.push(LoopEvent::Countdown(event));
    }

    fn on_challenge_event(&mut self, event: &ChallengeEvent) {
        self.push(LoopEvent::Challenge(*event));
    }

    fn on_sequence_complete(&mut self, result: &SequenceResult) {
        self.push(LoopEvent::SequenceComplete(result.clone()));
    }

    fn on_capture_ready(&mut self) {
        self.push(LoopEvent::CaptureReady);
    }
}

/// Forwards events to any number of subscribers (WebSocket clients)
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<LoopEvent>,
}

impl BroadcastObserver {
    pub fn new(tx: broadcast::Sender<LoopEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: LoopEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl DetectionObserver for BroadcastObserver {
    fn on_state_change(&mut self, snapshot: &DetectionSnapshot) {
        self.send(LoopEvent::StateChange(snapshot.clone()));
    }

    fn on_countdown(&mut self, event: CountdownEvent) {
        self.send(LoopEvent::Countdown(event));
    }

    fn on_challenge_event(&mut self, event: &ChallengeEvent) {
        self.send(LoopEvent::Challenge(*event));
    }

    fn on_sequence_complete(&mut self, result: &SequenceResult) {
        self.send(LoopEvent::SequenceComplete(result.clone()));
    }

    fn on_capture_ready(&mut self) {
        self.send(LoopEvent::CaptureReady);
    }
}
