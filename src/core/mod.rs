//! Core modules for Facegate

pub mod api;
pub mod countdown;
pub mod detection_loop;
pub mod liveness;
pub mod observer;
pub mod pose;
pub mod quality;
pub mod source;
pub mod stability;
pub mod synthetic;

pub use api::{create_router, run_server};
pub use countdown::{CountdownController, CountdownPhase};
pub use detection_loop::{DetectionLoop, LoopCommand, LoopHandle, TickOutput};
pub use liveness::{LivenessSequencer, SequencerUpdate};
pub use observer::{BroadcastObserver, DetectionObserver};
pub use pose::estimate_pose;
pub use quality::{evaluate, QualityEvaluator};
pub use source::{ChannelSource, SampleSource, ScriptedSource};
pub use stability::StabilityTracker;
pub use synthetic::SyntheticFace;
