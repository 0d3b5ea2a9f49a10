//! Sample sources: the boundary to the external detection model

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::SourceError;
use crate::types::FrameSample;

/// One query to the detection model per call
///
/// `Ok(None)` means nothing arrived for this query and is treated as a
/// no-face sample.
pub trait SampleSource: Send {
    fn next_sample(
        &mut self,
    ) -> impl Future<Output = Result<Option<FrameSample>, SourceError>> + Send;
}

/// Replays a fixed list of results, then reports `Closed`
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: VecDeque<Result<Option<FrameSample>, SourceError>>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = FrameSample>) -> Self {
        Self {
            steps: frames.into_iter().map(|f| Ok(Some(f))).collect(),
        }
    }

    /// Append an arbitrary step, including failures
    pub fn push(&mut self, step: Result<Option<FrameSample>, SourceError>) {
        self.steps.push_back(step);
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl SampleSource for ScriptedSource {
    async fn next_sample(&mut self) -> Result<Option<FrameSample>, SourceError> {
        self.steps.pop_front().unwrap_or(Err(SourceError::Closed))
    }
}

/// Fed from another task, e.g. an HTTP handler receiving detections
///
/// Only the newest queued frame is returned; older ones are stale by the time
/// the loop asks.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<FrameSample>,
}

impl ChannelSource {
    /// Source plus the sender that feeds it
    pub fn channel(capacity: usize) -> (mpsc::Sender<FrameSample>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl SampleSource for ChannelSource {
    async fn next_sample(&mut self) -> Result<Option<FrameSample>, SourceError> {
        let mut latest = self.rx.recv().await.ok_or(SourceError::Closed)?;
        let mut dropped = 0usize;
        while let Ok(newer) = self.rx.try_recv() {
            latest = newer;
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "skipped stale frames");
        }
        Ok(Some(latest))
    }
}
