//! In-memory [`FrameSink`] for unit tests.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::emitter::FrameSink;

pub struct RecordingSink {
    frames: Mutex<Vec<String>>,
    closed: CancellationToken,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        })
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn frames_json(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }
}

impl FrameSink for RecordingSink {
    fn send_text(&self, text: String) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.frames.lock().push(text);
        true
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        drop(tokio::spawn(task));
    }
}
