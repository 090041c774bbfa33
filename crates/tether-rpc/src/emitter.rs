//! Out-of-band response stream for emitter requests.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{RequestId, Response};

/// Outbound side of a connection, as seen by the dispatcher.
///
/// Implementations must treat every send after close as a no-op.
pub trait FrameSink: Send + Sync {
    /// Queue one text frame. Returns `false` if it was not queued.
    fn send_text(&self, text: String) -> bool;

    /// Whether the connection still accepts frames.
    fn is_open(&self) -> bool;

    /// Token cancelled when the connection closes.
    fn close_token(&self) -> CancellationToken;

    /// Run a task owned by the connection (batches and emitters).
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Handle given to an emitter handler. Each [`Emitter::emit`] sends one
/// standalone `{id, result}` frame carrying the originating request's id.
#[derive(Clone)]
pub struct Emitter {
    id: RequestId,
    sink: Arc<dyn FrameSink>,
}

impl Emitter {
    pub fn new(id: RequestId, sink: Arc<dyn FrameSink>) -> Self {
        Self { id, sink }
    }

    /// Id of the request that started this emitter.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Send `data` as `{id, result: data}`.
    ///
    /// Returns `false` without sending once the connection has closed.
    pub fn emit(&self, data: Value) -> bool {
        if !self.sink.is_open() {
            debug!(id = ?self.id, "emit after close ignored");
            return false;
        }
        let response = Response::success(self.id.clone(), data);
        match serde_json::to_string(&response) {
            Ok(json) => self.sink.send_text(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize emitted frame");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.sink.is_open()
    }

    /// Resolves when the connection closes.
    pub async fn closed(&self) {
        self.sink.close_token().cancelled_owned().await;
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
