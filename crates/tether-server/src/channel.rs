//! Per-connection outbound channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tether_rpc::FrameSink;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Frame queued for the socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Write side of one client connection.
///
/// Frames go through a bounded queue drained by the socket writer task. Once
/// [`Channel::close`] has been called every send is a no-op.
pub struct Channel {
    tx: mpsc::Sender<OutboundFrame>,
    closed: CancellationToken,
    closing: AtomicBool,
    tasks: TaskTracker,
    dropped: AtomicU64,
    opened_at: Instant,
}

impl Channel {
    /// Create a channel whose queue holds up to `capacity` frames.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            tx,
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
            tasks: TaskTracker::new(),
            dropped: AtomicU64::new(0),
            opened_at: Instant::now(),
        };
        (Arc::new(channel), rx)
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the channel is closed or the queue is full; the
    /// latter also increments the drop counter.
    pub fn send_text(&self, text: String) -> bool {
        if self.is_closed() {
            debug!(len = text.len(), "send after close ignored");
            return false;
        }
        match self.tx.try_send(OutboundFrame::Text(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "send queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the channel. Idempotent.
    ///
    /// Frames already queued are still written before the close frame.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.try_send(OutboundFrame::Close);
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled by [`Channel::close`].
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Tasks started on behalf of this connection.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl FrameSink for Channel {
    fn send_text(&self, text: String) -> bool {
        Channel::send_text(self, text)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }

    fn close_token(&self) -> CancellationToken {
        self.closed_token()
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        drop(self.tasks.spawn(task));
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .field("dropped", &self.drop_count())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
