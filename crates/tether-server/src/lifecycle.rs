//! Connection lifecycle: admission, frame processing, lifetime ceiling and
//! teardown.
//!
//! The flow for one upgraded connection is
//! `Admitting → Open → Closing → Closed`. A rejected connection goes straight
//! from `Admitting` to `Closed` without being registered or reported to the
//! cleanup hook.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use serde_json::Value;
use tether_core::ClientId;
use tether_rpc::{Dispatcher, FrameSink, RequestId, Response};
use tracing::{debug, info, instrument, warn};

use crate::channel::Channel;
use crate::errors::TransportError;
use crate::hooks::LifecycleHooks;
use crate::registry::ConnectionRegistry;

/// Frame read from a client's socket, reduced to what the lifecycle cares
/// about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

/// Why an open connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket.
    Client,
    /// The lifetime ceiling elapsed.
    Lifetime,
    /// Reading from the socket failed.
    Transport,
    /// The channel was closed server-side (shutdown or application code).
    Server,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Lifetime => "lifetime",
            Self::Transport => "transport",
            Self::Server => "server",
        }
    }
}

/// Drives every connection accepted by a server.
pub struct Lifecycle {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    hooks: Arc<dyn LifecycleHooks>,
    lifetime: Duration,
}

impl Lifecycle {
    pub fn new(
        dispatcher: Dispatcher,
        registry: Arc<ConnectionRegistry>,
        hooks: Arc<dyn LifecycleHooks>,
        lifetime: Duration,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            hooks,
            lifetime,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Run one connection to completion.
    ///
    /// Returns `None` if the admission hook rejected it.
    #[instrument(skip_all, fields(client_id = tracing::field::Empty))]
    pub async fn run<S>(
        &self,
        channel: Arc<Channel>,
        params: Value,
        inbound: S,
    ) -> Option<CloseReason>
    where
        S: Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send,
    {
        let client_id = self.admit(params, &channel).await?;
        let _ = tracing::Span::current().record("client_id", tracing::field::display(&client_id));

        self.registry.insert(client_id.clone(), Arc::clone(&channel));
        info!("client connected");
        counter!("ws_connections_total").increment(1);
        gauge!("ws_connections_active").increment(1.0);

        let reason = self.serve(&client_id, &channel, inbound).await;

        channel.close();
        self.hooks.client_removed(&client_id).await;
        let _ = self.registry.remove_if_same(&client_id, &channel);

        info!(reason = reason.as_str(), dropped = channel.drop_count(), "client disconnected");
        counter!("ws_disconnections_total", "reason" => reason.as_str()).increment(1);
        gauge!("ws_connections_active").decrement(1.0);
        histogram!("ws_connection_duration_seconds").record(channel.age().as_secs_f64());
        Some(reason)
    }

    /// Ask the admission hook for a client id. On rejection the error is
    /// sent as `{id: null, error}` and the channel is closed.
    async fn admit(&self, params: Value, channel: &Arc<Channel>) -> Option<ClientId> {
        match self.hooks.client_added(params, Arc::clone(channel)).await {
            Ok(Some(client_id)) => Some(client_id),
            Ok(None) => Some(ClientId::new()),
            Err(rejection) => {
                warn!(
                    code = rejection.error.code,
                    message = %rejection.error.message,
                    "connection rejected"
                );
                counter!("ws_rejections_total").increment(1);
                let response = Response::error(RequestId::Null, rejection.error);
                match serde_json::to_string(&response) {
                    Ok(json) => {
                        let _ = channel.send_text(json);
                    }
                    Err(e) => warn!(error = %e, "failed to serialize rejection"),
                }
                channel.close();
                None
            }
        }
    }

    async fn serve<S>(
        &self,
        client_id: &ClientId,
        channel: &Arc<Channel>,
        mut inbound: S,
    ) -> CloseReason
    where
        S: Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send,
    {
        let deadline = tokio::time::sleep(self.lifetime);
        tokio::pin!(deadline);
        let closed = channel.closed_token();

        loop {
            tokio::select! {
                () = &mut deadline => {
                    let lifetime_ms = self.lifetime.as_millis() as u64;
                    info!(lifetime_ms, "connection lifetime elapsed");
                    return CloseReason::Lifetime;
                }
                () = closed.cancelled() => return CloseReason::Server,
                frame = inbound.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => {
                        self.spawn_frame(text, client_id, channel);
                    }
                    Some(Ok(InboundFrame::Binary(data))) => {
                        debug!(len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(InboundFrame::Close)) | None => return CloseReason::Client,
                    Some(Err(e)) => {
                        warn!(error = %e, "transport error");
                        return CloseReason::Transport;
                    }
                },
            }
        }
    }

    /// Dispatch one text frame on its own task so a slow batch never holds
    /// up later frames.
    fn spawn_frame(&self, text: String, client_id: &ClientId, channel: &Arc<Channel>) {
        let dispatcher = self.dispatcher.clone();
        let client_id = client_id.clone();
        let sink: Arc<dyn FrameSink> = Arc::clone(channel) as Arc<dyn FrameSink>;
        drop(channel.tasks().spawn(async move {
            let responses = dispatcher.dispatch_frame(&text, &client_id, &sink).await;
            match serde_json::to_string(&responses) {
                Ok(json) => {
                    if !sink.send_text(json) {
                        debug!(client_id = %client_id, "batch reply not delivered");
                    }
                }
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "failed to serialize batch reply");
                }
            }
        }));
    }
}
