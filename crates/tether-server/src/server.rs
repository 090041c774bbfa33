//! `TetherServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tether_rpc::{Dispatcher, EmitterRegistry, MethodRegistry};
use tether_settings::ServerSettings;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::channel::{Channel, OutboundFrame};
use crate::errors::{ServerError, TransportError};
use crate::health::{self, HealthResponse};
use crate::hooks::{DefaultHooks, LifecycleHooks};
use crate::lifecycle::{InboundFrame, Lifecycle};
use crate::params::{decode_params, Base64JsonCodec, ParamsCodec};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Shared state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    lifecycle: Arc<Lifecycle>,
    codec: Arc<dyn ParamsCodec>,
    settings: Arc<ServerSettings>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

/// JSON-RPC over WebSocket server.
pub struct TetherServer {
    settings: Arc<ServerSettings>,
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    hooks: Arc<dyn LifecycleHooks>,
    codec: Arc<dyn ParamsCodec>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl TetherServer {
    pub fn new(
        settings: ServerSettings,
        methods: MethodRegistry,
        emitters: EmitterRegistry,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            settings: Arc::new(settings),
            dispatcher: Dispatcher::new(methods, emitters),
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&registry))),
            registry,
            hooks: Arc::new(DefaultHooks),
            codec: Arc::new(Base64JsonCodec),
            start_time: Instant::now(),
        }
    }

    /// Replace the admission and cleanup hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replace the connection-parameter codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl ParamsCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Build the router: the upgrade route at the configured path plus
    /// `GET /health`.
    pub fn router(&self) -> Router {
        let lifecycle = Lifecycle::new(
            self.dispatcher.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.hooks),
            self.settings.lifetime(),
        );
        let state = AppState {
            lifecycle: Arc::new(lifecycle),
            codec: Arc::clone(&self.codec),
            settings: Arc::clone(&self.settings),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.settings.path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    /// The task ends once [`ShutdownCoordinator::shutdown`] is called. Pass it
    /// to [`ShutdownCoordinator::graceful_shutdown`] to also wait for every
    /// connection's teardown.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        self.settings.validate()?;
        let addr = self.settings.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        info!(%local_addr, path = %self.settings.path, "tether server listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        Ok((local_addr, handle))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.lifecycle.registry().count();
    Json(health::health_check(state.start_time, connections))
}

/// GET {path}: WebSocket upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(guard) = state.shutdown.connection_guard() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let params = decode_params(&headers, &state.settings.params_header, state.codec.as_ref());
    ws.max_message_size(state.settings.max_message_size)
        .on_upgrade(move |socket| async move {
            run_socket(socket, params, state).await;
            drop(guard);
        })
}

async fn run_socket(socket: WebSocket, params: Value, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let (channel, outbound) = Channel::new(state.settings.max_send_queue);

    let writer = tokio::spawn(write_loop(ws_tx, outbound, Arc::clone(&channel)));

    // Close on shutdown even if the connection was never registered.
    let shutdown = state.shutdown.token();
    let watched = Arc::clone(&channel);
    drop(channel.tasks().spawn(async move {
        let closed = watched.closed_token();
        tokio::select! {
            () = shutdown.cancelled() => watched.close(),
            () = closed.cancelled() => {}
        }
    }));

    let inbound = Box::pin(ws_rx.filter_map(|msg| {
        futures::future::ready(match msg {
            Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Some(Ok(InboundFrame::Binary(data))),
            Ok(Message::Close(_)) => Some(Ok(InboundFrame::Close)),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Err(e) => Some(Err(TransportError::from(e))),
        })
    }));

    let _ = state.lifecycle.run(Arc::clone(&channel), params, inbound).await;
    channel.close();
    if let Err(e) = writer.await {
        debug!(error = %e, "writer task ended abnormally");
    }

    // In-flight handlers and emitters.
    channel.tasks().close();
    channel.tasks().wait().await;
}

/// Drain the outbound queue into the socket until the channel closes, then
/// send a close frame.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    channel: Arc<Channel>,
) {
    let closed = channel.closed_token();
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        channel.close();
                        return;
                    }
                }
                Some(OutboundFrame::Close) | None => break,
            },
            () = closed.cancelled() => {
                while let Ok(OutboundFrame::Text(text)) = outbound.try_recv() {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
    let _ = ws_tx.close().await;
}
