//! Demonstration handlers registered by the `tether` binary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};
use tether_core::{ApplicationError, ClientId};
use tether_rpc::{Emitter, EmitterHandler, EmitterRegistry, MethodHandler, MethodRegistry};
use tracing::debug;

const DEFAULT_TICK_MS: u64 = 1000;
const MIN_TICK_MS: u64 = 10;

/// Register every demo method and emitter.
pub fn register(methods: &mut MethodRegistry, emitters: &mut EmitterRegistry) {
    methods.register("system.ping", PingHandler);
    methods.register("echo", EchoHandler);
    methods.register("system.clientId", ClientIdHandler);
    emitters.register("ticker", TickerEmitter);
}

/// `system.ping` → `{pong: true, timestamp}` (ms since the epoch).
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(
        &self,
        _params: Vec<Value>,
        _client_id: &ClientId,
    ) -> Result<Value, ApplicationError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Ok(json!({ "pong": true, "timestamp": timestamp }))
    }
}

/// `echo` → the params array, unchanged.
pub struct EchoHandler;

#[async_trait]
impl MethodHandler for EchoHandler {
    async fn handle(
        &self,
        params: Vec<Value>,
        _client_id: &ClientId,
    ) -> Result<Value, ApplicationError> {
        Ok(Value::Array(params))
    }
}

/// `system.clientId` → the caller's client id.
pub struct ClientIdHandler;

#[async_trait]
impl MethodHandler for ClientIdHandler {
    async fn handle(
        &self,
        _params: Vec<Value>,
        client_id: &ClientId,
    ) -> Result<Value, ApplicationError> {
        Ok(json!(client_id.as_str()))
    }
}

/// `ticker:` emits 1, 2, 3, … every `params[0]` ms (default 1000) until the
/// connection closes, or until `params[1]` ticks have been sent.
pub struct TickerEmitter;

#[async_trait]
impl EmitterHandler for TickerEmitter {
    async fn run(&self, params: Vec<Value>, emitter: Emitter, client_id: ClientId) {
        let period = params
            .first()
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TICK_MS)
            .max(MIN_TICK_MS);
        let limit = params.get(1).and_then(Value::as_u64);

        let mut interval = tokio::time::interval(Duration::from_millis(period));
        let _ = interval.tick().await;
        let mut count: u64 = 0;

        loop {
            tokio::select! {
                () = emitter.closed() => break,
                _ = interval.tick() => {
                    count += 1;
                    if !emitter.emit(json!(count)) {
                        break;
                    }
                    if limit.is_some_and(|max| count >= max) {
                        break;
                    }
                }
            }
        }
        debug!(client_id = %client_id, id = ?emitter.id(), ticks = count, "ticker stopped");
    }
}
