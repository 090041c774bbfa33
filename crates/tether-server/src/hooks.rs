//! Connection admission and cleanup hooks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::{ApplicationError, ClientId};

use crate::channel::Channel;

/// Refusal returned by [`LifecycleHooks::client_added`]. The error is sent to
/// the client as `{id: null, error}` before the channel closes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("connection rejected: {error}")]
pub struct Rejection {
    pub error: ApplicationError,
}

impl Rejection {
    pub fn new(error: ApplicationError) -> Self {
        Self { error }
    }
}

impl From<ApplicationError> for Rejection {
    fn from(error: ApplicationError) -> Self {
        Self::new(error)
    }
}

/// Callbacks around a connection's life.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called once per upgraded connection with the decoded connection
    /// parameters. `Ok(Some(id))` names the client, `Ok(None)` lets the
    /// server generate an id, `Err` refuses the connection.
    async fn client_added(
        &self,
        _params: Value,
        _channel: Arc<Channel>,
    ) -> Result<Option<ClientId>, Rejection> {
        Ok(None)
    }

    /// Called exactly once when an admitted connection closes, before its
    /// registry entry is removed. Never called for rejected connections.
    async fn client_removed(&self, _client_id: &ClientId) {}
}

/// Accepts everyone with a generated id.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl LifecycleHooks for DefaultHooks {}
