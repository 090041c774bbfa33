//! Server and transport errors.

use thiserror::Error;

/// Failure reading from a client's socket.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

/// Failure starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid server settings: {0}")]
    Settings(#[from] tether_settings::SettingsError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
