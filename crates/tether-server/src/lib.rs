//! # tether-server
//!
//! Axum WebSocket server that runs the Tether JSON-RPC dispatcher.
//!
//! - [`TetherServer`]: router, `/health`, listen and graceful shutdown
//! - [`Lifecycle`]: admission hook, lifetime ceiling, frame processing and
//!   teardown for each connection
//! - [`ConnectionRegistry`]: live connections by client id, with server push
//! - [`Channel`]: bounded outbound queue with close semantics
//! - [`ParamsCodec`]: decoding of the connection-parameter header

#![deny(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod health;
pub mod hooks;
pub mod lifecycle;
pub mod params;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use channel::{Channel, OutboundFrame};
pub use errors::{ServerError, TransportError};
pub use hooks::{DefaultHooks, LifecycleHooks, Rejection};
pub use lifecycle::{CloseReason, InboundFrame, Lifecycle};
pub use params::{decode_params, Base64JsonCodec, ParamsCodec, ParamsError};
pub use registry::ConnectionRegistry;
pub use server::{AppState, TetherServer};
pub use shutdown::ShutdownCoordinator;
