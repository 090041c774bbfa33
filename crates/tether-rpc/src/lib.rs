//! # tether-rpc
//!
//! JSON-RPC 2.0 protocol layer for Tether.
//!
//! - Parsing of raw text frames into batches of request items
//! - Method and emitter registries
//! - Concurrent batch dispatch with order-preserving aggregation
//! - Emitters: handlers that push any number of standalone responses
//!   over the connection after the batch reply

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod emitter;
pub mod parser;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use dispatcher::Dispatcher;
pub use emitter::{Emitter, FrameSink};
pub use parser::{parse_frame, ParseFailure, EMITTER_MARKER};
pub use registry::{EmitterHandler, EmitterRegistry, MethodHandler, MethodRegistry};
pub use types::{Batch, Outcome, ParsedItem, Request, RequestId, RequestKind, Response};
