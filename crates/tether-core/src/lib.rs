//! # tether-core
//!
//! Shared building blocks: the JSON-RPC error model and client identifiers.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;

pub use errors::ApplicationError;
pub use ids::ClientId;
