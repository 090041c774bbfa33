//! JSON-RPC error codes and the application error carrier.

use serde::{Deserialize, Serialize};

// ── Reserved codes ──────────────────────────────────────────────────

/// The frame was not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// The item is not a structurally valid request.
pub const INVALID_REQUEST: i64 = -32600;
/// No handler is registered under the requested name.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// A handler failed in a way it did not describe itself.
pub const INTERNAL_ERROR: i64 = -32603;
/// Default code for implementation-defined server errors.
pub const SERVER_ERROR: i64 = -32000;

/// Message used when an emitter lookup misses. Shares `METHOD_NOT_FOUND`.
pub const EMITTER_NOT_FOUND_MESSAGE: &str = "Emitter not found";

/// Canonical message for one of the four reserved codes.
pub fn canonical_message(code: i64) -> Option<&'static str> {
    match code {
        PARSE_ERROR => Some("Parse error"),
        INVALID_REQUEST => Some("Invalid Request"),
        METHOD_NOT_FOUND => Some("Method not found"),
        INTERNAL_ERROR => Some("Internal error"),
        _ => None,
    }
}

/// Error raised by handlers and carried verbatim into a response's `error`.
///
/// Serializes as the wire error object `{code, message}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ApplicationError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl ApplicationError {
    /// Error with an explicit code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error with the canonical message for `code`, or an empty one when the
    /// code is not reserved.
    pub fn from_code(code: i64) -> Self {
        Self::new(code, canonical_message(code).unwrap_or_default())
    }

    /// Implementation-defined server error (`-32000`).
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SERVER_ERROR, message)
    }

    pub fn parse_error() -> Self {
        Self::from_code(PARSE_ERROR)
    }

    pub fn invalid_request() -> Self {
        Self::from_code(INVALID_REQUEST)
    }

    pub fn method_not_found() -> Self {
        Self::from_code(METHOD_NOT_FOUND)
    }

    pub fn emitter_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, EMITTER_NOT_FOUND_MESSAGE)
    }

    pub fn internal_error() -> Self {
        Self::from_code(INTERNAL_ERROR)
    }

    /// Whether the code is one of the four reserved protocol codes.
    pub fn is_reserved(&self) -> bool {
        canonical_message(self.code).is_some()
    }

    /// Short classification string for logs and metrics.
    pub fn error_kind(&self) -> &'static str {
        match self.code {
            PARSE_ERROR => "parse_error",
            INVALID_REQUEST => "invalid_request",
            METHOD_NOT_FOUND => "method_not_found",
            INTERNAL_ERROR => "internal_error",
            _ => "application",
        }
    }
}

impl Default for ApplicationError {
    fn default() -> Self {
        Self::from_code(SERVER_ERROR)
    }
}

impl From<serde_json::Error> for ApplicationError {
    fn from(err: serde_json::Error) -> Self {
        Self::server(err.to_string())
    }
}
