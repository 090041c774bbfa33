//! Connection parameters carried in an upgrade request header.
//!
//! The default encoding is base64 of a JSON document. Standard and URL-safe
//! alphabets are accepted, with or without padding.

use axum::http::HeaderMap;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a raw header value into connection parameters.
pub trait ParamsCodec: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<Value, ParamsError>;
}

/// Base64-encoded JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct Base64JsonCodec;

impl ParamsCodec for Base64JsonCodec {
    fn decode(&self, raw: &[u8]) -> Result<Value, ParamsError> {
        let raw = raw.trim_ascii();
        let bytes = [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD]
            .into_iter()
            .find_map(|engine| engine.decode(raw).ok())
            .map_or_else(|| URL_SAFE_NO_PAD.decode(raw), Ok)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Decode the parameters header, falling back to `{}` when it is absent or
/// cannot be decoded.
pub fn decode_params(headers: &HeaderMap, header: &str, codec: &dyn ParamsCodec) -> Value {
    let Some(raw) = headers.get(header) else {
        debug!(header, "no connection params header");
        return empty();
    };
    match codec.decode(raw.as_bytes()) {
        Ok(params) => params,
        Err(e) => {
            warn!(header, error = %e, "failed to decode connection params, using {{}}");
            empty()
        }
    }
}

fn empty() -> Value {
    Value::Object(Map::new())
}
