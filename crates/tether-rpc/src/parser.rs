//! Raw text frame → [`Batch`].
//!
//! A frame that is not JSON fails as a whole. Otherwise an array yields one
//! candidate per element and any other value yields a single candidate.
//! Candidates that do not look like a request become [`ParsedItem::Invalid`]
//! without affecting their siblings.

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{Batch, ParsedItem, Request, RequestId, RequestKind};

/// Trailing character that routes a method name to the emitter registry.
pub const EMITTER_MARKER: char = ':';

/// The frame could not be parsed as JSON at all.
#[derive(Debug, thiserror::Error)]
#[error("frame is not valid JSON: {reason}")]
pub struct ParseFailure {
    /// Parser diagnostic, for logging only.
    pub reason: String,
}

/// Parse one inbound text frame.
pub fn parse_frame(frame: &str) -> Result<Batch, ParseFailure> {
    let value: Value = serde_json::from_str(frame).map_err(|e| ParseFailure {
        reason: e.to_string(),
    })?;

    let batch = match value {
        Value::Array(items) => items.into_iter().map(parse_item).collect(),
        single => vec![parse_item(single)],
    };
    Ok(batch)
}

/// Validate one candidate.
pub fn parse_item(candidate: Value) -> ParsedItem {
    match candidate {
        Value::Object(fields) => {
            parse_object(fields).map_or(ParsedItem::Invalid, ParsedItem::Request)
        }
        other => {
            debug!(kind = value_kind(&other), "request item is not an object");
            ParsedItem::Invalid
        }
    }
}

fn parse_object(mut fields: Map<String, Value>) -> Option<Request> {
    let Some(Value::String(raw_method)) = fields.remove("method") else {
        debug!("request item has no string method");
        return None;
    };

    let mut method = raw_method;
    let kind = if method.ends_with(EMITTER_MARKER) {
        method.pop();
        RequestKind::Emitter
    } else {
        RequestKind::Method
    };
    if method.is_empty() {
        debug!("request item has an empty method name");
        return None;
    }

    let id = match fields.remove("id") {
        None => RequestId::Null,
        Some(raw) => {
            let Some(id) = RequestId::from_value(&raw) else {
                debug!(kind = value_kind(&raw), "request id has an unsupported type");
                return None;
            };
            id
        }
    };

    let params = match fields.remove("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(params)) => params,
        Some(other) => {
            debug!(kind = value_kind(&other), "request params are not an array");
            return None;
        }
    };

    Some(Request {
        id,
        method,
        kind,
        params,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
