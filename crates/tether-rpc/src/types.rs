//! Wire-format types for requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::ApplicationError;

/// Request identifier: a string, a number, or null when the client supplied
/// none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
    #[default]
    Null,
}

impl RequestId {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a raw JSON `id` member. Returns `None` for types the protocol
    /// does not allow (booleans, arrays, objects).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

/// Which registry a request is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Regular method: one response inside the batch reply.
    Method,
    /// Emitter: no batch entry, standalone frames via [`crate::Emitter`].
    Emitter,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Emitter => "emitter",
        }
    }
}

/// A validated request. The emitter marker is already stripped from `method`.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub kind: RequestKind,
    pub params: Vec<Value>,
}

/// One item of a parsed frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedItem {
    Request(Request),
    /// Structurally malformed item; answered with `Invalid Request`.
    Invalid,
}

/// Items of one inbound frame, in the order they appeared.
pub type Batch = Vec<ParsedItem>;

/// Either the handler's result or an error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ApplicationError),
}

/// Outgoing response: `{id, result}` or `{id, error: {code, message}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: RequestId, error: ApplicationError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// `{id: null, error: Parse error}`.
    pub fn parse_error() -> Self {
        Self::error(RequestId::Null, ApplicationError::parse_error())
    }

    /// `{id: null, error: Invalid Request}`.
    pub fn invalid_request() -> Self {
        Self::error(RequestId::Null, ApplicationError::invalid_request())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&ApplicationError> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }
}
