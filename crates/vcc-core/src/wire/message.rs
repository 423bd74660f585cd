//! VCC wire envelope and its positional JSON codec
//!
//! A message is a JSON object carrying an optional `node` integer and exactly
//! one payload key. Each payload is a fixed-arity array:
//!
//! ```text
//! {"node": 1, "request":  [id, method, path, query, body]}
//! {"node": 1, "response": [id, status, reason, body]}
//! {"node": 1, "event":    [path, query, body]}
//! {"node": 1, "control":  [path, query, body]}
//! ```
//!
//! Absent `query`/`body` slots are encoded as `null`.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::types::NodeId;

const REQUEST_KEY: &str = "request";
const RESPONSE_KEY: &str = "response";
const EVENT_KEY: &str = "event";
const CONTROL_KEY: &str = "control";
const NODE_KEY: &str = "node";

/// Codec failures. Callers treat every variant as "message dropped".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope carries no payload")]
    MissingPayload,

    #[error("envelope carries more than one payload")]
    MultiplePayloads,

    #[error("{kind} payload has {actual} elements, expected {expected}")]
    Arity {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} payload has an invalid {field}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
    },
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        WireError::Json(err.to_string())
    }
}

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GET" | "get" => Ok(Method::Get),
            "PUT" | "put" => Ok(Method::Put),
            "POST" | "post" => Ok(Method::Post),
            "DELETE" | "delete" => Ok(Method::Delete),
            _ => Err(format!("Unknown method: {}", s)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Put => write!(f, "PUT"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: Method,
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub status: u16,
    pub reason: String,
    pub body: Option<Value>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Unsolicited notification from a node
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

/// Connection-management traffic, outside request/response correlation
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

/// The four payload kinds; exactly one is carried per message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(Request),
    Response(Response),
    Event(Event),
    Control(Control),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Request(_) => REQUEST_KEY,
            Payload::Response(_) => RESPONSE_KEY,
            Payload::Event(_) => EVENT_KEY,
            Payload::Control(_) => CONTROL_KEY,
        }
    }
}

/// Immutable wire envelope
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub node: Option<NodeId>,
    pub payload: Payload,
}

impl WireMessage {
    pub fn new(node: Option<NodeId>, payload: Payload) -> Self {
        Self { node, payload }
    }

    pub fn request(node: Option<NodeId>, request: Request) -> Self {
        Self::new(node, Payload::Request(request))
    }

    pub fn response(node: Option<NodeId>, response: Response) -> Self {
        Self::new(node, Payload::Response(response))
    }

    pub fn event(node: Option<NodeId>, event: Event) -> Self {
        Self::new(node, Payload::Event(event))
    }

    pub fn control(node: Option<NodeId>, control: Control) -> Self {
        Self::new(node, Payload::Control(control))
    }

    /// Encode into the envelope JSON text
    pub fn encode(&self) -> Result<String, WireError> {
        let mut envelope = Map::new();
        if let Some(node) = self.node {
            envelope.insert(NODE_KEY.to_string(), Value::from(node.0));
        }

        let array = match &self.payload {
            Payload::Request(r) => vec![
                Value::from(r.id),
                Value::from(r.method.to_string()),
                Value::from(r.path.clone()),
                opt(&r.query),
                opt(&r.body),
            ],
            Payload::Response(r) => vec![
                Value::from(r.id),
                Value::from(r.status),
                Value::from(r.reason.clone()),
                opt(&r.body),
            ],
            Payload::Event(e) => vec![Value::from(e.path.clone()), opt(&e.query), opt(&e.body)],
            Payload::Control(c) => vec![Value::from(c.path.clone()), opt(&c.query), opt(&c.body)],
        };
        envelope.insert(self.payload.kind().to_string(), Value::Array(array));

        Ok(serde_json::to_string(&Value::Object(envelope))?)
    }

    /// Decode envelope JSON text, enforcing the one-payload and arity rules
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut envelope) = value else {
            return Err(WireError::NotAnObject);
        };

        let node = match envelope.remove(NODE_KEY) {
            None | Some(Value::Null) => None,
            Some(v) => {
                let id = v.as_u64().ok_or(WireError::InvalidField {
                    kind: "envelope",
                    field: "node",
                })?;
                let id = u32::try_from(id).map_err(|_| WireError::InvalidField {
                    kind: "envelope",
                    field: "node",
                })?;
                Some(NodeId(id))
            }
        };

        let mut found: Option<(&'static str, Value)> = None;
        for key in [REQUEST_KEY, RESPONSE_KEY, EVENT_KEY, CONTROL_KEY] {
            if let Some(v) = envelope.remove(key) {
                if found.is_some() {
                    return Err(WireError::MultiplePayloads);
                }
                found = Some((key, v));
            }
        }
        let (kind, raw) = found.ok_or(WireError::MissingPayload)?;

        let payload = match kind {
            REQUEST_KEY => Payload::Request(decode_request(raw)?),
            RESPONSE_KEY => Payload::Response(decode_response(raw)?),
            EVENT_KEY => {
                let (path, query, body) = decode_path_triple(EVENT_KEY, raw)?;
                Payload::Event(Event { path, query, body })
            }
            _ => {
                let (path, query, body) = decode_path_triple(CONTROL_KEY, raw)?;
                Payload::Control(Control { path, query, body })
            }
        };

        Ok(Self { node, payload })
    }
}

fn opt(v: &Option<Value>) -> Value {
    v.clone().unwrap_or(Value::Null)
}

fn non_null(v: Value) -> Option<Value> {
    match v {
        Value::Null => None,
        other => Some(other),
    }
}

fn positional(kind: &'static str, raw: Value, expected: usize) -> Result<Vec<Value>, WireError> {
    let Value::Array(items) = raw else {
        return Err(WireError::InvalidField {
            kind,
            field: "payload",
        });
    };
    if items.len() != expected {
        return Err(WireError::Arity {
            kind,
            expected,
            actual: items.len(),
        });
    }
    Ok(items)
}

fn decode_request(raw: Value) -> Result<Request, WireError> {
    let mut items = positional(REQUEST_KEY, raw, 5)?.into_iter();
    let invalid = |field| WireError::InvalidField {
        kind: REQUEST_KEY,
        field,
    };

    let id = items.next().and_then(|v| v.as_u64()).ok_or(invalid("id"))?;
    let method = items
        .next()
        .and_then(|v| v.as_str().and_then(|s| s.parse::<Method>().ok()))
        .ok_or(invalid("method"))?;
    let path = items
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(invalid("path"))?;
    let query = items.next().and_then(non_null);
    let body = items.next().and_then(non_null);

    Ok(Request {
        id,
        method,
        path,
        query,
        body,
    })
}

fn decode_response(raw: Value) -> Result<Response, WireError> {
    let mut items = positional(RESPONSE_KEY, raw, 4)?.into_iter();
    let invalid = |field| WireError::InvalidField {
        kind: RESPONSE_KEY,
        field,
    };

    let id = items.next().and_then(|v| v.as_u64()).ok_or(invalid("id"))?;
    let status = items
        .next()
        .and_then(|v| v.as_u64())
        .and_then(|s| u16::try_from(s).ok())
        .ok_or(invalid("status"))?;
    let reason = match items.next() {
        Some(Value::String(s)) => s,
        Some(Value::Null) => String::new(),
        _ => return Err(invalid("reason")),
    };
    let body = items.next().and_then(non_null);

    Ok(Response {
        id,
        status,
        reason,
        body,
    })
}

fn decode_path_triple(
    kind: &'static str,
    raw: Value,
) -> Result<(String, Option<Value>, Option<Value>), WireError> {
    let mut items = positional(kind, raw, 3)?.into_iter();
    let path = items
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(WireError::InvalidField { kind, field: "path" })?;
    let query = items.next().and_then(non_null);
    let body = items.next().and_then(non_null);
    Ok((path, query, body))
}
