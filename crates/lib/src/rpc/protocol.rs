//! JSON-RPC 2.0 wire types exchanged with Edge Core, plus the role endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Keeps an explicit `"id": null` as `Some(Null)`; only a missing id means notification.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Wire request: `{ "jsonrpc": "2.0", "id", "method", "params" }`. Notifications carry no id
/// member at all; a null id is still a request and is answered with a null id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Wire response: `{ "jsonrpc": "2.0", "id", "result" }` or `{ ..., "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object. Inbound handlers return it to reject a call; outbound calls surface it as a remote error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {}", detail))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Validation failure: Edge Core expects the reason in both `message` and `data`.
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            code: INVALID_PARAMS,
            data: Some(Value::String(reason.clone())),
            message: reason,
        }
    }

    pub fn internal_error(detail: impl fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {}", detail))
    }
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(Value::String(id.into())),
            method: method.into(),
            params,
        }
    }
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_outcome(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::ok(id, result),
            Err(error) => Self::err(id, error),
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request(Request),
    Response(Response),
}

impl Incoming {
    /// Classify a text frame. Frames with a `method` are requests; frames with `result` or `error` are responses.
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text).map_err(RpcError::parse_error)?;
        let Some(obj) = value.as_object() else {
            return Err(RpcError::invalid_request("expected a JSON object"));
        };
        if obj.contains_key("method") {
            serde_json::from_value(value)
                .map(Incoming::Request)
                .map_err(RpcError::invalid_request)
        } else if obj.contains_key("result") || obj.contains_key("error") {
            serde_json::from_value(value)
                .map(Incoming::Response)
                .map_err(RpcError::invalid_request)
        } else {
            Err(RpcError::invalid_request("neither request nor response"))
        }
    }
}

/// Role a client takes towards Edge Core. Each role has its own API path on the same socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ProtocolTranslator,
    ResourceManager,
    Management,
}

impl Role {
    pub fn api_path(self) -> &'static str {
        match self {
            Role::ProtocolTranslator => "/1/pt",
            Role::ResourceManager => "/1/grm",
            Role::Management => "/1/mgmt",
        }
    }

    /// Method that introduces the client to Edge Core. The management API has none.
    pub fn registration_method(self) -> Option<&'static str> {
        match self {
            Role::ProtocolTranslator => Some("protocol_translator_register"),
            Role::ResourceManager => Some("gw_resource_manager_register"),
            Role::Management => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::ProtocolTranslator => "protocol translator",
            Role::ResourceManager => "gateway resource manager",
            Role::Management => "management client",
        };
        f.write_str(name)
    }
}
