//! JSON-RPC error codes and error response helpers for the A2A surface.
//!
//! Error codes follow JSON-RPC 2.0 conventions:
//! - -32700 to -32600: Standard JSON-RPC errors
//! - -32099 to -32000: Server errors (A2A-specific)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A2A protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum A2AErrorCode {
    /// Invalid JSON was received by the server.
    JsonParseError = -32700,
    /// The JSON sent is not a valid Request object.
    InvalidRequest = -32600,
    /// The method does not exist / is not available.
    MethodNotFound = -32601,
    /// Invalid method parameter(s).
    InvalidParams = -32602,
    /// Internal JSON-RPC error.
    InternalError = -32603,
    /// The specified task was not found.
    TaskNotFound = -32001,
    /// The requested operation is not supported.
    UnsupportedOperation = -32004,
}

impl A2AErrorCode {
    /// Get the default error message for this code.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::JsonParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::TaskNotFound => "Task not found",
            Self::UnsupportedOperation => "This operation is not supported",
        }
    }
}

/// A JSON-RPC error object, either produced by this service or returned by a
/// peer.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct A2AError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl A2AError {
    /// Create an error with the code's default message.
    pub fn from_code(code: A2AErrorCode) -> Self {
        Self {
            code: code as i32,
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Create an error with a custom message.
    pub fn new(code: A2AErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }

    /// Full JSON-RPC error response envelope.
    pub fn to_response(&self, request_id: Option<Value>) -> Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "error": self,
            "id": request_id.unwrap_or(Value::Null),
        })
    }
}

/// Successful JSON-RPC response envelope.
pub fn success_response(result: Value, request_id: Option<Value>) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": request_id.unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_envelope() {
        let err = A2AError::from_code(A2AErrorCode::MethodNotFound);
        let resp = err.to_response(Some(Value::from(7)));
        assert_eq!(resp["jsonrpc"], "2.0");
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["error"]["code"], -32601);
        assert_eq!(resp["error"]["message"], "Method not found");
        assert!(resp["error"].get("data").is_none());
    }

    #[test]
    fn test_peer_error_round_trips_from_wire() {
        let err: A2AError =
            serde_json::from_value(serde_json::json!({"code": -32603, "message": "boom"})).unwrap();
        assert_eq!(err.to_string(), "[-32603] boom");
    }
}
