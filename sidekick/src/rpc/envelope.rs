//! Wire frame types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error classification carried in error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The `authorization` metadata was missing or did not match.
    Unauthenticated,
    /// The method is not part of the service's definition.
    MethodNotFound,
    /// The frame could not be parsed or the payload was malformed.
    InvalidRequest,
    /// The handler failed.
    Internal,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::MethodNotFound => "method_not_found",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call metadata attached to every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Per-service shared secret; compared by exact string equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

/// A single request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Caller-chosen id echoed back in the response.
    pub id: u64,
    /// Method name from the service definition.
    pub method: String,
    /// Call metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Method argument, opaque to the supervisor.
    #[serde(default)]
    pub payload: Value,
}

/// The error half of a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
}

/// A single response frame; exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Echo of the request id.
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ResponseFrame {
    /// Builds a success frame.
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error frame.
    pub fn error(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
            }),
        }
    }
}
