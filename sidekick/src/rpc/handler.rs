//! The service invocation seam.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::envelope::ErrorCode;

/// Errors a handler can return from [`ServiceHandler::invoke`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler does not implement the named method.
    #[error("Unknown method: {0}")]
    MethodNotFound(String),

    /// The payload did not match what the method expects.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The method ran and failed.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Maps the handler error onto its wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            HandlerError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            HandlerError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// An in-process service implementation.
///
/// Implementations dispatch on the method name explicitly; there is no
/// runtime enumeration of handler methods. The server rejects methods that
/// are absent from the service definition before `invoke` is reached, so a
/// handler only sees methods it has declared.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Invokes `method` with an opaque JSON payload.
    async fn invoke(&self, method: &str, payload: Value) -> Result<Value, HandlerError>;
}
