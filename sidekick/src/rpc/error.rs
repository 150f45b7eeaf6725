//! RPC error types.

use thiserror::Error;

use super::envelope::ErrorCode;

/// Errors raised by RPC clients and servers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("Frame encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The peer went away before answering.
    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    /// The peer answered with an error frame.
    #[error("Call failed ({code}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// The endpoint never started accepting connections.
    #[error("Endpoint {addr} did not become ready within {timeout_ms} ms")]
    NotReady { addr: String, timeout_ms: u64 },
}

impl RpcError {
    /// Returns true if the peer rejected the call for a bad token.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            RpcError::Remote {
                code: ErrorCode::Unauthenticated,
                ..
            }
        )
    }
}
