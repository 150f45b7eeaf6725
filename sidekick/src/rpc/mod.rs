//! Loopback RPC protocol.
//!
//! Services are reached over newline-delimited JSON frames on a loopback TCP
//! socket. Every request carries call metadata with an `authorization` token;
//! the server side rejects mismatching tokens before the handler runs.
//!
//! The protocol is deliberately small: the supervisor does not interpret
//! payloads, it only routes `invoke(method, payload)` calls described by a
//! service definition.
//!
//! # Frames
//!
//! ```json
//! {"id": 7, "method": "convert", "metadata": {"authorization": "ab12..."}, "payload": {"path": "in.png"}}
//! {"id": 7, "result": {"ok": true}}
//! {"id": 8, "error": {"code": "unauthenticated", "message": "Invalid token"}}
//! ```

mod client;
mod envelope;
mod error;
mod handler;
mod server;

pub use client::{wait_ready, RpcClient};
pub use envelope::{ErrorCode, Metadata, RequestFrame, ResponseError, ResponseFrame};
pub use error::RpcError;
pub use handler::{HandlerError, ServiceHandler};
pub use server::{bind, RpcServerHandle, ServerOptions};
