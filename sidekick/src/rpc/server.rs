//! RPC server with per-call authentication.
//!
//! The server is the "server-side face" of the authenticated proxy: every
//! frame is checked against the expected token before the handler runs, and
//! handler latency is recorded into the service's latency ring.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::rings::SharedLatencyRing;

use super::envelope::{ErrorCode, RequestFrame, ResponseFrame};
use super::error::RpcError;
use super::handler::ServiceHandler;

/// Server behavior knobs.
#[derive(Default)]
pub struct ServerOptions {
    /// Token every call must present. `None` disables the check (used by
    /// standalone sidecars launched without a token).
    pub expected_token: Option<String>,
    /// Methods the service definition declares. An empty list allows any
    /// method through to the handler.
    pub methods: Vec<String>,
    /// Ring the per-call handler latency is recorded into.
    pub latencies: Option<SharedLatencyRing>,
}

struct ServerContext {
    expected_token: Option<String>,
    methods: Vec<String>,
    handler: Arc<dyn ServiceHandler>,
    latencies: Option<SharedLatencyRing>,
}

/// A running RPC server.
///
/// Dropping the handle shuts the server down.
pub struct RpcServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RpcServerHandle {
    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and tears down open ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits until the accept loop exits.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Binds `addr` and serves `handler` behind the auth wrap.
///
/// # Errors
///
/// Returns [`RpcError::Io`] if the listener cannot bind.
pub async fn bind(
    addr: &str,
    handler: Arc<dyn ServiceHandler>,
    options: ServerOptions,
) -> Result<RpcServerHandle, RpcError> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let context = Arc::new(ServerContext {
        expected_token: options.expected_token,
        methods: options.methods,
        handler,
        latencies: options.latencies,
    });

    let cancel = CancellationToken::new();
    let task = tokio::spawn(accept_loop(listener, context, cancel.clone()));

    debug!(addr = %local_addr, "rpc server listening");
    Ok(RpcServerHandle {
        local_addr,
        cancel,
        task: Some(task),
    })
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ServerContext>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        trace!(peer = %peer, "accepted rpc connection");
                        tokio::spawn(serve_connection(
                            stream,
                            context.clone(),
                            cancel.child_token(),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    context: Arc<ServerContext>,
    cancel: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let frame: RequestFrame = match serde_json::from_str(&line) {
                    Ok(frame) => frame,
                    Err(err) => {
                        let response = ResponseFrame::error(
                            0,
                            ErrorCode::InvalidRequest,
                            format!("Malformed frame: {err}"),
                        );
                        write_response(&writer, &response).await;
                        continue;
                    }
                };
                // Dispatch concurrently; response ordering is carried by ids.
                let context = context.clone();
                let writer = writer.clone();
                tokio::spawn(async move {
                    let response = dispatch(&context, frame).await;
                    write_response(&writer, &response).await;
                });
            }
            Ok(None) | Err(_) => break,
        }
    }
}

/// Runs one frame through auth, method lookup, and the handler.
async fn dispatch(context: &ServerContext, frame: RequestFrame) -> ResponseFrame {
    if let Some(expected) = &context.expected_token {
        if frame.metadata.authorization.as_deref() != Some(expected.as_str()) {
            warn!(method = %frame.method, "rejected call with missing or invalid token");
            return ResponseFrame::error(frame.id, ErrorCode::Unauthenticated, "Invalid token");
        }
    }

    if !context.methods.is_empty() && !context.methods.iter().any(|m| m == &frame.method) {
        return ResponseFrame::error(
            frame.id,
            ErrorCode::MethodNotFound,
            format!("Unknown method: {}", frame.method),
        );
    }

    let started = Instant::now();
    let result = context.handler.invoke(&frame.method, frame.payload).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if let Some(latencies) = &context.latencies {
        latencies.lock().await.push(elapsed_ms);
    }

    match result {
        Ok(value) => ResponseFrame::ok(frame.id, value),
        Err(err) => ResponseFrame::error(frame.id, err.code(), err.to_string()),
    }
}

async fn write_response(writer: &Arc<Mutex<OwnedWriteHalf>>, response: &ResponseFrame) {
    let mut line = match serde_json::to_string(response) {
        Ok(line) => line,
        Err(err) => {
            warn!(error = %err, "failed to encode response frame");
            return;
        }
    };
    line.push('\n');
    if let Err(err) = writer.lock().await.write_all(line.as_bytes()).await {
        trace!(error = %err, "connection went away before response could be written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::LatencyRing;
    use crate::rpc::{HandlerError, RpcClient};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ServiceHandler for EchoHandler {
        async fn invoke(&self, method: &str, payload: Value) -> Result<Value, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                "echo" => Ok(payload),
                "boom" => Err(HandlerError::Internal("it broke".into())),
                other => Err(HandlerError::MethodNotFound(other.to_string())),
            }
        }
    }

    async fn start_server(options: ServerOptions) -> (RpcServerHandle, Arc<EchoHandler>) {
        let handler = Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        });
        let server = bind("127.0.0.1:0", handler.clone(), options).await.unwrap();
        (server, handler)
    }

    #[tokio::test]
    async fn test_call_with_valid_token() {
        let (server, _) = start_server(ServerOptions {
            expected_token: Some("secret".into()),
            ..Default::default()
        })
        .await;

        let client = RpcClient::new(server.local_addr().to_string());
        let reply = client
            .call("echo", Some("secret"), json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(reply, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_call_with_bad_token_never_reaches_handler() {
        let (server, handler) = start_server(ServerOptions {
            expected_token: Some("secret".into()),
            ..Default::default()
        })
        .await;

        let client = RpcClient::new(server.local_addr().to_string());
        let err = client
            .call("echo", Some("wrong"), Value::Null)
            .await
            .unwrap_err();
        assert!(err.is_unauthenticated());

        let err = client.call("echo", None, Value::Null).await.unwrap_err();
        assert!(err.is_unauthenticated());

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undeclared_method_is_rejected() {
        let (server, handler) = start_server(ServerOptions {
            methods: vec!["echo".into()],
            ..Default::default()
        })
        .await;

        let client = RpcClient::new(server.local_addr().to_string());
        let err = client.call("other", None, Value::Null).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote {
                code: ErrorCode::MethodNotFound,
                ..
            }
        ));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_latency_is_recorded() {
        let latencies: SharedLatencyRing = Arc::new(Mutex::new(LatencyRing::new(100)));
        let (server, _) = start_server(ServerOptions {
            latencies: Some(latencies.clone()),
            ..Default::default()
        })
        .await;

        let client = RpcClient::new(server.local_addr().to_string());
        client.call("echo", None, json!(1)).await.unwrap();
        client.call("echo", None, json!(2)).await.unwrap();

        assert_eq!(latencies.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_handler_error_maps_to_error_frame() {
        let (server, _) = start_server(ServerOptions::default()).await;

        let client = RpcClient::new(server.local_addr().to_string());
        let err = client.call("boom", None, Value::Null).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote {
                code: ErrorCode::Internal,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (server, _) = start_server(ServerOptions::default()).await;
        let addr = server.local_addr().to_string();

        server.shutdown();
        server.wait().await;

        let client = RpcClient::new(addr);
        let err = client.call("echo", None, Value::Null).await;
        assert!(err.is_err());
    }
}
