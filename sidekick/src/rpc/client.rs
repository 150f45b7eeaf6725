//! RPC client with call multiplexing and lazy reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::trace;

use super::envelope::{Metadata, RequestFrame, ResponseFrame};
use super::error::RpcError;

/// Map of in-flight request ids to response channels.
///
/// `None` marks the connection as closed; registering against a closed
/// connection fails immediately.
type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<ResponseFrame>>>>>;

/// One live TCP connection carrying multiplexed request/response frames.
struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl Connection {
    async fn connect(addr: &str) -> Result<Arc<Self>, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        tokio::spawn(read_loop(read_half, pending.clone()));

        Ok(Arc::new(Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
        }))
    }

    async fn is_closed(&self) -> bool {
        self.pending.lock().await.is_none()
    }

    async fn call(
        &self,
        method: &str,
        token: Option<&str>,
        payload: Value,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            id,
            method: method.to_string(),
            metadata: Metadata {
                authorization: token.map(str::to_string),
            },
            payload,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            match pending.as_mut() {
                Some(map) => {
                    map.insert(id, tx);
                }
                None => return Err(RpcError::ConnectionClosed),
            }
        }

        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                if let Some(map) = self.pending.lock().await.as_mut() {
                    map.remove(&id);
                }
                return Err(RpcError::Io(err));
            }
        }

        let response = rx.await.map_err(|_| RpcError::ConnectionClosed)?;
        match response.error {
            Some(err) => Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }
}

/// Routes incoming response frames to their waiting callers.
///
/// On EOF or read error the pending map is torn down; every in-flight call
/// observes `ConnectionClosed`.
async fn read_loop(read_half: OwnedReadHalf, pending: PendingMap) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let frame: ResponseFrame = match serde_json::from_str(&line) {
                    Ok(frame) => frame,
                    Err(err) => {
                        trace!(error = %err, "discarding unparseable response frame");
                        continue;
                    }
                };
                let sender = pending
                    .lock()
                    .await
                    .as_mut()
                    .and_then(|map| map.remove(&frame.id));
                if let Some(tx) = sender {
                    let _ = tx.send(frame);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    // Dropping the map drops all pending senders.
    pending.lock().await.take();
}

/// A client handle for one service endpoint.
///
/// The handle is cheap to share and connects lazily: the first call opens
/// the TCP connection, and a dead connection is replaced on the next call.
/// This mirrors how RPC stubs behave - creating the handle never touches
/// the network.
pub struct RpcClient {
    addr: String,
    conn: Mutex<Option<Arc<Connection>>>,
}

impl RpcClient {
    /// Creates a client for `host:port`. Does not connect.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    /// The endpoint this client talks to.
    pub fn address(&self) -> &str {
        &self.addr
    }

    async fn connection(&self) -> Result<Arc<Connection>, RpcError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.is_closed().await {
                return Ok(conn.clone());
            }
        }
        let conn = Connection::connect(&self.addr).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Issues a call, attaching `token` as `authorization` metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] for error frames (including
    /// `unauthenticated` rejections), [`RpcError::ConnectionClosed`] if the
    /// peer went away mid-call, and [`RpcError::Io`] for socket failures.
    pub async fn call(
        &self,
        method: &str,
        token: Option<&str>,
        payload: Value,
    ) -> Result<Value, RpcError> {
        let conn = self.connection().await?;
        let result = conn.call(method, token, payload).await;

        if matches!(result, Err(RpcError::ConnectionClosed) | Err(RpcError::Io(_))) {
            // Drop the dead connection so the next call reconnects.
            let mut guard = self.conn.lock().await;
            if let Some(current) = guard.as_ref() {
                if Arc::ptr_eq(current, &conn) {
                    *guard = None;
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("addr", &self.addr).finish()
    }
}

/// Waits for an endpoint to start accepting connections.
///
/// Retries a plain TCP connect every `poll` until `timeout` lapses. Used as
/// the startup readiness probe for spawned sidecar binaries.
pub async fn wait_ready(addr: &str, timeout: Duration, poll: Duration) -> Result<(), RpcError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(_) if tokio::time::Instant::now() + poll < deadline => {
                tokio::time::sleep(poll).await;
            }
            Err(_) => {
                return Err(RpcError::NotReady {
                    addr: addr.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
