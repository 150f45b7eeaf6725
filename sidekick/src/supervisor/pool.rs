//! Sidecar binary process pool.
//!
//! Spawned processes are keyed by executable path and shared between
//! logical services: a second service pointing at the same binary reuses
//! the running process and its port. A process is terminated only when the
//! last referencing service record is removed.
//!
//! Each spawn attaches three tasks: two stdio readers draining stdout and
//! stderr line-by-line into the shared log ring, and an exit watcher that
//! flags every referencing record as crashed if the process exits without
//! having been told to.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rings::{LogEntry, LogLevel, SharedLogRing};

use super::core::SupervisorInner;
use super::record::{ServiceKey, ServiceStatus};

/// Environment variable carrying the assigned port to the sidecar.
pub const SERVICE_PORT_ENV: &str = "SIDEKICK_SERVICE_PORT";

/// Environment variable carrying the auth token to the sidecar.
pub const SERVICE_TOKEN_ENV: &str = "SIDEKICK_SERVICE_TOKEN";

/// One spawned sidecar process.
pub(crate) struct BinaryEntry {
    pub port: u16,
    /// The token the process was launched with. Services that reuse the
    /// process adopt this token, since it is the only one the process knows.
    pub token: String,
    pub pid: Option<u32>,
    /// Cancelling this terminates the process intentionally (no crash flag).
    pub kill: CancellationToken,
}

impl BinaryEntry {
    /// Asks the exit watcher to kill the process.
    pub fn terminate(&self) {
        self.kill.cancel();
    }
}

/// Spawns `path` with the spawn contract: `--port <N>` plus port/token
/// environment variables, piped stdio, and an exit watcher.
///
/// The caller is expected to follow up with a readiness probe before
/// registering the service.
pub(crate) fn spawn_binary(
    inner: Arc<SupervisorInner>,
    key: &ServiceKey,
    path: &Path,
    port: u16,
    token: &str,
) -> io::Result<BinaryEntry> {
    let mut command = Command::new(path);
    command
        .arg("--port")
        .arg(port.to_string())
        .env(SERVICE_PORT_ENV, port.to_string())
        .env(SERVICE_TOKEN_ENV, token)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let pid = child.id();
    info!(service = %key, path = %path.display(), port, pid = ?pid, "spawned sidecar process");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(drain_stdio(
            stdout,
            inner.logs.clone(),
            key.as_str().to_string(),
            LogLevel::Info,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain_stdio(
            stderr,
            inner.logs.clone(),
            key.as_str().to_string(),
            LogLevel::Error,
        ));
    }

    let kill = CancellationToken::new();
    tokio::spawn(watch_exit(inner, child, path.to_path_buf(), kill.clone()));

    Ok(BinaryEntry {
        port,
        token: token.to_string(),
        pid,
        kill,
    })
}

/// Copies one stdio stream into the shared log ring, line by line.
async fn drain_stdio<R: AsyncRead + Unpin>(
    stream: R,
    logs: SharedLogRing,
    service: String,
    level: LogLevel,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        logs.lock()
            .await
            .push(LogEntry::now(service.as_str(), level, line));
    }
}

/// Waits for the process to end, one way or the other.
///
/// A cancelled kill token means the supervisor asked for the termination;
/// anything else is an unexpected exit and flags the referencing records.
async fn watch_exit(
    inner: Arc<SupervisorInner>,
    mut child: Child,
    path: PathBuf,
    kill: CancellationToken,
) {
    let exit = tokio::select! {
        _ = kill.cancelled() => None,
        status = child.wait() => Some(status),
    };

    match exit {
        None => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            debug!(path = %path.display(), "sidecar process terminated");
        }
        Some(status) => {
            let code = status.ok().and_then(|s| s.code());
            handle_unexpected_exit(&inner, &path, code).await;
        }
    }
}

/// Flags every record referencing `path` as crashed.
async fn handle_unexpected_exit(inner: &SupervisorInner, path: &Path, code: Option<i32>) {
    let mut affected: Vec<ServiceKey> = Vec::new();
    {
        let mut state = inner.state.lock().await;
        state.binaries.remove(path);
        for record in state.services.values_mut() {
            if record.binary_path.as_deref() == Some(path) {
                record.crashed = true;
                record.status = ServiceStatus::Outage;
                record.crash_count += 1;
                affected.push(record.key.clone());
            }
        }
    }

    let code_text = code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
    for key in affected {
        warn!(service = %key, code = %code_text, "sidecar process exited unexpectedly");
        inner
            .push_log(LogEntry::now(
                key.as_str(),
                LogLevel::Error,
                format!("Process exited unexpectedly (code {code_text})"),
            ))
            .await;
    }
}
