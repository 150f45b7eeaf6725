//! Supervisor façade.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::RngCore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::definition::ServiceCatalog;
use crate::net;
use crate::rings::{LatencyRing, LogEntry, LogLevel, LogRing, SharedLogRing};
use crate::rpc::{self, RpcClient, RpcError, ServerOptions, ServiceHandler};

use super::client::ServiceClient;
use super::config::SupervisorConfig;
use super::crash;
use super::error::SupervisorError;
use super::health;
use super::pool::{self, BinaryEntry};
use super::record::{ServiceKey, ServiceRecord, ServiceStatus};
use super::status::{ServiceKind, ServiceStatusSnapshot};

/// How many log entries a log snapshot returns.
const LOG_SNAPSHOT_LIMIT: usize = 100;

/// What a service runs on.
pub enum ServiceBackend {
    /// An implementation hosted inside this process, served over a local
    /// RPC server with the auth wrap applied to every method.
    InProcess(Arc<dyn ServiceHandler>),
    /// An external sidecar executable, spawned (or reused) by the pool.
    Binary(PathBuf),
}

impl fmt::Debug for ServiceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceBackend::InProcess(_) => f.write_str("InProcess"),
            ServiceBackend::Binary(path) => write!(f, "Binary({})", path.display()),
        }
    }
}

/// Arguments to [`Supervisor::start_service`].
#[derive(Debug)]
pub struct StartService {
    /// Path to the service definition file.
    pub definition: PathBuf,
    pub package: String,
    pub service: String,
    pub backend: ServiceBackend,
    /// Fixed port; allocated dynamically when absent.
    pub port: Option<u16>,
}

/// What a successful start returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    /// `host:port` of the service endpoint.
    pub address: String,
    /// Token required on every call to this service.
    pub token: String,
}

/// Mutable registry state.
///
/// Every map lives behind one mutex so that cross-map invariants (a binary
/// entry exists only while records reference it, retry counters follow
/// their keys) hold under concurrent monitors and process callbacks.
pub(crate) struct SupervisorState {
    pub services: HashMap<ServiceKey, ServiceRecord>,
    pub binaries: HashMap<PathBuf, BinaryEntry>,
    pub crash_retries: HashMap<ServiceKey, u32>,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            services: HashMap::new(),
            binaries: HashMap::new(),
            crash_retries: HashMap::new(),
        }
    }

    /// Removes a record, shutting down what it owned.
    ///
    /// The backing process is terminated only when no other record still
    /// references the same executable.
    pub(crate) fn remove_service(&mut self, key: &ServiceKey) -> bool {
        let Some(record) = self.services.remove(key) else {
            return false;
        };
        if let Some(server) = record.server {
            server.shutdown();
        }
        if let Some(path) = record.binary_path {
            let still_referenced = self
                .services
                .values()
                .any(|r| r.binary_path.as_deref() == Some(path.as_path()));
            if !still_referenced {
                if let Some(entry) = self.binaries.remove(&path) {
                    entry.terminate();
                }
            }
        }
        true
    }
}

/// Shared core the monitors and stdio/exit watchers operate on.
pub(crate) struct SupervisorInner {
    pub config: SupervisorConfig,
    pub state: Mutex<SupervisorState>,
    pub logs: SharedLogRing,
}

impl SupervisorInner {
    pub(crate) async fn push_log(&self, entry: LogEntry) {
        self.logs.lock().await.push(entry);
    }
}

/// The service supervisor façade.
///
/// Owns the registry, the binary pool, the log ring, and both periodic
/// monitors. Construct one at application start and call
/// [`stop_all_services`](Supervisor::stop_all_services) during shutdown.
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
    cancel: CancellationToken,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    /// Creates a supervisor and starts its health and crash monitors.
    ///
    /// Must be called from within a Tokio runtime; the monitors are spawned
    /// immediately.
    pub fn new(config: SupervisorConfig) -> Self {
        let inner = Arc::new(SupervisorInner {
            logs: Arc::new(Mutex::new(LogRing::new(config.log_capacity))),
            state: Mutex::new(SupervisorState::new()),
            config,
        });

        let cancel = CancellationToken::new();
        let monitors = vec![
            tokio::spawn(health::run(inner.clone(), cancel.child_token())),
            tokio::spawn(crash::run(inner.clone(), cancel.child_token())),
        ];

        Self {
            inner,
            cancel,
            monitors: Mutex::new(monitors),
        }
    }

    /// Starts (or finds) the service identified by `package.service`.
    ///
    /// Starting an already-registered key is idempotent: it logs a warning
    /// and returns the existing address/token without side effects.
    ///
    /// # Errors
    ///
    /// * [`SupervisorError::Definition`] - the definition file is unreadable
    ///   or does not declare the service.
    /// * [`SupervisorError::BinaryNotFound`] - the executable is missing; a
    ///   synthetic `outage` record is registered for visibility.
    /// * [`SupervisorError::BindFailure`] - the local server (or the port
    ///   probe) could not bind.
    /// * [`SupervisorError::StartupTimeout`] - a spawned sidecar never
    ///   started accepting connections.
    pub async fn start_service(
        &self,
        request: StartService,
    ) -> Result<ServiceHandle, SupervisorError> {
        let key = ServiceKey::new(&request.package, &request.service);
        let mut state = self.inner.state.lock().await;

        if let Some(existing) = state.services.get(&key) {
            warn!(service = %key, "service already started");
            return Ok(ServiceHandle {
                address: existing.address.clone(),
                token: existing.token.clone(),
            });
        }

        let catalog = ServiceCatalog::load(&request.definition)?;
        let spec = catalog.resolve(&request.package, &request.service)?;
        let mut token = generate_token();
        let latencies = Arc::new(Mutex::new(LatencyRing::new(
            self.inner.config.latency_capacity,
        )));

        let (address, port, binary_path, server) = match request.backend {
            ServiceBackend::InProcess(handler) => {
                let port = match request.port {
                    Some(port) => port,
                    None => allocate_port().await?,
                };
                let address = net::loopback_address(port);
                let server = rpc::bind(
                    &address,
                    handler,
                    ServerOptions {
                        expected_token: Some(token.clone()),
                        methods: spec.methods.clone(),
                        latencies: Some(latencies.clone()),
                    },
                )
                .await
                .map_err(|err| SupervisorError::BindFailure {
                    addr: address.clone(),
                    source: io_cause(err),
                })?;
                info!(service = %key, address = %address, "started in-process service");
                (address, port, None, Some(server))
            }

            ServiceBackend::Binary(path) => {
                if !path.exists() {
                    let message = format!("Binary not found: {}", path.display());
                    warn!(service = %key, path = %path.display(), "binary not found");
                    state.services.insert(
                        key.clone(),
                        ServiceRecord {
                            key: key.clone(),
                            address: String::new(),
                            token: token.clone(),
                            port: 0,
                            description: spec.description.clone(),
                            methods: spec.methods.clone(),
                            client: Arc::new(RpcClient::new(String::new())),
                            server: None,
                            binary_path: Some(path.clone()),
                            started_at: Instant::now(),
                            last_check: Utc::now(),
                            last_heartbeat: None,
                            status: ServiceStatus::Outage,
                            crashed: true,
                            crash_count: 0,
                            latencies,
                        },
                    );
                    drop(state);
                    self.inner
                        .push_log(LogEntry::now(key.as_str(), LogLevel::Error, message))
                        .await;
                    return Err(SupervisorError::BinaryNotFound { path });
                }

                let reused = state
                    .binaries
                    .get(&path)
                    .map(|entry| (entry.port, entry.token.clone()));
                let port = match reused {
                    Some((port, shared_token)) => {
                        info!(
                            service = %key,
                            path = %path.display(),
                            port,
                            "reusing running sidecar process"
                        );
                        // The running process only knows the token it was
                        // launched with.
                        token = shared_token;
                        port
                    }
                    None => {
                        let port = match request.port {
                            Some(port) => port,
                            None => allocate_port().await?,
                        };
                        let entry = pool::spawn_binary(
                            self.inner.clone(),
                            &key,
                            &path,
                            port,
                            &token,
                        )
                        .map_err(|source| SupervisorError::SpawnFailure {
                            path: path.clone(),
                            source,
                        })?;

                        let address = net::loopback_address(port);
                        let deadline = self.inner.config.startup_deadline;
                        let poll = self.inner.config.ready_poll_interval;
                        if rpc::wait_ready(&address, deadline, poll).await.is_err() {
                            entry.terminate();
                            drop(state);
                            self.inner
                                .push_log(LogEntry::now(
                                    key.as_str(),
                                    LogLevel::Error,
                                    format!("Service at {address} did not become ready"),
                                ))
                                .await;
                            return Err(SupervisorError::StartupTimeout {
                                address,
                                timeout_ms: deadline.as_millis() as u64,
                            });
                        }
                        state.binaries.insert(path.clone(), entry);
                        port
                    }
                };
                (net::loopback_address(port), port, Some(path), None)
            }
        };

        state.services.insert(
            key.clone(),
            ServiceRecord {
                key: key.clone(),
                address: address.clone(),
                token: token.clone(),
                port,
                description: spec.description.clone(),
                methods: spec.methods.clone(),
                client: Arc::new(RpcClient::new(address.clone())),
                server,
                binary_path,
                started_at: Instant::now(),
                last_check: Utc::now(),
                last_heartbeat: None,
                status: ServiceStatus::Operational,
                crashed: false,
                crash_count: 0,
                latencies,
            },
        );
        drop(state);

        self.inner
            .push_log(LogEntry::now(
                key.as_str(),
                LogLevel::Info,
                format!("Started on {address}"),
            ))
            .await;

        Ok(ServiceHandle { address, token })
    }

    /// Returns an authenticated client for a started service.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ServiceNotStarted`] for unknown keys.
    pub async fn get_client(
        &self,
        package: &str,
        service: &str,
    ) -> Result<ServiceClient, SupervisorError> {
        let key = ServiceKey::new(package, service);
        let state = self.inner.state.lock().await;
        let record = state
            .services
            .get(&key)
            .ok_or_else(|| SupervisorError::ServiceNotStarted { key: key.clone() })?;
        Ok(ServiceClient::from_record(record))
    }

    /// Stops and deregisters a service. A no-op for unknown keys.
    ///
    /// The backing process is terminated only if no other service still
    /// references the same executable.
    pub async fn stop_service(&self, package: &str, service: &str) {
        let key = ServiceKey::new(package, service);
        let removed = self.inner.state.lock().await.remove_service(&key);
        if removed {
            info!(service = %key, "stopped service");
            self.inner
                .push_log(LogEntry::now(key.as_str(), LogLevel::Info, "Service stopped"))
                .await;
        }
    }

    /// Stops the monitors and every service. Idempotent; intended to run
    /// once during application shutdown.
    pub async fn stop_all_services(&self) {
        self.cancel.cancel();
        let monitors: Vec<JoinHandle<()>> = self.monitors.lock().await.drain(..).collect();
        for handle in monitors {
            let _ = handle.await;
        }

        let stopped: Vec<ServiceKey> = {
            let mut state = self.inner.state.lock().await;
            let keys: Vec<ServiceKey> = state.services.keys().cloned().collect();
            for key in &keys {
                state.remove_service(key);
            }
            keys
        };
        for key in &stopped {
            self.inner
                .push_log(LogEntry::now(key.as_str(), LogLevel::Info, "Service stopped"))
                .await;
        }
        if !stopped.is_empty() {
            info!(count = stopped.len(), "stopped all services");
        }
    }

    /// Builds a point-in-time status snapshot of every registered service,
    /// sorted by name.
    pub async fn service_status(&self) -> Vec<ServiceStatusSnapshot> {
        let state = self.inner.state.lock().await;
        let mut snapshots = Vec::with_capacity(state.services.len());
        for record in state.services.values() {
            let pid = record
                .binary_path
                .as_ref()
                .and_then(|path| state.binaries.get(path))
                .and_then(|entry| entry.pid);
            let response_time = record.latencies.lock().await.stats();
            snapshots.push(ServiceStatusSnapshot {
                name: record.key.as_str().to_string(),
                kind: ServiceKind::classify(record.key.as_str()),
                status: record.status,
                last_updated: record.last_check,
                uptime: record.started_at.elapsed().as_secs_f64(),
                crash_count: record.crash_count,
                response_time,
                heartbeat_age: record
                    .last_heartbeat
                    .map(|seen| seen.elapsed().as_millis() as u64),
                is_binary: record.is_binary(),
                description: record.description.clone(),
                port: record.port,
                pid,
            });
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Returns the most recent captured log entries (at most 100).
    pub async fn service_logs(&self) -> Vec<LogEntry> {
        self.inner.logs.lock().await.tail(LOG_SNAPSHOT_LIMIT)
    }

    /// Returns the registered service keys, sorted.
    pub async fn list_services(&self) -> Vec<ServiceKey> {
        let state = self.inner.state.lock().await;
        let mut keys: Vec<ServiceKey> = state.services.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Runs one health sweep immediately, outside the monitor schedule.
    pub async fn run_health_checks(&self) {
        health::sweep(&self.inner).await;
    }

    /// Runs one crash recovery sweep immediately, outside the monitor
    /// schedule.
    pub async fn run_crash_sweep(&self) {
        crash::sweep(&self.inner).await;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 16 random bytes, hex-encoded: the per-service shared secret.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn allocate_port() -> Result<u16, SupervisorError> {
    net::ephemeral_port()
        .await
        .map_err(|source| SupervisorError::BindFailure {
            addr: format!("{}:0", net::LOOPBACK_HOST),
            source,
        })
}

fn io_cause(err: RpcError) -> std::io::Error {
    match err {
        RpcError::Io(source) => source,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}
