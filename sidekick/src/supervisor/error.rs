//! Supervisor error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::definition::DefinitionError;

use super::record::ServiceKey;

/// Errors surfaced synchronously by supervisor operations.
///
/// Steady-state failures (health degradation, crashes) are never raised as
/// errors; they are only observable through the status and log snapshots.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The service definition could not be loaded or resolved.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// The configured sidecar executable does not exist.
    #[error("Binary not found: {}", path.display())]
    BinaryNotFound { path: PathBuf },

    /// The sidecar executable exists but could not be spawned.
    #[error("Failed to spawn {}: {source}", path.display())]
    SpawnFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A local RPC server (or the port probe) could not bind.
    #[error("Failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A spawned sidecar never started accepting connections.
    #[error("Service at {address} did not become ready within {timeout_ms} ms")]
    StartupTimeout { address: String, timeout_ms: u64 },

    /// `get_client` was called for an unknown service.
    #[error("Service not started: {key}")]
    ServiceNotStarted { key: ServiceKey },
}
