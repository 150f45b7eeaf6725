//! Service supervisor.
//!
//! The supervisor owns every supervised service: it starts them (in-process
//! handlers or spawned sidecar binaries), authenticates calls with
//! per-service tokens, monitors health on a fixed period, applies a
//! bounded-retry policy to crashed services, and exposes read-only status
//! and log snapshots for the hosting application's dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                      │
//! │  - registry: ServiceKey -> ServiceRecord                         │
//! │  - binary pool: executable path -> BinaryEntry (shared process)  │
//! │  - crash retry counters (capped)                                 │
//! │  - log ring (capacity 1000)                                      │
//! │                                                                  │
//! │  HealthMonitor (~5s)  ──► probe healthCheck/heartbeat per record │
//! │  CrashMonitor  (~10s) ──► bounded teardown of crashed records    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod config;
mod core;
mod crash;
mod error;
mod health;
mod pool;
mod record;
mod status;

pub use client::ServiceClient;
pub use config::SupervisorConfig;
pub use error::SupervisorError;
pub use pool::{SERVICE_PORT_ENV, SERVICE_TOKEN_ENV};
pub use record::{ServiceKey, ServiceStatus};
pub use self::core::{ServiceBackend, ServiceHandle, StartService, Supervisor};
pub use status::{ServiceKind, ServiceStatusSnapshot};
