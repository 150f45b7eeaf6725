//! Sidekick - supervisor for authenticated sidecar services.
//!
//! This library manages the lifecycle of local "sidecar" services: external
//! worker binaries and in-process handlers that a desktop application
//! delegates CPU-heavy or OS-privileged work to. Services are reached over a
//! loopback RPC protocol and authenticated with a per-service token.
//!
//! # High-Level API
//!
//! The [`supervisor`] module provides the façade most applications use:
//!
//! ```ignore
//! use sidekick::supervisor::{Supervisor, SupervisorConfig, StartService, ServiceBackend};
//!
//! let supervisor = Supervisor::new(SupervisorConfig::default());
//!
//! let handle = supervisor
//!     .start_service(StartService {
//!         definition: "services.json".into(),
//!         package: "system".into(),
//!         service: "ImageConverter".into(),
//!         backend: ServiceBackend::Binary("resources/builds/system".into()),
//!         port: None,
//!     })
//!     .await?;
//!
//! let client = supervisor.get_client("system", "ImageConverter").await?;
//! let reply = client.call("convert", serde_json::json!({"path": "in.png"})).await?;
//!
//! // At application shutdown:
//! supervisor.stop_all_services().await;
//! ```

pub mod definition;
pub mod logging;
pub mod net;
pub mod rings;
pub mod rpc;
pub mod supervisor;

/// Version of the sidekick library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
