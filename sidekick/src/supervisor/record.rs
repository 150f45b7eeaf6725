//! Registry record types.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rings::SharedLatencyRing;
use crate::rpc::{RpcClient, RpcServerHandle};

/// Identity of a logical service: `"{package}.{service}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Builds the key for a package/service pair.
    pub fn new(package: &str, service: &str) -> Self {
        Self(format!("{package}.{service}"))
    }

    /// The `"{package}.{service}"` string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable availability of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Healthy and answering probes.
    Operational,
    /// Registered but failing health probes.
    Degraded,
    /// Unavailable: failed to start, or its process exited.
    Outage,
}

impl ServiceStatus {
    /// Returns the string form used in status snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Operational => "operational",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Outage => "outage",
        }
    }
}

/// One registered service.
///
/// Created by `start_service`, mutated by the call proxies (latency
/// samples), the health monitor (`status`, `last_check`, `last_heartbeat`),
/// and the binary pool's exit watcher (`crashed`, `crash_count`); removed by
/// `stop_service` or a crash-monitor teardown.
pub(crate) struct ServiceRecord {
    pub key: ServiceKey,
    /// `host:port`, or empty if the service never started.
    pub address: String,
    /// Current shared secret; required on every call.
    pub token: String,
    pub port: u16,
    pub description: String,
    /// Methods from the service definition.
    pub methods: Vec<String>,
    /// Client handle calls are issued through.
    pub client: Arc<RpcClient>,
    /// Local RPC server, present for in-process services.
    pub server: Option<RpcServerHandle>,
    /// Executable backing this service, present for binary services.
    pub binary_path: Option<PathBuf>,
    pub started_at: Instant,
    pub last_check: DateTime<Utc>,
    pub last_heartbeat: Option<Instant>,
    pub status: ServiceStatus,
    pub crashed: bool,
    pub crash_count: u32,
    /// Rolling response-time samples in milliseconds.
    pub latencies: SharedLatencyRing,
}

impl ServiceRecord {
    /// Returns true if this record is backed by a spawned process.
    pub fn is_binary(&self) -> bool {
        self.binary_path.is_some()
    }

    /// Returns true if the definition declares the named method.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_key_format() {
        let key = ServiceKey::new("system", "ImageConverter");
        assert_eq!(key.as_str(), "system.ImageConverter");
        assert_eq!(key.to_string(), "system.ImageConverter");
    }

    #[test]
    fn test_service_key_equality() {
        assert_eq!(
            ServiceKey::new("system", "A"),
            ServiceKey::new("system", "A")
        );
        assert_ne!(ServiceKey::new("system", "A"), ServiceKey::new("other", "A"));
    }

    #[test]
    fn test_status_string_forms() {
        assert_eq!(ServiceStatus::Operational.as_str(), "operational");
        assert_eq!(ServiceStatus::Degraded.as_str(), "degraded");
        assert_eq!(ServiceStatus::Outage.as_str(), "outage");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ServiceStatus::Outage).unwrap();
        assert_eq!(json, "\"outage\"");
    }
}
