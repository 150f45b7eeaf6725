//! Read-only status snapshots for the hosting application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rings::ResponseTimeStats;

use super::record::ServiceStatus;

/// Coarse service classification shown in dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Database,
    Api,
    Extension,
}

impl ServiceKind {
    /// Derives the kind from the service key.
    ///
    /// Keys mentioning `db` or `store` classify as databases, `ext` or
    /// `plugin` as extensions, everything else as plain APIs.
    pub fn classify(key: &str) -> Self {
        let key = key.to_ascii_lowercase();
        if key.contains("db") || key.contains("store") {
            ServiceKind::Database
        } else if key.contains("ext") || key.contains("plugin") {
            ServiceKind::Extension
        } else {
            ServiceKind::Api
        }
    }
}

/// A point-in-time snapshot of one registered service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusSnapshot {
    /// The `package.service` key.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub status: ServiceStatus,
    /// Time of the last health check (or of registration before any check).
    pub last_updated: DateTime<Utc>,
    /// Seconds since the service was registered.
    pub uptime: f64,
    pub crash_count: u32,
    pub response_time: ResponseTimeStats,
    /// Milliseconds since the last successful heartbeat, if any.
    pub heartbeat_age: Option<u64>,
    pub is_binary: bool,
    pub description: String,
    pub port: u16,
    /// Process id, present for binary-backed services.
    pub pid: Option<u32>,
}
