//! Periodic health monitoring.
//!
//! Every sweep probes each registered service: a `healthCheck` method is
//! invoked if the definition declares one, then `heartbeat` (which also
//! stamps the last-seen time). Failures degrade the observable status and
//! log a warning; they never deregister a service - the next successful
//! probe restores `operational`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::rings::{LogEntry, LogLevel};

use super::client::ServiceClient;
use super::core::SupervisorInner;
use super::record::{ServiceKey, ServiceStatus};

/// Method name a service may expose for liveness checks.
pub(crate) const HEALTH_CHECK_METHOD: &str = "healthCheck";

/// Method name a service may expose for heartbeats.
pub(crate) const HEARTBEAT_METHOD: &str = "heartbeat";

/// Runs health sweeps until cancelled.
pub(crate) async fn run(inner: Arc<SupervisorInner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.config.health_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                sweep(&inner).await;
            }
        }
    }
}

struct Probe {
    key: ServiceKey,
    client: ServiceClient,
    check_health: bool,
    check_heartbeat: bool,
}

/// Probes every registered service once.
///
/// Crashed records are skipped; the crash monitor owns those.
pub(crate) async fn sweep(inner: &SupervisorInner) {
    let probes: Vec<Probe> = {
        let state = inner.state.lock().await;
        state
            .services
            .values()
            .filter(|record| !record.crashed && !record.address.is_empty())
            .map(|record| Probe {
                key: record.key.clone(),
                client: ServiceClient::from_record(record),
                check_health: record.has_method(HEALTH_CHECK_METHOD),
                check_heartbeat: record.has_method(HEARTBEAT_METHOD),
            })
            .collect()
    };

    for probe in probes {
        let mut failure: Option<String> = None;
        let mut heartbeat_seen = false;

        if probe.check_health {
            if let Err(err) = probe.client.call(HEALTH_CHECK_METHOD, Value::Null).await {
                failure = Some(err.to_string());
            }
        }
        if failure.is_none() && probe.check_heartbeat {
            match probe.client.call(HEARTBEAT_METHOD, Value::Null).await {
                Ok(_) => heartbeat_seen = true,
                Err(err) => failure = Some(err.to_string()),
            }
        }

        {
            let mut state = inner.state.lock().await;
            let Some(record) = state.services.get_mut(&probe.key) else {
                continue;
            };
            if record.crashed {
                continue;
            }
            record.last_check = Utc::now();
            if failure.is_none() {
                record.status = ServiceStatus::Operational;
                if heartbeat_seen {
                    record.last_heartbeat = Some(Instant::now());
                }
            } else {
                record.status = ServiceStatus::Degraded;
            }
        }

        if let Some(message) = failure {
            warn!(service = %probe.key, error = %message, "health check failed");
            inner
                .push_log(LogEntry::now(
                    probe.key.as_str(),
                    LogLevel::Warning,
                    format!("Health check failed: {message}"),
                ))
                .await;
        }
    }
}
