//! Periodic crash recovery with bounded retries.
//!
//! A crashed service is recovered by deregistration: the sweep tears the
//! record down so the hosting application can start it again cleanly. Each
//! key gets a capped number of attempts; once the counter saturates the
//! sweep never touches the key again, leaving it visible as an outage until
//! the application restarts.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rings::{LogEntry, LogLevel};

use super::core::SupervisorInner;
use super::record::ServiceKey;

/// Runs crash sweeps until cancelled.
pub(crate) async fn run(inner: Arc<SupervisorInner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.config.crash_interval);
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

/// Applies the bounded-retry policy to every crashed record.
pub(crate) async fn sweep(inner: &SupervisorInner) {
    let max = inner.config.max_crash_retries;
    let mut torn_down: Vec<(ServiceKey, u32)> = Vec::new();

    {
        let mut state = inner.state.lock().await;
        let crashed: Vec<ServiceKey> = state
            .services
            .values()
            .filter(|record| record.crashed)
            .map(|record| record.key.clone())
            .collect();

        for key in crashed {
            let attempts = state.crash_retries.get(&key).copied().unwrap_or(0);
            if attempts >= max {
                debug!(service = %key, attempts, "crash retries exhausted, skipping");
                continue;
            }
            state.crash_retries.insert(key.clone(), attempts + 1);
            state.remove_service(&key);
            torn_down.push((key, attempts + 1));
        }
    }

    for (key, attempt) in torn_down {
        warn!(service = %key, attempt, max, "tearing down crashed service");
        inner
            .push_log(LogEntry::now(
                key.as_str(),
                LogLevel::Warning,
                format!("Crash recovery attempt {attempt}/{max}: service deregistered"),
            ))
            .await;
    }
}
