//! Supervisor configuration.

use std::time::Duration;

use crate::rings::{LATENCY_RING_CAPACITY, LOG_RING_CAPACITY};

/// Default period between health probe sweeps (5 seconds).
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 5;

/// Default period between crash recovery sweeps (10 seconds).
pub const DEFAULT_CRASH_INTERVAL_SECS: u64 = 10;

/// Default deadline for a spawned sidecar to start accepting connections.
pub const DEFAULT_STARTUP_DEADLINE_SECS: u64 = 4;

/// Default poll interval of the startup readiness probe.
pub const DEFAULT_READY_POLL_MILLIS: u64 = 100;

/// Default cap on crash recovery attempts per service.
pub const DEFAULT_MAX_CRASH_RETRIES: u32 = 5;

/// Tuning knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Period between health probe sweeps.
    pub health_interval: Duration,
    /// Period between crash recovery sweeps.
    pub crash_interval: Duration,
    /// How long a spawned sidecar may take to become ready.
    pub startup_deadline: Duration,
    /// Poll interval of the readiness probe.
    pub ready_poll_interval: Duration,
    /// Crash recovery attempts per service before giving up for good.
    pub max_crash_retries: u32,
    /// Response-time samples retained per service.
    pub latency_capacity: usize,
    /// Log entries retained across all services.
    pub log_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
            crash_interval: Duration::from_secs(DEFAULT_CRASH_INTERVAL_SECS),
            startup_deadline: Duration::from_secs(DEFAULT_STARTUP_DEADLINE_SECS),
            ready_poll_interval: Duration::from_millis(DEFAULT_READY_POLL_MILLIS),
            max_crash_retries: DEFAULT_MAX_CRASH_RETRIES,
            latency_capacity: LATENCY_RING_CAPACITY,
            log_capacity: LOG_RING_CAPACITY,
        }
    }
}

impl SupervisorConfig {
    /// Sets the health sweep period.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Sets the crash sweep period.
    pub fn with_crash_interval(mut self, interval: Duration) -> Self {
        self.crash_interval = interval;
        self
    }

    /// Sets the sidecar startup readiness deadline.
    pub fn with_startup_deadline(mut self, deadline: Duration) -> Self {
        self.startup_deadline = deadline;
        self
    }

    /// Sets the cap on crash recovery attempts.
    pub fn with_max_crash_retries(mut self, retries: u32) -> Self {
        self.max_crash_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.health_interval, Duration::from_secs(5));
        assert_eq!(config.crash_interval, Duration::from_secs(10));
        assert_eq!(config.startup_deadline, Duration::from_secs(4));
        assert_eq!(config.max_crash_retries, 5);
        assert_eq!(config.latency_capacity, 100);
        assert_eq!(config.log_capacity, 1000);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SupervisorConfig::default()
            .with_health_interval(Duration::from_millis(50))
            .with_max_crash_retries(2);
        assert_eq!(config.health_interval, Duration::from_millis(50));
        assert_eq!(config.max_crash_retries, 2);
    }
}
