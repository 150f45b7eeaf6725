//! Integration tests for in-process services.
//!
//! These cover the supervisor façade end-to-end with handlers hosted in
//! this process: idempotent starts, per-call authentication, health
//! monitoring, and the status/log snapshot surface.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sidekick::rpc::{ErrorCode, HandlerError, RpcClient, RpcError, ServiceHandler};
use sidekick::supervisor::{
    ServiceBackend, ServiceStatus, StartService, Supervisor, SupervisorConfig, SupervisorError,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A handler that counts invocations and optionally fails health probes.
struct CountingHandler {
    calls: Arc<AtomicUsize>,
    fail_health: bool,
}

impl CountingHandler {
    fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                calls: calls.clone(),
                fail_health: false,
            }),
            calls,
        )
    }

    fn failing_health() -> Arc<Self> {
        Arc::new(Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_health: true,
        })
    }
}

#[async_trait]
impl ServiceHandler for CountingHandler {
    async fn invoke(&self, method: &str, payload: Value) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if method == "healthCheck" && self.fail_health {
            return Err(HandlerError::Internal("probe failed".into()));
        }
        match method {
            "convert" => Ok(json!({"converted": true, "input": payload})),
            "healthCheck" | "heartbeat" => Ok(json!({"ok": true})),
            other => Err(HandlerError::MethodNotFound(other.to_string())),
        }
    }
}

fn write_definition(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("services.json");
    std::fs::write(
        &path,
        r#"{
            "packages": [
                {
                    "name": "system",
                    "services": [
                        {
                            "name": "ImageConverter",
                            "description": "Converts images between formats",
                            "methods": ["convert", "healthCheck", "heartbeat"]
                        },
                        {
                            "name": "Probe",
                            "methods": ["healthCheck"]
                        },
                        {
                            "name": "Quiet",
                            "methods": ["convert"]
                        }
                    ]
                }
            ]
        }"#,
    )
    .unwrap();
    path
}

/// A supervisor whose monitors never fire on their own; sweeps run manually.
fn quiet_supervisor() -> Supervisor {
    Supervisor::new(
        SupervisorConfig::default()
            .with_health_interval(Duration::from_secs(3600))
            .with_crash_interval(Duration::from_secs(3600)),
    )
}

fn start_request(definition: PathBuf, service: &str, handler: Arc<dyn ServiceHandler>) -> StartService {
    StartService {
        definition,
        package: "system".into(),
        service: service.into(),
        backend: ServiceBackend::InProcess(handler),
        port: None,
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn test_start_service_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    let first = supervisor
        .start_service(start_request(definition.clone(), "ImageConverter", handler.clone()))
        .await
        .unwrap();
    let second = supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.token.len(), 32);
    assert!(first.token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(supervisor.list_services().await.len(), 1);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_calls_without_valid_token_never_reach_handler() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, calls) = CountingHandler::new();

    let handle = supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();

    // A caller presenting the wrong (or no) token is rejected at the wrap.
    let raw = RpcClient::new(handle.address.clone());
    let err = raw
        .call("convert", Some("not-the-token"), Value::Null)
        .await
        .unwrap_err();
    assert!(err.is_unauthenticated());
    let err = raw.call("convert", None, Value::Null).await.unwrap_err();
    assert!(err.is_unauthenticated());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Rejections do not change the observable status.
    let status = supervisor.service_status().await;
    assert_eq!(status[0].status, ServiceStatus::Operational);

    // The supervised client authenticates and gets through.
    let client = supervisor.get_client("system", "ImageConverter").await.unwrap();
    let reply = client.call("convert", json!({"path": "in.png"})).await.unwrap();
    assert_eq!(reply["converted"], json!(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_undeclared_method_is_rejected() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, calls) = CountingHandler::new();

    supervisor
        .start_service(start_request(definition, "Quiet", handler))
        .await
        .unwrap();

    let client = supervisor.get_client("system", "Quiet").await.unwrap();
    let err = client.call("reboot", Value::Null).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::Remote {
            code: ErrorCode::MethodNotFound,
            ..
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_unknown_definition_entry_fails_start() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    let err = supervisor
        .start_service(start_request(definition, "NoSuchService", handler))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Service not found: system.NoSuchService");
    assert!(supervisor.list_services().await.is_empty());
}

#[tokio::test]
async fn test_occupied_port_fails_with_bind_error() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut request = start_request(definition, "ImageConverter", handler);
    request.port = Some(port);
    let err = supervisor.start_service(request).await.unwrap_err();
    assert!(matches!(err, SupervisorError::BindFailure { .. }));
    assert!(supervisor.list_services().await.is_empty());
}

#[tokio::test]
async fn test_get_client_for_unknown_service() {
    let supervisor = quiet_supervisor();
    let err = supervisor.get_client("system", "Ghost").await.unwrap_err();
    assert_eq!(err.to_string(), "Service not started: system.Ghost");
}

#[tokio::test]
async fn test_health_sweep_degrades_and_recovers_status() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();

    supervisor
        .start_service(start_request(
            definition,
            "Probe",
            CountingHandler::failing_health(),
        ))
        .await
        .unwrap();

    supervisor.run_health_checks().await;

    let status = supervisor.service_status().await;
    assert_eq!(status[0].status, ServiceStatus::Degraded);

    let logs = supervisor.service_logs().await;
    assert!(logs
        .iter()
        .any(|entry| entry.message.contains("Health check failed")));

    // A failed probe does not deregister the service.
    assert_eq!(supervisor.list_services().await.len(), 1);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_health_sweep_stamps_heartbeat() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();

    let before = supervisor.service_status().await;
    assert_eq!(before[0].heartbeat_age, None);

    supervisor.run_health_checks().await;

    let after = supervisor.service_status().await;
    assert_eq!(after[0].status, ServiceStatus::Operational);
    assert!(after[0].heartbeat_age.is_some());

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_latency_samples_feed_status_snapshot() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();
    let client = supervisor.get_client("system", "ImageConverter").await.unwrap();

    for i in 0..10 {
        client.call("convert", json!({"frame": i})).await.unwrap();
    }

    let status = supervisor.service_status().await;
    let stats = status[0].response_time;
    assert!(stats.avg > 0.0);
    assert!(stats.min > 0.0);
    assert!(stats.max >= stats.min);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_status_snapshot_shape() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    let handle = supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();

    let status = supervisor.service_status().await;
    assert_eq!(status.len(), 1);
    let snapshot = &status[0];
    assert_eq!(snapshot.name, "system.ImageConverter");
    assert_eq!(snapshot.description, "Converts images between formats");
    assert!(!snapshot.is_binary);
    assert_eq!(snapshot.pid, None);
    assert!(handle.address.ends_with(&snapshot.port.to_string()));
    assert!(snapshot.uptime >= 0.0);
    assert_eq!(snapshot.crash_count, 0);

    let logs = supervisor.service_logs().await;
    assert!(logs.iter().any(|entry| entry.message.contains("Started on")));
    assert!(logs.len() <= 100);

    supervisor.stop_all_services().await;
}

#[tokio::test]
async fn test_stopped_service_is_forgotten() {
    let dir = TempDir::new().unwrap();
    let definition = write_definition(&dir);
    let supervisor = quiet_supervisor();
    let (handler, _) = CountingHandler::new();

    supervisor
        .start_service(start_request(definition, "ImageConverter", handler))
        .await
        .unwrap();
    supervisor.stop_service("system", "ImageConverter").await;

    assert!(supervisor.list_services().await.is_empty());
    assert!(supervisor
        .get_client("system", "ImageConverter")
        .await
        .is_err());
}
