//! `sidekick run` - start manifest services and supervise them.

use std::path::Path;
use std::time::Duration;

use sidekick::supervisor::{ServiceBackend, StartService, Supervisor, SupervisorConfig};
use tracing::{error, info};

use crate::manifest::Manifest;

/// Starts every manifest service, reports status periodically, and shuts
/// everything down on Ctrl-C.
pub async fn execute(manifest_path: &Path, status_interval: u64) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let supervisor = Supervisor::new(SupervisorConfig::default());

    for entry in &manifest.services {
        let key = format!("{}.{}", entry.package, entry.service);
        let request = StartService {
            definition: manifest.definition.clone(),
            package: entry.package.clone(),
            service: entry.service.clone(),
            backend: ServiceBackend::Binary(entry.binary.clone()),
            port: entry.port,
        };
        match supervisor.start_service(request).await {
            Ok(handle) => {
                info!(service = %key, address = %handle.address, "service started");
            }
            Err(err) => {
                // A failed service stays visible as an outage; keep going.
                error!(service = %key, error = %err, "failed to start service");
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(status_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => print_status(&supervisor).await,
        }
    }

    info!("shutting down");
    supervisor.stop_all_services().await;
    Ok(())
}

async fn print_status(supervisor: &Supervisor) {
    for snapshot in supervisor.service_status().await {
        let pid = snapshot
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string());
        println!(
            "{:<40} {:<12} port {:<6} pid {:<8} avg {:.1} ms",
            snapshot.name,
            snapshot.status.as_str(),
            snapshot.port,
            pid,
            snapshot.response_time.avg,
        );
    }
}
