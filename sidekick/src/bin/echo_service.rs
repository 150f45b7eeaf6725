//! Reference sidecar binary.
//!
//! A minimal service honoring the supervisor's spawn contract: it reads the
//! assigned port from `--port`, the auth token from the environment, serves
//! the loopback RPC protocol, and answers `ping`, `echo`, `healthCheck`,
//! and `heartbeat`. Used by integration tests and as a demo sidecar.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use sidekick::rpc::{self, HandlerError, RpcError, ServerOptions, ServiceHandler};
use sidekick::supervisor::SERVICE_TOKEN_ENV;

#[derive(Parser)]
#[command(name = "echo_service", about = "Echo sidecar for sidekick tests and demos")]
struct Args {
    /// Port to listen on.
    #[arg(long)]
    port: u16,
}

struct EchoService;

#[async_trait]
impl ServiceHandler for EchoService {
    async fn invoke(&self, method: &str, payload: Value) -> Result<Value, HandlerError> {
        match method {
            "ping" => Ok(json!({"pong": true})),
            "echo" => Ok(payload),
            "healthCheck" => Ok(json!({"ok": true})),
            "heartbeat" => Ok(json!({"ok": true, "at": chrono::Utc::now().to_rfc3339()})),
            other => Err(HandlerError::MethodNotFound(other.to_string())),
        }
    }
}

async fn run(args: Args) -> Result<(), RpcError> {
    // Without a token in the environment the service runs open; the
    // supervisor always provides one.
    let token = std::env::var(SERVICE_TOKEN_ENV).ok();
    let addr = format!("127.0.0.1:{}", args.port);

    let server = rpc::bind(&addr, Arc::new(EchoService), ServerOptions {
        expected_token: token,
        ..Default::default()
    })
    .await?;

    println!("echo service listening on {}", server.local_addr());
    server.wait().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("echo service failed: {err}");
        std::process::exit(1);
    }
}
