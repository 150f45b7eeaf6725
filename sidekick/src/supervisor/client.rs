//! Client-side face of the authenticated proxy.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::rings::SharedLatencyRing;
use crate::rpc::{RpcClient, RpcError};

use super::record::{ServiceKey, ServiceRecord};

/// An authenticated client for one supervised service.
///
/// Every call attaches the service's token as `authorization` metadata and
/// records the round-trip latency into the service's response-time ring.
/// Handles are cheap to clone and share the underlying connection.
#[derive(Clone)]
pub struct ServiceClient {
    key: ServiceKey,
    token: String,
    inner: Arc<RpcClient>,
    latencies: SharedLatencyRing,
}

impl ServiceClient {
    pub(crate) fn from_record(record: &ServiceRecord) -> Self {
        Self {
            key: record.key.clone(),
            token: record.token.clone(),
            inner: record.client.clone(),
            latencies: record.latencies.clone(),
        }
    }

    /// The service this client talks to.
    pub fn service(&self) -> &ServiceKey {
        &self.key
    }

    /// The `host:port` endpoint of the service.
    pub fn address(&self) -> &str {
        self.inner.address()
    }

    /// Invokes `method` with the service token attached.
    ///
    /// Round-trip latency is recorded for every completed exchange,
    /// including error frames; transport failures record nothing.
    pub async fn call(&self, method: &str, payload: Value) -> Result<Value, RpcError> {
        let started = Instant::now();
        let result = self.inner.call(method, Some(&self.token), payload).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if matches!(result, Ok(_) | Err(RpcError::Remote { .. })) {
            self.latencies.lock().await.push(elapsed_ms);
        }
        result
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.key)
            .field("address", &self.inner.address())
            .finish()
    }
}
