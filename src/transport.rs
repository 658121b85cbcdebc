//! The injected "call provider" capability
//!
//! The orchestrator never speaks HTTP/RPC itself. The platform's transport
//! layer supplies an implementation of [`ProviderCall`]; the orchestrator
//! hands it an endpoint reference, a credentials reference, the opaque
//! payload and a deadline, and classifies whatever comes back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Transport capability for reaching one provider endpoint
///
/// Implementations must map their failures onto the crate error taxonomy:
/// [`crate::Error::ProviderTimeout`], [`crate::Error::ProviderTransport`] or
/// [`crate::Error::ProviderRejected`]. Any other error variant is treated as
/// a transport fault for circuit-breaker purposes. The orchestrator
/// additionally enforces `timeout` on its side, so a misbehaving
/// implementation cannot stall a request past its deadline.
#[async_trait]
pub trait ProviderCall: Send + Sync {
    /// Perform one call against a provider endpoint
    async fn call(
        &self,
        endpoint: &str,
        credentials_ref: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value>;
}
