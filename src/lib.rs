//! Identity-Verification Provider Orchestrator
//!
//! Routes verification sub-tasks (document OCR, face match, liveness,
//! watchlist screening, address/phone verification) to one of several
//! interchangeable external providers while tolerating partial outages.
//!
//! # Features
//!
//! - **Failover**: ranked candidate walk, first success wins
//! - **Circuit breaking**: per-provider three-state breaker with burst detection
//! - **Rate limiting**: per-provider sliding-window admission control
//! - **Retries**: bounded exponential backoff within one provider
//! - **Cost-aware ranking**: optional re-ordering by price, success rate and latency
//! - **Reporting**: per-provider health and windowed cost accrual
//!
//! The concrete transport is injected via the [`transport::ProviderCall`]
//! trait; the orchestrator itself is payload-agnostic and keeps all state
//! in memory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod error;
pub mod failover;
pub mod failsafe;
pub mod orchestrator;
pub mod ranker;
pub mod registry;
pub mod transport;

pub use capability::Capability;
pub use config::{OrchestratorConfig, ProviderDescriptor};
pub use error::{Error, FailureKind, Result};
pub use orchestrator::{ExecuteRequest, Orchestrator, Outcome, RequestPriority};
pub use transport::ProviderCall;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
