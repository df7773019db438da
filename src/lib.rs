//! Composable retry orchestration with pluggable backoff, time budgets, and
//! circuit breaking for fallible HTTP operations — built for modern Rust
//! service clients.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod backoff;
pub mod breaker;
pub mod hooks;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod transport;

mod error;
mod orchestrator;
mod policy;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

pub use crate::{
	backoff::{BackoffDecision, BackoffStrategy, CustomBackoff},
	breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, FailureKind},
	error::{BoxError, Error, Result},
	hooks::CallbackSet,
	orchestrator::{RetryOrchestrator, RetryOrchestratorBuilder},
	policy::{AttemptOutcome, RetryPolicy, RetryPredicate, Verdict, default_retry_statuses, status_set},
	transport::{ClassifyError, FailureClass, RequestDescriptor, TransportResponse},
};
