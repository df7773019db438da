//! Circuit breaker tracking aggregate failure health for one upstream.
//!
//! # States
//! - Closed: attempts proceed; consecutive failures are counted.
//! - Open: attempts fail fast until the recovery timeout elapses.
//! - HalfOpen: trial attempts are admitted to probe recovery.
//!
//! One breaker instance is deliberately shared (by `Arc`) across every
//! execution targeting the same logical upstream. State, failure counter, and
//! last-failure timestamp are guarded by a single lock so no caller can
//! observe a torn combination of the three. HalfOpen admission is not
//! strictly single-trial: concurrent executions that all observe the expired
//! recovery window are each admitted, and the first recorded outcome decides
//! the next state.

// std
use std::{
	fmt::{Debug, Formatter, Result as FmtResult},
	sync::{Mutex, MutexGuard},
};
// crates.io
use http::StatusCode;
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, transport::FailureClass};

/// Default consecutive-failure threshold before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default wait before an open circuit admits a trial attempt.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Observer invoked on every state transition with `(old, new)`.
///
/// Observer errors are caught and logged; they never corrupt breaker state or
/// abort the call that triggered the transition.
pub type StateObserver = Arc<dyn Fn(CircuitState, CircuitState) -> Result<()> + Send + Sync>;

/// Filter restricting which failure kinds count toward the threshold.
///
/// Kinds rejected by the filter are ignored for breaker purposes; the failure
/// itself still propagates or retries per the retry policy.
pub type FailureFilter = Arc<dyn Fn(&FailureKind) -> bool + Send + Sync>;

/// Kind of terminal failure reported to the breaker.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// The last attempt completed with this response status.
	Status(StatusCode),
	/// The last attempt failed at the transport layer.
	Transport(FailureClass),
}

/// Lifecycle states of the breaker.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
	/// Normal operation; requests pass through.
	Closed,
	/// Upstream assumed down; requests fail fast.
	Open,
	/// Probing whether the upstream recovered.
	HalfOpen,
}

/// Thresholds governing breaker transitions.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
	/// Consecutive failures required to open the circuit.
	pub failure_threshold: u32,
	/// Wait after the last failure before admitting a trial attempt.
	pub recovery_timeout: Duration,
}
impl CircuitBreakerConfig {
	/// Validate invariants for the breaker configuration.
	pub fn validate(&self) -> Result<()> {
		if self.failure_threshold == 0 {
			return Err(Error::Validation {
				field: "circuit_breaker.failure_threshold",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.recovery_timeout.is_zero() {
			return Err(Error::Validation {
				field: "circuit_breaker.recovery_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: DEFAULT_FAILURE_THRESHOLD,
			recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
		}
	}
}

/// Shared, thread-safe failure-health gate for one logical upstream.
pub struct CircuitBreaker {
	config: CircuitBreakerConfig,
	inner: Mutex<Inner>,
	observer: Option<StateObserver>,
	failure_filter: Option<FailureFilter>,
}
impl CircuitBreaker {
	/// Build a breaker, validating the configuration eagerly.
	pub fn new(config: CircuitBreakerConfig) -> Result<Self> {
		config.validate()?;

		Ok(Self {
			config,
			inner: Mutex::new(Inner {
				state: CircuitState::Closed,
				failure_count: 0,
				last_failure_at: None,
			}),
			observer: None,
			failure_filter: None,
		})
	}

	/// Attach a state-change observer.
	pub fn with_observer(mut self, observer: StateObserver) -> Self {
		self.observer = Some(observer);

		self
	}

	/// Restrict which failure kinds count toward the threshold.
	pub fn with_failure_filter(mut self, filter: FailureFilter) -> Self {
		self.failure_filter = Some(filter);

		self
	}

	/// Gate an attempt before the transport operation is invoked.
	///
	/// Returns `Err` with the remaining recovery wait while the circuit is
	/// open; once the recovery timeout has elapsed the circuit moves to
	/// HalfOpen and the attempt is admitted.
	pub fn check(&self) -> std::result::Result<(), Duration> {
		let transition = {
			let mut inner = self.lock();

			match inner.state {
				CircuitState::Closed | CircuitState::HalfOpen => None,
				CircuitState::Open => {
					let elapsed =
						inner.last_failure_at.map(|at| at.elapsed()).unwrap_or(Duration::MAX);

					if elapsed < self.config.recovery_timeout {
						return Err(self.config.recovery_timeout - elapsed);
					}

					inner.transition(CircuitState::HalfOpen)
				},
			}
		};

		self.notify(transition);

		Ok(())
	}

	/// Record a successful execution.
	pub fn record_success(&self) {
		let transition = {
			let mut inner = self.lock();

			match inner.state {
				CircuitState::Closed => {
					inner.failure_count = 0;

					None
				},
				CircuitState::HalfOpen => {
					inner.failure_count = 0;

					inner.transition(CircuitState::Closed)
				},
				// A call admitted before the circuit opened may still succeed;
				// recovery waits for the timeout regardless.
				CircuitState::Open => None,
			}
		};

		self.notify(transition);
	}

	/// Record a failed execution of the given kind.
	pub fn record_failure(&self, kind: FailureKind) {
		if let Some(filter) = &self.failure_filter
			&& !filter(&kind)
		{
			return;
		}

		let transition = {
			let mut inner = self.lock();

			inner.failure_count = inner.failure_count.saturating_add(1);
			inner.last_failure_at = Some(Instant::now());

			match inner.state {
				CircuitState::Closed if inner.failure_count >= self.config.failure_threshold =>
					inner.transition(CircuitState::Open),
				CircuitState::HalfOpen => inner.transition(CircuitState::Open),
				_ => None,
			}
		};

		self.notify(transition);
	}

	/// Force the circuit back to Closed with a clean failure count.
	///
	/// Operator-triggered recovery; calling it repeatedly is a no-op.
	pub fn reset(&self) {
		let transition = {
			let mut inner = self.lock();

			inner.failure_count = 0;
			inner.last_failure_at = None;

			inner.transition(CircuitState::Closed)
		};

		self.notify(transition);
	}

	/// Current state of the circuit.
	pub fn state(&self) -> CircuitState {
		self.lock().state
	}

	/// Current consecutive-failure count.
	pub fn failure_count(&self) -> u32 {
		self.lock().failure_count
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		// A poisoned lock only means another thread panicked mid-update of
		// plain integers; the data remains structurally valid.
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	// Runs outside the lock so an observer touching the breaker cannot deadlock.
	fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
		let Some((old, new)) = transition else {
			return;
		};

		tracing::debug!(?old, ?new, "circuit state change");

		#[cfg(feature = "metrics")]
		crate::metrics::record_circuit_transition(old, new);

		if let Some(observer) = &self.observer
			&& let Err(err) = observer(old, new)
		{
			tracing::warn!(%err, ?old, ?new, "circuit state observer failed");
		}
	}
}
impl Debug for CircuitBreaker {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let inner = self.lock();

		f.debug_struct("CircuitBreaker")
			.field("config", &self.config)
			.field("state", &inner.state)
			.field("failure_count", &inner.failure_count)
			.finish()
	}
}

#[derive(Debug)]
struct Inner {
	state: CircuitState,
	failure_count: u32,
	last_failure_at: Option<Instant>,
}
impl Inner {
	fn transition(&mut self, new: CircuitState) -> Option<(CircuitState, CircuitState)> {
		let old = self.state;

		if old == new {
			return None;
		}

		self.state = new;

		Some((old, new))
	}
}
