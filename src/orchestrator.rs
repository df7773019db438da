//! The attempt loop composing backoff, decision policy, time budgets,
//! circuit breaking, and lifecycle callbacks.

// std
use std::future::Future;
// crates.io
use http::StatusCode;
use tokio::time;
// self
use crate::{
	_prelude::*,
	backoff::BackoffDecision,
	breaker::{CircuitBreaker, FailureKind},
	error::BoxError,
	hooks::{AttemptNotice, CallbackSet, FailureNotice, RetryNotice, SuccessNotice},
	policy::{AttemptOutcome, RetryPolicy, Verdict},
	transport::{ClassifyError, FailureClass, RequestDescriptor, TransportResponse, retry_after_hint},
};

/// Wall-clock ceiling over one execution, checked only before sleeping.
#[derive(Clone, Debug, Copy)]
struct TimeBudget {
	started_at: Instant,
	limit: Option<Duration>,
}
impl TimeBudget {
	fn start(limit: Option<Duration>) -> Self {
		Self { started_at: Instant::now(), limit }
	}

	fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}

	/// The configured ceiling, once elapsed time has reached it.
	fn exceeded(&self) -> Option<Duration> {
		self.limit.filter(|limit| self.elapsed() >= *limit)
	}
}

/// Drives a fallible transport operation to completion under a retry policy.
///
/// The orchestrator holds no cross-invocation state: each [`execute`] call
/// owns its own attempt counter, budget, and last-outcome bookkeeping. The
/// policy and callback set are shared read-only; the optional circuit breaker
/// is the only shared mutable collaborator.
///
/// [`execute`]: Self::execute
#[derive(Clone, Debug)]
pub struct RetryOrchestrator {
	policy: RetryPolicy,
	breaker: Option<Arc<CircuitBreaker>>,
	callbacks: CallbackSet,
	breaker_counts_success_statuses: bool,
}
impl RetryOrchestrator {
	/// Build an orchestrator from a policy, validating it eagerly.
	pub fn new(policy: RetryPolicy) -> Result<Self> {
		Self::builder(policy).build()
	}

	/// Create a [`RetryOrchestratorBuilder`] for advanced configuration.
	pub fn builder(policy: RetryPolicy) -> RetryOrchestratorBuilder {
		RetryOrchestratorBuilder {
			policy,
			breaker: None,
			callbacks: CallbackSet::new(),
			breaker_counts_success_statuses: false,
		}
	}

	/// The policy governing this orchestrator.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// The shared breaker handle, when one is configured.
	pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
		self.breaker.as_ref()
	}

	/// Execute the operation until it succeeds, fails terminally, or runs out
	/// of attempts or time.
	///
	/// The loop suspends at exactly one point, the backoff sleep. Total
	/// transport invocations never exceed `max_retries + 1`, and the
	/// breaker's fail-fast path never invokes the operation at all.
	pub async fn execute<F, Fut, R, E>(
		&self,
		request: &RequestDescriptor,
		mut operation: F,
	) -> Result<R>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<R, E>>,
		R: TransportResponse,
		E: std::error::Error + ClassifyError + Send + Sync + 'static,
	{
		let budget = TimeBudget::start(self.policy.max_total_time);
		let max_retries = self.policy.max_retries;
		let mut attempt = 0u32;
		let mut last_status: Option<StatusCode> = None;
		let mut last_error: Option<E> = None;

		loop {
			if let Some(breaker) = &self.breaker
				&& let Err(retry_in) = breaker.check()
			{
				let error = Error::CircuitOpen {
					method: request.method.clone(),
					url: request.url.clone(),
					retry_in,
				};

				return self.fail(request, attempt, last_status, budget.elapsed(), error);
			}

			self.callbacks.request(request, &AttemptNotice { attempt: attempt + 1, max_retries })?;

			#[cfg(feature = "metrics")]
			crate::metrics::record_attempt(&request.method);

			let retry_after = match operation().await {
				Ok(response) => {
					let status = response.status();

					match self.policy.verdict(&AttemptOutcome::Status(status)) {
						Verdict::Succeed => {
							if let Some(breaker) = &self.breaker {
								breaker.record_success();
							}

							let elapsed = budget.elapsed();

							tracing::debug!(
								attempt = attempt + 1,
								status = %status,
								?elapsed,
								"request succeeded"
							);

							#[cfg(feature = "metrics")]
							crate::metrics::record_outcome(&request.method, "success");

							self.callbacks.success(request, &SuccessNotice {
								attempt: attempt + 1,
								max_retries,
								status,
								elapsed,
							})?;

							return Ok(response);
						},
						Verdict::Retry => {
							let hint = retry_after_hint(response.headers());

							last_status = Some(status);
							last_error = None;

							hint
						},
						Verdict::Fail => {
							self.record_breaker_failure(FailureKind::Status(status));

							let error = Error::NonRetryableStatus {
								method: request.method.clone(),
								url: request.url.clone(),
								status,
								attempt: attempt + 1,
							};

							return self.fail(
								request,
								attempt,
								Some(status),
								budget.elapsed(),
								error,
							);
						},
					}
				},
				Err(error) => {
					let class = error.classify();
					let verdict =
						self.policy.verdict(&AttemptOutcome::Failure { class, error: &error });

					if verdict == Verdict::Retry {
						last_status = None;
						last_error = Some(error);

						None
					} else {
						// Transient failures refused by the predicate still
						// count against upstream health; usage errors do not.
						if class.is_transient() {
							self.record_breaker_failure(FailureKind::Transport(class));
						}

						let error = Error::Transport {
							method: request.method.clone(),
							url: request.url.clone(),
							attempt: attempt + 1,
							class,
							source: Box::new(error),
						};

						return self.fail(request, attempt, None, budget.elapsed(), error);
					}
				},
			};

			// The outcome is retryable; decide whether any budget remains.
			if attempt >= max_retries {
				self.record_terminal_failure(last_status, last_error.as_ref().map(E::classify));

				let error = Error::RetriesExhausted {
					method: request.method.clone(),
					url: request.url.clone(),
					attempts: attempt + 1,
					elapsed: budget.elapsed(),
					last_status,
					source: last_error.take().map(|error| Box::new(error) as BoxError),
				};

				return self.fail(request, attempt, last_status, budget.elapsed(), error);
			}
			if let Some(limit) = budget.exceeded() {
				self.record_terminal_failure(last_status, last_error.as_ref().map(E::classify));

				let error = Error::BudgetExceeded {
					method: request.method.clone(),
					url: request.url.clone(),
					budget: limit,
					elapsed: budget.elapsed(),
					attempts: attempt + 1,
					last_status,
					source: last_error.take().map(|error| Box::new(error) as BoxError),
				};

				return self.fail(request, attempt, last_status, budget.elapsed(), error);
			}

			let decision = BackoffDecision::resolve(&self.policy, attempt, retry_after);

			self.callbacks.retry(request, &RetryNotice {
				next_attempt: attempt + 2,
				max_retries,
				delay: decision.sleep,
				last_status,
				last_error: last_error
					.as_ref()
					.map(|error| error as &(dyn std::error::Error + 'static)),
			})?;

			#[cfg(feature = "metrics")]
			crate::metrics::record_retry(&request.method, decision.sleep);

			time::sleep(decision.sleep).await;

			attempt += 1;
		}
	}

	/// Drive a synchronous operation through the same loop, blocking the
	/// calling thread for backoff sleeps.
	pub fn execute_blocking<F, R, E>(
		&self,
		request: &RequestDescriptor,
		mut operation: F,
	) -> Result<R>
	where
		F: FnMut() -> std::result::Result<R, E>,
		R: TransportResponse,
		E: std::error::Error + ClassifyError + Send + Sync + 'static,
	{
		let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;

		runtime.block_on(self.execute(request, || std::future::ready(operation())))
	}

	fn record_breaker_failure(&self, kind: FailureKind) {
		if let Some(breaker) = &self.breaker {
			breaker.record_failure(kind);
		}
	}

	// Failure recording for the exhausted/budget paths, keyed on whatever the
	// last attempt produced. Success statuses forced into retrying by a
	// predicate only count when explicitly configured to.
	fn record_terminal_failure(&self, last_status: Option<StatusCode>, last_class: Option<FailureClass>) {
		let kind = if let Some(status) = last_status {
			if status.as_u16() < 400 && !self.breaker_counts_success_statuses {
				return;
			}

			FailureKind::Status(status)
		} else if let Some(class) = last_class {
			FailureKind::Transport(class)
		} else {
			return;
		};

		self.record_breaker_failure(kind);
	}

	fn fail<R>(
		&self,
		request: &RequestDescriptor,
		attempt: u32,
		last_status: Option<StatusCode>,
		elapsed: Duration,
		error: Error,
	) -> Result<R> {
		tracing::debug!(attempt = attempt + 1, %error, "request failed");

		#[cfg(feature = "metrics")]
		crate::metrics::record_outcome(&request.method, "failure");

		self.callbacks.failure(request, &FailureNotice {
			attempt: attempt + 1,
			max_retries: self.policy.max_retries,
			last_status,
			error: &error,
			elapsed,
		})?;

		Err(error)
	}
}

/// Builder for [`RetryOrchestrator`] wiring optional collaborators.
#[derive(Debug)]
pub struct RetryOrchestratorBuilder {
	policy: RetryPolicy,
	breaker: Option<Arc<CircuitBreaker>>,
	callbacks: CallbackSet,
	breaker_counts_success_statuses: bool,
}
impl RetryOrchestratorBuilder {
	/// Share a circuit breaker across every execution of this orchestrator.
	pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
		self.breaker = Some(breaker);

		self
	}

	/// Attach lifecycle callbacks.
	pub fn callbacks(mut self, callbacks: CallbackSet) -> Self {
		self.callbacks = callbacks;

		self
	}

	/// Count exhausted runs whose last outcome was a success status (retried
	/// only at a predicate's request) as breaker failures. Off by default.
	pub fn breaker_counts_success_statuses(mut self, value: bool) -> Self {
		self.breaker_counts_success_statuses = value;

		self
	}

	/// Finalise the configuration, validating the policy.
	pub fn build(self) -> Result<RetryOrchestrator> {
		self.policy.validate()?;

		Ok(RetryOrchestrator {
			policy: self.policy,
			breaker: self.breaker,
			callbacks: self.callbacks,
			breaker_counts_success_statuses: self.breaker_counts_success_statuses,
		})
	}
}
