//! Lifecycle callbacks dispatched around the attempt loop.
//!
//! All four hooks are optional and independently configurable. Attempt
//! numbers in every payload are 1-indexed, even though the engine's internal
//! loop counter is zero-indexed. Hook errors propagate and abort the call;
//! user bugs in callbacks are not resilience targets.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use http::StatusCode;
// self
use crate::{_prelude::*, transport::RequestDescriptor};

/// Hook invoked before every attempt, including the first.
pub type RequestHook =
	Arc<dyn Fn(&RequestDescriptor, &AttemptNotice) -> Result<()> + Send + Sync>;
/// Hook invoked before each backoff sleep that precedes a retry.
pub type RetryHook =
	Arc<dyn Fn(&RequestDescriptor, &RetryNotice<'_>) -> Result<()> + Send + Sync>;
/// Hook invoked exactly once when an execution succeeds.
pub type SuccessHook =
	Arc<dyn Fn(&RequestDescriptor, &SuccessNotice) -> Result<()> + Send + Sync>;
/// Hook invoked exactly once when an execution fails, including the
/// fail-fast and budget-abort paths.
pub type FailureHook =
	Arc<dyn Fn(&RequestDescriptor, &FailureNotice<'_>) -> Result<()> + Send + Sync>;

/// Payload for [`RequestHook`].
#[derive(Clone, Debug)]
pub struct AttemptNotice {
	/// 1-indexed number of the attempt about to run.
	pub attempt: u32,
	/// Configured retry ceiling.
	pub max_retries: u32,
}

/// Payload for [`RetryHook`].
///
/// `next_attempt` previews the attempt that will run after the sleep, not
/// the one that just failed.
#[derive(Debug)]
pub struct RetryNotice<'a> {
	/// 1-indexed number of the upcoming attempt.
	pub next_attempt: u32,
	/// Configured retry ceiling.
	pub max_retries: u32,
	/// Fully resolved sleep about to be performed.
	pub delay: Duration,
	/// Status observed on the attempt that triggered this retry, if any.
	pub last_status: Option<StatusCode>,
	/// Transport error observed on the attempt that triggered this retry, if any.
	pub last_error: Option<&'a (dyn std::error::Error + 'static)>,
}

/// Payload for [`SuccessHook`].
#[derive(Clone, Debug)]
pub struct SuccessNotice {
	/// 1-indexed number of the succeeding attempt.
	pub attempt: u32,
	/// Configured retry ceiling.
	pub max_retries: u32,
	/// Status of the successful response.
	pub status: StatusCode,
	/// Wall-clock time spent across all attempts and sleeps.
	pub elapsed: Duration,
}

/// Payload for [`FailureHook`].
#[derive(Debug)]
pub struct FailureNotice<'a> {
	/// 1-indexed number of the final attempt (1 when no attempt was admitted).
	pub attempt: u32,
	/// Configured retry ceiling.
	pub max_retries: u32,
	/// Status observed on the last completed attempt, if any.
	pub last_status: Option<StatusCode>,
	/// The terminal error about to be returned to the caller.
	pub error: &'a Error,
	/// Wall-clock time spent across all attempts and sleeps.
	pub elapsed: Duration,
}

/// Immutable set of lifecycle hooks, shared read-only across executions.
#[derive(Clone, Default)]
pub struct CallbackSet {
	on_request: Option<RequestHook>,
	on_retry: Option<RetryHook>,
	on_success: Option<SuccessHook>,
	on_failure: Option<FailureHook>,
}
impl CallbackSet {
	/// Create an empty set; every dispatch is a no-op until hooks are added.
	pub fn new() -> Self {
		Self::default()
	}

	/// Observe every attempt before it runs.
	pub fn on_request<F>(mut self, hook: F) -> Self
	where
		F: Fn(&RequestDescriptor, &AttemptNotice) -> Result<()> + Send + Sync + 'static,
	{
		self.on_request = Some(Arc::new(hook));

		self
	}

	/// Observe each retry decision before its backoff sleep.
	pub fn on_retry<F>(mut self, hook: F) -> Self
	where
		F: Fn(&RequestDescriptor, &RetryNotice<'_>) -> Result<()> + Send + Sync + 'static,
	{
		self.on_retry = Some(Arc::new(hook));

		self
	}

	/// Observe the single successful completion.
	pub fn on_success<F>(mut self, hook: F) -> Self
	where
		F: Fn(&RequestDescriptor, &SuccessNotice) -> Result<()> + Send + Sync + 'static,
	{
		self.on_success = Some(Arc::new(hook));

		self
	}

	/// Observe the single terminal failure.
	pub fn on_failure<F>(mut self, hook: F) -> Self
	where
		F: Fn(&RequestDescriptor, &FailureNotice<'_>) -> Result<()> + Send + Sync + 'static,
	{
		self.on_failure = Some(Arc::new(hook));

		self
	}

	pub(crate) fn request(&self, request: &RequestDescriptor, notice: &AttemptNotice) -> Result<()> {
		match &self.on_request {
			Some(hook) => hook(request, notice),
			None => Ok(()),
		}
	}

	pub(crate) fn retry(&self, request: &RequestDescriptor, notice: &RetryNotice<'_>) -> Result<()> {
		match &self.on_retry {
			Some(hook) => hook(request, notice),
			None => Ok(()),
		}
	}

	pub(crate) fn success(&self, request: &RequestDescriptor, notice: &SuccessNotice) -> Result<()> {
		match &self.on_success {
			Some(hook) => hook(request, notice),
			None => Ok(()),
		}
	}

	pub(crate) fn failure(
		&self,
		request: &RequestDescriptor,
		notice: &FailureNotice<'_>,
	) -> Result<()> {
		match &self.on_failure {
			Some(hook) => hook(request, notice),
			None => Ok(()),
		}
	}
}
impl Debug for CallbackSet {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("CallbackSet")
			.field("on_request", &self.on_request.is_some())
			.field("on_retry", &self.on_retry.is_some())
			.field("on_success", &self.on_success.is_some())
			.field("on_failure", &self.on_failure.is_some())
			.finish()
	}
}
