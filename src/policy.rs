//! Retry policy configuration, validation, and attempt classification.
//!
//! A [`RetryPolicy`] is created once per caller configuration, validated
//! eagerly, and shared read-only across any number of concurrent executions.

// std
use std::{
	collections::HashSet,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use http::StatusCode;
// self
use crate::{_prelude::*, backoff::BackoffStrategy, transport::FailureClass};

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default jitter factor applied on top of computed delays.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;
/// Status codes retried when no explicit allow-list is configured.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Signature of a caller-supplied retry predicate.
///
/// When configured, the predicate's verdict is authoritative wherever it is
/// consulted; the status allow-list is the fallback, never an addition.
pub type RetryPredicate = Arc<dyn Fn(&AttemptOutcome<'_>) -> bool + Send + Sync>;

/// Outcome of one completed attempt, as presented to a retry predicate.
#[derive(Debug)]
pub enum AttemptOutcome<'a> {
	/// The transport produced a response with this status.
	Status(StatusCode),
	/// The transport failed with a classified error.
	Failure {
		/// Classification of the failure.
		class: FailureClass,
		/// The underlying transport error.
		error: &'a (dyn std::error::Error + 'static),
	},
}

/// Classification of a completed attempt by the decision rules.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Verdict {
	/// Return the response to the caller.
	Succeed,
	/// The outcome is retryable; the orchestrator decides whether budget remains.
	Retry,
	/// Fail immediately, regardless of remaining attempts.
	Fail,
}

/// Retry configuration for one logical upstream operation.
#[derive(Clone)]
pub struct RetryPolicy {
	/// Maximum number of retries after the initial attempt; total attempts
	/// performed never exceed `max_retries + 1`.
	pub max_retries: u32,
	/// Strategy mapping attempt numbers to base delays.
	pub backoff: BackoffStrategy,
	/// Upper bound of the uniform jitter fraction added to each delay.
	pub jitter_factor: f64,
	/// Status codes eligible for retrying when no predicate is configured.
	pub retry_statuses: HashSet<StatusCode>,
	/// Optional predicate overriding the allow-list wherever it applies.
	pub predicate: Option<RetryPredicate>,
	/// Optional wall-clock ceiling over all attempts and sleeps.
	pub max_total_time: Option<Duration>,
	/// Optional cap applied to every single computed delay.
	pub max_wait_time: Option<Duration>,
}
impl RetryPolicy {
	/// Validate invariants for the retry configuration.
	///
	/// Delay parameters are [`Duration`]s and therefore cannot be negative;
	/// the checks below cover the remaining numeric invariants. Runs eagerly
	/// at orchestrator construction, never mid-loop.
	pub fn validate(&self) -> Result<()> {
		if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
			return Err(Error::Validation {
				field: "retry_policy.jitter_factor",
				reason: "Must be a finite value greater than or equal to zero.".into(),
			});
		}
		if let Some(max_total_time) = self.max_total_time
			&& max_total_time.is_zero()
		{
			return Err(Error::Validation {
				field: "retry_policy.max_total_time",
				reason: "Must be greater than zero when configured.".into(),
			});
		}
		if let Some(max_wait_time) = self.max_wait_time
			&& max_wait_time.is_zero()
		{
			return Err(Error::Validation {
				field: "retry_policy.max_wait_time",
				reason: "Must be greater than zero when configured.".into(),
			});
		}

		Ok(())
	}

	/// Classify one completed attempt.
	///
	/// Responses below 400 succeed unless the predicate explicitly asks for a
	/// retry (the "still not ready" escape hatch). For error statuses and
	/// transient failures the predicate, when present, is authoritative; the
	/// allow-list only applies in its absence. Non-transient failures are
	/// never retried and never consult the predicate.
	pub fn verdict(&self, outcome: &AttemptOutcome<'_>) -> Verdict {
		match outcome {
			AttemptOutcome::Status(status) if status.as_u16() < 400 => {
				if let Some(predicate) = &self.predicate
					&& predicate(outcome)
				{
					return Verdict::Retry;
				}

				Verdict::Succeed
			},
			AttemptOutcome::Status(status) =>
				if let Some(predicate) = &self.predicate {
					if predicate(outcome) { Verdict::Retry } else { Verdict::Fail }
				} else if self.retry_statuses.contains(status) {
					Verdict::Retry
				} else {
					Verdict::Fail
				},
			AttemptOutcome::Failure { class, .. } if class.is_transient() =>
				if let Some(predicate) = &self.predicate {
					if predicate(outcome) { Verdict::Retry } else { Verdict::Fail }
				} else {
					Verdict::Retry
				},
			AttemptOutcome::Failure { .. } => Verdict::Fail,
		}
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("max_retries", &self.max_retries)
			.field("backoff", &self.backoff)
			.field("jitter_factor", &self.jitter_factor)
			.field("retry_statuses", &self.retry_statuses)
			.field("predicate", &self.predicate.as_ref().map(|_| "<function>"))
			.field("max_total_time", &self.max_total_time)
			.field("max_wait_time", &self.max_wait_time)
			.finish()
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			backoff: BackoffStrategy::default(),
			jitter_factor: DEFAULT_JITTER_FACTOR,
			retry_statuses: default_retry_statuses(),
			predicate: None,
			max_total_time: None,
			max_wait_time: None,
		}
	}
}

/// The stock allow-list as a status set.
pub fn default_retry_statuses() -> HashSet<StatusCode> {
	DEFAULT_RETRY_STATUSES
		.into_iter()
		.map(|code| StatusCode::from_u16(code).expect("codes are valid"))
		.collect()
}

/// Build a status set from raw codes, rejecting anything outside 100..1000.
pub fn status_set(codes: impl IntoIterator<Item = u16>) -> Result<HashSet<StatusCode>> {
	codes
		.into_iter()
		.map(|code| {
			StatusCode::from_u16(code).map_err(|_| Error::Validation {
				field: "retry_policy.retry_statuses",
				reason: format!("{code} is not a valid HTTP status code."),
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, thiserror::Error)]
	#[error("boom")]
	struct Boom;

	fn failure(class: FailureClass) -> AttemptOutcome<'static> {
		AttemptOutcome::Failure { class, error: &Boom }
	}

	fn status(code: u16) -> AttemptOutcome<'static> {
		AttemptOutcome::Status(StatusCode::from_u16(code).expect("status"))
	}

	#[test]
	fn success_statuses_succeed_without_predicate() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.verdict(&status(200)), Verdict::Succeed);
		assert_eq!(policy.verdict(&status(204)), Verdict::Succeed);
		assert_eq!(policy.verdict(&status(302)), Verdict::Succeed);
	}

	#[test]
	fn allow_list_controls_error_statuses() {
		let policy = RetryPolicy {
			retry_statuses: status_set([500]).expect("statuses"),
			..Default::default()
		};

		assert_eq!(policy.verdict(&status(500)), Verdict::Retry);
		assert_eq!(policy.verdict(&status(404)), Verdict::Fail);
		assert_eq!(policy.verdict(&status(503)), Verdict::Fail);
	}

	#[test]
	fn predicate_wins_over_the_allow_list() {
		// Retries 404 (outside the list) and refuses 500 (inside the list).
		let policy = RetryPolicy {
			retry_statuses: status_set([500]).expect("statuses"),
			predicate: Some(Arc::new(|outcome| {
				matches!(outcome, AttemptOutcome::Status(status) if status.as_u16() == 404)
			})),
			..Default::default()
		};

		assert_eq!(policy.verdict(&status(404)), Verdict::Retry);
		assert_eq!(policy.verdict(&status(500)), Verdict::Fail);
	}

	#[test]
	fn predicate_can_force_retry_of_a_success() {
		let policy = RetryPolicy {
			predicate: Some(Arc::new(|outcome| {
				matches!(outcome, AttemptOutcome::Status(status) if status.as_u16() == 202)
			})),
			..Default::default()
		};

		assert_eq!(policy.verdict(&status(202)), Verdict::Retry);
		assert_eq!(policy.verdict(&status(200)), Verdict::Succeed);
	}

	#[test]
	fn transient_failures_retry_by_default() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.verdict(&failure(FailureClass::Timeout)), Verdict::Retry);
		assert_eq!(policy.verdict(&failure(FailureClass::Network)), Verdict::Retry);
	}

	#[test]
	fn predicate_is_authoritative_for_transient_failures() {
		let policy = RetryPolicy { predicate: Some(Arc::new(|_| false)), ..Default::default() };

		assert_eq!(policy.verdict(&failure(FailureClass::Timeout)), Verdict::Fail);
	}

	#[test]
	fn fatal_failures_never_retry_nor_consult_the_predicate() {
		let policy = RetryPolicy { predicate: Some(Arc::new(|_| true)), ..Default::default() };

		assert_eq!(policy.verdict(&failure(FailureClass::Other)), Verdict::Fail);
	}

	#[test]
	fn rejects_negative_or_non_finite_jitter() {
		let policy = RetryPolicy { jitter_factor: -0.5, ..Default::default() };

		assert!(matches!(
			policy.validate(),
			Err(Error::Validation { field: "retry_policy.jitter_factor", .. })
		));

		let policy = RetryPolicy { jitter_factor: f64::NAN, ..Default::default() };

		assert!(policy.validate().is_err());
	}

	#[test]
	fn rejects_zero_budgets() {
		let policy = RetryPolicy { max_total_time: Some(Duration::ZERO), ..Default::default() };

		assert!(policy.validate().is_err());

		let policy = RetryPolicy { max_wait_time: Some(Duration::ZERO), ..Default::default() };

		assert!(policy.validate().is_err());
	}

	#[test]
	fn rejects_invalid_status_codes() {
		assert!(status_set([500, 99]).is_err());
		assert!(status_set([500, 503]).is_ok());
	}
}
