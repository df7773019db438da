//! Crate-wide error types and `Result` alias.

// std
use std::time::Duration;
// crates.io
use http::{Method, StatusCode};
use url::Url;
// self
use crate::transport::FailureClass;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type used to carry caller-supplied transport errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the retry-guard crate.
///
/// Every terminal variant carries enough context (method, URL, attempt count,
/// last observed status or cause) to reconstruct why retrying stopped.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Circuit open for {method} {url}; next attempt permitted in {retry_in:?}")]
	CircuitOpen { method: Method, url: Url, retry_in: Duration },
	#[error(
		"Time budget {budget:?} exceeded after {elapsed:?} and {attempts} attempt(s) for {method} {url} (last status: {last_status:?})"
	)]
	BudgetExceeded {
		method: Method,
		url: Url,
		budget: Duration,
		elapsed: Duration,
		attempts: u32,
		last_status: Option<StatusCode>,
		#[source]
		source: Option<BoxError>,
	},
	#[error("Non-retryable status {status} from {method} {url} on attempt {attempt}")]
	NonRetryableStatus { method: Method, url: Url, status: StatusCode, attempt: u32 },
	#[error(
		"Retries exhausted after {attempts} attempt(s) over {elapsed:?} for {method} {url} (last status: {last_status:?})"
	)]
	RetriesExhausted {
		method: Method,
		url: Url,
		attempts: u32,
		elapsed: Duration,
		last_status: Option<StatusCode>,
		#[source]
		source: Option<BoxError>,
	},
	#[error("Transport failure ({class:?}) for {method} {url} on attempt {attempt}")]
	Transport { method: Method, url: Url, attempt: u32, class: FailureClass, #[source] source: BoxError },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Status code observed on the last attempt, when the failure carries one.
	pub fn last_status(&self) -> Option<StatusCode> {
		match self {
			Self::NonRetryableStatus { status, .. } => Some(*status),
			Self::BudgetExceeded { last_status, .. } | Self::RetriesExhausted { last_status, .. } =>
				*last_status,
			_ => None,
		}
	}

	/// Whether the failure was raised without the transport operation ever being invoked.
	pub fn is_fail_fast(&self) -> bool {
		matches!(self, Self::CircuitOpen { .. })
	}
}
