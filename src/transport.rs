//! Transport seam between the retry engine and the HTTP stack.
//!
//! The engine never issues requests itself; callers hand it a fallible
//! operation producing any type that exposes the [`TransportResponse`]
//! surface, failing with any error that can be classified through
//! [`ClassifyError`]. Implementations are provided for `reqwest` and for
//! plain `http` response types.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use http::{HeaderMap, Method, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Minimal response surface the engine inspects to drive retry decisions.
pub trait TransportResponse {
	/// HTTP status code of the completed exchange.
	fn status(&self) -> StatusCode;

	/// Response headers, used for `Retry-After` extraction.
	fn headers(&self) -> &HeaderMap;
}
impl TransportResponse for reqwest::Response {
	fn status(&self) -> StatusCode {
		reqwest::Response::status(self)
	}

	fn headers(&self) -> &HeaderMap {
		reqwest::Response::headers(self)
	}
}
impl<T> TransportResponse for http::Response<T> {
	fn status(&self) -> StatusCode {
		http::Response::status(self)
	}

	fn headers(&self) -> &HeaderMap {
		http::Response::headers(self)
	}
}

/// Coarse classification of a transport failure.
///
/// Only `Timeout` and `Network` are resilience targets; `Other` covers
/// programmer and usage errors, which are never retried.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
	/// The attempt exceeded a transport-level deadline.
	Timeout,
	/// Connection-level failure (refused, reset, DNS, TLS handshake).
	Network,
	/// Anything else; propagated immediately without retrying.
	Other,
}
impl FailureClass {
	/// Whether the class is eligible for retrying at all.
	pub fn is_transient(&self) -> bool {
		!matches!(self, Self::Other)
	}
}

/// Classification hook for caller-supplied transport error types.
pub trait ClassifyError {
	/// Map the error into the engine's failure taxonomy.
	fn classify(&self) -> FailureClass;
}
impl ClassifyError for reqwest::Error {
	fn classify(&self) -> FailureClass {
		if self.is_timeout() {
			FailureClass::Timeout
		} else if self.is_connect() {
			FailureClass::Network
		} else {
			FailureClass::Other
		}
	}
}

/// Description of the logical request an execution is performing.
///
/// Shared read-only with every callback payload and embedded in terminal
/// errors; the engine never inspects it beyond diagnostics.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP method of the wrapped operation.
	pub method: Method,
	/// Target URL of the wrapped operation.
	pub url: Url,
}
impl RequestDescriptor {
	/// Build a descriptor from a method and URL string.
	pub fn new(method: Method, url: impl AsRef<str>) -> Result<Self> {
		let url = Url::parse(url.as_ref())?;

		Ok(Self { method, url })
	}
}
impl Display for RequestDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "{} {}", self.method, self.url)
	}
}

/// Extract a server-supplied retry hint from response headers.
///
/// Accepts an integer-seconds `Retry-After` value; anything non-numeric or
/// missing is ignored so the computed backoff applies instead.
pub fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
	headers
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|raw| raw.trim().parse::<u64>().ok())
		.map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::HeaderValue;
	// self
	use super::*;

	fn headers_with(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_str(value).expect("header value"));

		headers
	}

	#[test]
	fn parses_integer_retry_after_seconds() {
		assert_eq!(retry_after_hint(&headers_with("7")), Some(Duration::from_secs(7)));
		assert_eq!(retry_after_hint(&headers_with(" 30 ")), Some(Duration::from_secs(30)));
	}

	#[test]
	fn ignores_non_numeric_retry_after() {
		assert_eq!(retry_after_hint(&headers_with("Wed, 21 Oct 2015 07:28:00 GMT")), None);
		assert_eq!(retry_after_hint(&headers_with("soon")), None);
		assert_eq!(retry_after_hint(&HeaderMap::new()), None);
	}

	#[test]
	fn http_response_exposes_status_and_headers() {
		let response = http::Response::builder()
			.status(StatusCode::SERVICE_UNAVAILABLE)
			.header(RETRY_AFTER, "2")
			.body(())
			.expect("response");

		assert_eq!(TransportResponse::status(&response), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(retry_after_hint(TransportResponse::headers(&response)), Some(Duration::from_secs(2)));
	}

	#[test]
	fn descriptor_displays_method_and_url() {
		let descriptor =
			RequestDescriptor::new(Method::GET, "https://api.example.com/v1/items").expect("descriptor");

		assert_eq!(descriptor.to_string(), "GET https://api.example.com/v1/items");
	}
}
