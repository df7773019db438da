//! Metrics helpers for attempt, retry, and circuit-breaker telemetry.

// std
use std::sync::OnceLock;
// crates.io
use http::Method;
use metrics::Label;
use smallvec::SmallVec;
// self
use crate::{_prelude::*, breaker::CircuitState};

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_ATTEMPTS_TOTAL: &str = "retry_guard_attempts_total";
const METRIC_RETRIES_TOTAL: &str = "retry_guard_retries_total";
const METRIC_OUTCOMES_TOTAL: &str = "retry_guard_outcomes_total";
const METRIC_BACKOFF_SECONDS: &str = "retry_guard_backoff_seconds";
const METRIC_CIRCUIT_TRANSITIONS: &str = "retry_guard_circuit_transitions_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
	OnceLock::new();
#[cfg(not(feature = "prometheus"))]
static PROMETHEUS_HANDLE: OnceLock<()> = OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the
/// recorder is installed. Without the `prometheus` feature this only marks
/// the exporter as handled.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	#[cfg(feature = "prometheus")]
	{
		let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
			.install_recorder()
			.map_err(|err| Error::Validation {
				field: "metrics.exporter",
				reason: format!("Failed to install Prometheus recorder: {err}."),
			})?;
		let _ = PROMETHEUS_HANDLE.set(handle);
	}
	#[cfg(not(feature = "prometheus"))]
	let _ = PROMETHEUS_HANDLE.set(());

	Ok(())
}

#[cfg(feature = "prometheus")]
/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static metrics_exporter_prometheus::PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record one transport invocation.
pub fn record_attempt(method: &Method) {
	metrics::counter!(METRIC_ATTEMPTS_TOTAL, method_labels(method).iter()).increment(1);
}

/// Record a scheduled retry along with its backoff sleep.
pub fn record_retry(method: &Method, delay: Duration) {
	metrics::counter!(METRIC_RETRIES_TOTAL, method_labels(method).iter()).increment(1);
	metrics::histogram!(METRIC_BACKOFF_SECONDS, method_labels(method).iter())
		.record(delay.as_secs_f64());
}

/// Record a terminal outcome, tagged `success` or `failure`.
pub fn record_outcome(method: &Method, outcome: &'static str) {
	metrics::counter!(METRIC_OUTCOMES_TOTAL, outcome_labels(method, outcome).iter()).increment(1);
}

/// Record a circuit-breaker state transition.
pub fn record_circuit_transition(old: CircuitState, new: CircuitState) {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("from", state_name(old)));
	labels.push(Label::new("to", state_name(new)));

	metrics::counter!(METRIC_CIRCUIT_TRANSITIONS, labels.iter()).increment(1);
}

fn method_labels(method: &Method) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("method", method.as_str().to_owned()));

	labels
}

fn outcome_labels(method: &Method, outcome: &'static str) -> LabelSet {
	let mut labels = method_labels(method);

	labels.push(Label::new("outcome", outcome));

	labels
}

fn state_name(state: CircuitState) -> &'static str {
	match state {
		CircuitState::Closed => "closed",
		CircuitState::Open => "open",
		CircuitState::HalfOpen => "half_open",
	}
}
