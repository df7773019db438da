//! Integration tests for circuit breakers shared across executions.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use http::Method;
use retry_guard::{
	BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, Error,
	RequestDescriptor, Result, RetryOrchestrator, RetryPolicy, status_set,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn single_attempt_policy() -> RetryPolicy {
	RetryPolicy {
		max_retries: 0,
		backoff: BackoffStrategy::Constant { delay: Duration::from_millis(10) },
		jitter_factor: 0.0,
		retry_statuses: status_set([500]).expect("statuses"),
		..Default::default()
	}
}

#[tokio::test]
async fn shared_breaker_opens_and_fails_fast() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = counter.clone();

	Mock::given(method("GET"))
		.and(path("/unstable"))
		.respond_with(move |_: &wiremock::Request| {
			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 | 1 => ResponseTemplate::new(500),
				_ => ResponseTemplate::new(200),
			}
		})
		.expect(3)
		.mount(&server)
		.await;

	let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
		failure_threshold: 2,
		recovery_timeout: Duration::from_secs(60),
	})?);
	let orchestrator = RetryOrchestrator::builder(single_attempt_policy())
		.circuit_breaker(breaker.clone())
		.build()?;
	let client = reqwest::Client::new();
	let url = format!("{}/unstable", server.uri());
	let descriptor = RequestDescriptor::new(Method::GET, &url)?;

	// Two failing executions trip the breaker.
	for _ in 0..2 {
		let error = orchestrator
			.execute(&descriptor, || client.get(&url).send())
			.await
			.expect_err("server is failing");

		assert!(matches!(error, Error::RetriesExhausted { .. }));
	}

	assert_eq!(breaker.state(), CircuitState::Open);

	// The third call fails fast; the server never sees it.
	let error = orchestrator
		.execute(&descriptor, || client.get(&url).send())
		.await
		.expect_err("circuit is open");

	assert!(error.is_fail_fast());
	assert_eq!(counter.load(Ordering::SeqCst), 2);

	// Operator reset re-admits traffic; the now-healthy upstream closes the loop.
	breaker.reset();

	let response = orchestrator.execute(&descriptor, || client.get(&url).send()).await?;

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(breaker.state(), CircuitState::Closed);
	assert_eq!(breaker.failure_count(), 0);

	server.verify().await;
	Ok(())
}
