//! Integration tests driving the retry loop with a real HTTP client.

// std
use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use http::Method;
use retry_guard::{
	BackoffStrategy, CallbackSet, Error, RequestDescriptor, Result, RetryOrchestrator,
	RetryPolicy, status_set,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn quick_policy(max_retries: u32) -> RetryPolicy {
	RetryPolicy {
		max_retries,
		backoff: BackoffStrategy::Constant { delay: Duration::from_millis(50) },
		jitter_factor: 0.0,
		retry_statuses: status_set([500, 503]).expect("statuses"),
		..Default::default()
	}
}

#[tokio::test]
async fn retries_server_errors_until_success() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = counter.clone();

	Mock::given(method("GET"))
		.and(path("/flaky"))
		.respond_with(move |_: &wiremock::Request| {
			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 | 1 => ResponseTemplate::new(500),
				_ => ResponseTemplate::new(200).set_body_string("ready"),
			}
		})
		.expect(3)
		.mount(&server)
		.await;

	let orchestrator = RetryOrchestrator::new(quick_policy(3))?;
	let client = reqwest::Client::new();
	let url = format!("{}/flaky", server.uri());
	let descriptor = RequestDescriptor::new(Method::GET, &url)?;
	let response = orchestrator.execute(&descriptor, || client.get(&url).send()).await?;

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(counter.load(Ordering::SeqCst), 3);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn non_retryable_status_stops_after_one_request() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/missing"))
		.respond_with(ResponseTemplate::new(404))
		.expect(1)
		.mount(&server)
		.await;

	let orchestrator = RetryOrchestrator::new(quick_policy(5))?;
	let client = reqwest::Client::new();
	let url = format!("{}/missing", server.uri());
	let descriptor = RequestDescriptor::new(Method::GET, &url)?;
	let error = orchestrator
		.execute(&descriptor, || client.get(&url).send())
		.await
		.expect_err("404 is outside the allow-list");

	assert!(matches!(
		error,
		Error::NonRetryableStatus { status, attempt: 1, .. } if status.as_u16() == 404
	));

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn server_retry_after_hint_drives_the_sleep() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = counter.clone();

	Mock::given(method("GET"))
		.and(path("/throttled"))
		.respond_with(move |_: &wiremock::Request| {
			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 => ResponseTemplate::new(503).insert_header("retry-after", "1"),
				_ => ResponseTemplate::new(200),
			}
		})
		.expect(2)
		.mount(&server)
		.await;

	let delays = Arc::new(Mutex::new(Vec::new()));
	let recorded = delays.clone();
	let orchestrator = RetryOrchestrator::builder(quick_policy(2))
		.callbacks(CallbackSet::new().on_retry(move |_, notice| {
			recorded.lock().unwrap().push(notice.delay);

			Ok(())
		}))
		.build()?;
	let client = reqwest::Client::new();
	let url = format!("{}/throttled", server.uri());
	let descriptor = RequestDescriptor::new(Method::GET, &url)?;
	let response = orchestrator.execute(&descriptor, || client.get(&url).send()).await?;

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(*delays.lock().unwrap(), vec![Duration::from_secs(1)]);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn connection_failures_are_retried_as_network_errors() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	// Bind a server, capture its address, then shut it down so every
	// connection attempt is refused.
	let server = MockServer::start().await;
	let url = format!("{}/gone", server.uri());

	drop(server);

	let orchestrator = RetryOrchestrator::new(quick_policy(2))?;
	let client = reqwest::Client::new();
	let descriptor = RequestDescriptor::new(Method::GET, &url)?;
	let error = orchestrator
		.execute(&descriptor, || client.get(&url).send())
		.await
		.expect_err("nothing is listening");

	assert!(matches!(error, Error::RetriesExhausted { attempts: 3, .. }));

	Ok(())
}
