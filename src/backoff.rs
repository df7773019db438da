//! Backoff strategies and per-retry delay computation.

// std
use std::{
	cell::RefCell,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
// self
use crate::{_prelude::*, policy::RetryPolicy};

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Default base delay for the stock strategies.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Signature of a caller-supplied backoff function.
pub type CustomBackoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Strategy mapping a zero-indexed attempt number to a base delay.
///
/// Strategies are pure: the same attempt always yields the same delay, and
/// no strategy observes wall-clock time. Delay parameters are [`Duration`]s,
/// so negative values are unrepresentable by construction.
#[derive(Clone)]
pub enum BackoffStrategy {
	/// Fixed delay regardless of attempt: `delay, delay, delay, ...`.
	Constant {
		/// Delay applied before every retry.
		delay: Duration,
	},
	/// Arithmetic growth: `base_delay + increment * attempt`.
	Linear {
		/// Delay before the first retry.
		base_delay: Duration,
		/// Amount added for each subsequent retry.
		increment: Duration,
	},
	/// Doubling growth: `base_delay * 2^attempt`.
	Exponential {
		/// Delay before the first retry.
		base_delay: Duration,
	},
	/// Fibonacci growth: `base_delay * fib(attempt + 1)` with `fib(1) = fib(2) = 1`.
	Fibonacci {
		/// Delay scaled by the Fibonacci sequence.
		base_delay: Duration,
	},
	/// Caller-supplied strategy for schedules the stock variants cannot express.
	Custom(CustomBackoff),
}
impl BackoffStrategy {
	/// Compute the base delay for a zero-indexed attempt.
	pub fn calculate(&self, attempt: u32) -> Duration {
		match self {
			Self::Constant { delay } => *delay,
			Self::Linear { base_delay, increment } =>
				base_delay.saturating_add(increment.saturating_mul(attempt)),
			Self::Exponential { base_delay } =>
				base_delay.mul_f64(2f64.powi(attempt.min(32) as i32)),
			Self::Fibonacci { base_delay } => base_delay.mul_f64(fibonacci(attempt + 1) as f64),
			Self::Custom(f) => f(attempt),
		}
	}
}
impl Debug for BackoffStrategy {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Constant { delay } => f.debug_struct("Constant").field("delay", delay).finish(),
			Self::Linear { base_delay, increment } => f
				.debug_struct("Linear")
				.field("base_delay", base_delay)
				.field("increment", increment)
				.finish(),
			Self::Exponential { base_delay } =>
				f.debug_struct("Exponential").field("base_delay", base_delay).finish(),
			Self::Fibonacci { base_delay } =>
				f.debug_struct("Fibonacci").field("base_delay", base_delay).finish(),
			Self::Custom(_) => f.write_str("Custom(<function>)"),
		}
	}
}
impl Default for BackoffStrategy {
	fn default() -> Self {
		Self::Exponential { base_delay: DEFAULT_BASE_DELAY }
	}
}

/// Fully resolved delay for one retry, computed once per backoff step.
#[derive(Clone, Debug)]
pub struct BackoffDecision {
	/// Base delay produced by the configured strategy.
	pub base: Duration,
	/// Server-supplied override, when a parseable `Retry-After` was present.
	pub retry_after: Option<Duration>,
	/// Delay after `Retry-After` substitution and the `max_wait_time` cap.
	pub capped: Duration,
	/// Final delay to sleep, after jitter widening.
	pub sleep: Duration,
}
impl BackoffDecision {
	/// Resolve the delay for the retry following the given zero-indexed attempt.
	///
	/// A `Retry-After` hint replaces the strategy delay entirely; the cap
	/// applies to whichever value was chosen, and jitter only ever widens the
	/// capped delay.
	pub fn resolve(policy: &RetryPolicy, attempt: u32, retry_after: Option<Duration>) -> Self {
		let base = policy.backoff.calculate(attempt);
		let chosen = retry_after.unwrap_or(base);
		let capped = match policy.max_wait_time {
			Some(cap) => chosen.min(cap),
			None => chosen,
		};
		let sleep = widen(capped, policy.jitter_factor);

		tracing::debug!(attempt, ?base, ?retry_after, ?capped, ?sleep, "backoff resolved");

		Self { base, retry_after, capped, sleep }
	}
}

fn widen(delay: Duration, jitter_factor: f64) -> Duration {
	if jitter_factor <= 0.0 || delay.is_zero() {
		return delay;
	}

	SMALL_RNG.with(|cell| {
		let mut rng = cell.borrow_mut();

		delay.mul_f64(1.0 + rng.random_range(0.0..jitter_factor))
	})
}

fn fibonacci(n: u32) -> u64 {
	// fib(90) is the last value below u64::MAX; saturate beyond it.
	let mut pair = (1u64, 1u64);

	for _ in 2..n.min(90) {
		pair = (pair.1, pair.0.saturating_add(pair.1));
	}

	pair.1
}
