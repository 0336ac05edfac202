//! Capped, jittered exponential retry for node calls.

use super::NodeError;

use backoff::backoff::Backoff;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget applied to every node RPC
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Total attempts, the first call included
	pub max_attempts: u32,
	pub initial_interval: Duration,
	pub multiplier: f64,
	pub max_interval: Duration,
	/// Relative spread applied to every wait, in `[0, 1]`
	pub jitter: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			initial_interval: Duration::from_millis(500),
			multiplier: 2.0,
			max_interval: Duration::from_secs(30),
			jitter: 0.25,
		}
	}
}

/// `Backoff` implementation that gives up after `max_attempts`
#[derive(Debug, Clone)]
pub struct RetryBackoff {
	policy: RetryPolicy,
	attempts: u32,
	current: Duration,
}

impl RetryBackoff {
	pub fn new(policy: RetryPolicy) -> Self {
		Self {
			current: policy.initial_interval,
			policy,
			attempts: 0,
		}
	}

	fn jittered(&self, base: Duration) -> Duration {
		let jitter = self.policy.jitter.clamp(0.0, 1.0);
		if jitter == 0.0 {
			return base;
		}
		let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
		base.mul_f64(factor)
	}
}

impl Backoff for RetryBackoff {
	fn reset(&mut self) {
		self.attempts = 0;
		self.current = self.policy.initial_interval;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		self.attempts += 1;
		if self.attempts >= self.policy.max_attempts {
			return None;
		}
		let base = self.current;
		let multiplier = self.policy.multiplier.max(1.0);
		self.current = base.mul_f64(multiplier).min(self.policy.max_interval);
		Some(self.jittered(base))
	}
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempts are spent
pub async fn retry<T, F, Fut>(
	policy: &RetryPolicy,
	operation: &str,
	mut op: F,
) -> Result<T, NodeError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, NodeError>>,
{
	backoff::future::retry_notify(
		RetryBackoff::new(policy.clone()),
		|| {
			let attempt = op();
			async move {
				attempt.await.map_err(|e| {
					if e.is_transient() {
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
			}
		},
		|e: NodeError, wait: Duration| {
			warn!("{} failed, retrying in {:?}: {}", operation, wait, e);
		},
	)
	.await
}
