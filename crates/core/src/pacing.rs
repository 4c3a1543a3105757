//! Delays inserted before portal clicks.

use std::time::Duration;

use rand::distr::{Distribution, Uniform};

/// Source of the delay that precedes every portal click.
///
/// Delays are non-negative and bounded by the implementation's maximum.
pub trait Pacer: Send + Sync {
	fn next_delay(&self) -> Duration;
}

/// Uniformly random delay between `min` and `max` milliseconds inclusive.
#[derive(Debug, Clone, Copy)]
pub struct HumanPacer {
	min_ms: u64,
	max_ms: u64,
}

impl HumanPacer {
	pub const DEFAULT_MIN_MS: u64 = 700;
	pub const DEFAULT_MAX_MS: u64 = 1800;

	pub fn new(min_ms: u64, max_ms: u64) -> Self {
		Self {
			min_ms: min_ms.min(max_ms),
			max_ms: min_ms.max(max_ms),
		}
	}
}

impl Default for HumanPacer {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MIN_MS, Self::DEFAULT_MAX_MS)
	}
}

impl Pacer for HumanPacer {
	fn next_delay(&self) -> Duration {
		let ms = Uniform::new_inclusive(self.min_ms, self.max_ms)
			.map(|dist| dist.sample(&mut rand::rng()))
			.unwrap_or(self.min_ms);
		Duration::from_millis(ms)
	}
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer;

impl Pacer for NoPacer {
	fn next_delay(&self) -> Duration {
		Duration::ZERO
	}
}

/// Sleeps for the pacer's next delay.
pub async fn pause(pacer: &dyn Pacer) {
	let delay = pacer.next_delay();
	if !delay.is_zero() {
		tokio::time::sleep(delay).await;
	}
}
