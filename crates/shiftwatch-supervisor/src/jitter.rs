//! Random delays for restarts that must not line up across instances.

use std::time::Duration;

use rand::Rng;

/// Picks a delay in `[0, max]`.
pub trait Jitter: Send + Sync {
	fn pick(&self, max: Duration) -> Duration;
}

/// Uniform delay at millisecond resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
	fn pick(&self, max: Duration) -> Duration {
		let ms = max.as_millis() as u64;
		if ms == 0 {
			return Duration::ZERO;
		}
		let mut rng = rand::rng();
		Duration::from_millis(rng.random_range(0..=ms))
	}
}

/// Always the same delay, clamped to `max`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub Duration);

impl Jitter for FixedJitter {
	fn pick(&self, max: Duration) -> Duration {
		self.0.min(max)
	}
}
