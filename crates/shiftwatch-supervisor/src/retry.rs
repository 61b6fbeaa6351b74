use std::time::Duration;

/// What to do after an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Retry(Duration),
	GiveUp,
}

/// Fixed-cooldown retry shared by every site that must eventually get a
/// worker running: crash restarts, resumes, forced restarts, pause exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub cooldown: Duration,
	/// `None` retries forever.
	pub max_attempts: Option<u32>,
}

impl RetryPolicy {
	pub fn new(cooldown: Duration, max_attempts: Option<u32>) -> Self {
		Self { cooldown, max_attempts }
	}

	/// Decide the next step after attempt number `attempt` (0-based) failed
	/// with `err`. Failures `retryable` rejects are given up on immediately.
	pub fn after_failure<E>(&self, attempt: u32, err: &E, retryable: impl Fn(&E) -> bool) -> Verdict {
		if !retryable(err) {
			return Verdict::GiveUp;
		}
		match self.max_attempts {
			Some(max) if attempt + 1 >= max => Verdict::GiveUp,
			_ => Verdict::Retry(self.cooldown),
		}
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(Duration::from_secs(300), None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retries_forever_by_default() {
		let policy = RetryPolicy::default();
		for attempt in [0, 1, 50, 10_000] {
			assert_eq!(
				policy.after_failure(attempt, &"io", |_| true),
				Verdict::Retry(Duration::from_secs(300))
			);
		}
	}

	#[test]
	fn bounded_attempts() {
		let policy = RetryPolicy::new(Duration::from_secs(1), Some(3));
		assert_eq!(policy.after_failure(0, &(), |_| true), Verdict::Retry(Duration::from_secs(1)));
		assert_eq!(policy.after_failure(1, &(), |_| true), Verdict::Retry(Duration::from_secs(1)));
		assert_eq!(policy.after_failure(2, &(), |_| true), Verdict::GiveUp);
	}

	#[test]
	fn classification_short_circuits() {
		let policy = RetryPolicy::default();
		let retryable = |e: &&str| *e != "paused";
		assert_eq!(policy.after_failure(0, &"paused", retryable), Verdict::GiveUp);
		assert!(matches!(policy.after_failure(0, &"enoent", retryable), Verdict::Retry(_)));
	}
}
