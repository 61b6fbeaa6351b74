use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use tokio::sync::Mutex;

pub const DEFAULT_OUTPUT_LINES: usize = 500;

/// Worker output sink: mirrors each line to our own stdout and keeps the most
/// recent lines for the control socket. Shared across worker generations.
#[derive(Clone)]
pub struct OutputTap {
	ring: Arc<Mutex<VecDeque<String>>>,
	capacity: usize,
	mirror: bool,
}

impl OutputTap {
	pub fn new(capacity: usize) -> Self {
		Self {
			ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(4096)))),
			capacity,
			mirror: true,
		}
	}

	/// Keeps lines without echoing them.
	pub fn silent(capacity: usize) -> Self {
		Self {
			mirror: false,
			..Self::new(capacity)
		}
	}

	pub async fn write_line(&self, line: &str) {
		if self.mirror {
			let mut out = std::io::stdout().lock();
			let _ = writeln!(out, "{}", line);
		}

		if self.capacity == 0 {
			return;
		}
		let mut ring = self.ring.lock().await;
		if ring.len() >= self.capacity {
			ring.pop_front();
		}
		ring.push_back(line.to_string());
	}

	/// Up to `n` most recent lines, oldest first.
	pub async fn tail(&self, n: usize) -> Vec<String> {
		let ring = self.ring.lock().await;
		let skip = ring.len().saturating_sub(n);
		ring.iter().skip(skip).cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn keeps_most_recent_lines() {
		let tap = OutputTap::silent(3);
		for i in 0..5 {
			tap.write_line(&format!("line {}", i)).await;
		}
		assert_eq!(tap.tail(10).await, vec!["line 2", "line 3", "line 4"]);
		assert_eq!(tap.tail(1).await, vec!["line 4"]);
	}

	#[tokio::test]
	async fn zero_capacity_keeps_nothing() {
		let tap = OutputTap::silent(0);
		tap.write_line("x").await;
		assert!(tap.tail(5).await.is_empty());
	}
}
