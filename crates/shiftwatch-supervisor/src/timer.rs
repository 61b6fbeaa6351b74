use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::types::Event;

/// Posts an event back to the control loop after a delay, without blocking
/// the loop. In-flight delays are never cancelled; whatever they wake up is
/// expected to re-check state.
pub trait Defer: Send + Sync {
	fn defer(&self, delay: Duration, event: Event);
}

#[derive(Debug, Clone)]
pub struct ChannelDefer {
	tx: mpsc::UnboundedSender<Event>,
}

impl ChannelDefer {
	pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
		Self { tx }
	}
}

impl Defer for ChannelDefer {
	fn defer(&self, delay: Duration, event: Event) {
		if delay.is_zero() {
			let _ = self.tx.send(event);
			return;
		}
		let tx = self.tx.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let _ = tx.send(event);
		});
	}
}

/// Keeps deferred events for inspection instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingDefer {
	deferred: Arc<Mutex<Vec<(Duration, Event)>>>,
}

impl RecordingDefer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drain everything deferred so far, oldest first.
	pub fn take(&self) -> Vec<(Duration, Event)> {
		std::mem::take(&mut *self.deferred.lock().unwrap_or_else(|e| e.into_inner()))
	}

	pub fn len(&self) -> usize {
		self.deferred.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Defer for RecordingDefer {
	fn defer(&self, delay: Duration, event: Event) {
		self.deferred
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push((delay, event));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Trigger;

	#[tokio::test(start_paused = true)]
	async fn channel_defer_delivers_after_delay() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let defer = ChannelDefer::new(tx);
		defer.defer(Duration::from_secs(300), Event::Trigger(Trigger::Reconcile));

		assert!(rx.try_recv().is_err());
		tokio::time::sleep(Duration::from_secs(299)).await;
		assert!(rx.try_recv().is_err());
		tokio::time::sleep(Duration::from_secs(2)).await;
		assert!(matches!(rx.try_recv(), Ok(Event::Trigger(Trigger::Reconcile))));
	}

	#[tokio::test]
	async fn zero_delay_is_immediate() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		ChannelDefer::new(tx).defer(Duration::ZERO, Event::RestartNow);
		assert!(matches!(rx.try_recv(), Ok(Event::RestartNow)));
	}
}
