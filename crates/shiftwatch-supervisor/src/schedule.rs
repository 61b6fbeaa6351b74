//! Time-of-day triggers, cron style, evaluated in one fixed offset.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::pause::{hm, DEFAULT_OFFSET};
use crate::types::{Event, Trigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
	/// At each listed local time, every day.
	Daily(Vec<NaiveTime>),
	/// On every local minute divisible by this many minutes.
	EveryMinutes(u32),
}

impl Cadence {
	fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
		match self {
			Cadence::Daily(times) => times
				.iter()
				.map(|t| {
					let today = after.date().and_time(*t);
					if today > after {
						today
					} else {
						today + chrono::Duration::days(1)
					}
				})
				.min(),
			Cadence::EveryMinutes(0) => None,
			Cadence::EveryMinutes(step) => {
				let step = i64::from(*step);
				let minute = after.and_utc().timestamp().div_euclid(60);
				let next = (minute.div_euclid(step) + 1) * step;
				DateTime::from_timestamp(next * 60, 0).map(|d| d.naive_utc())
			}
		}
	}
}

#[derive(Debug, Clone)]
pub struct Schedule {
	offset: FixedOffset,
	entries: Vec<(Trigger, Cadence)>,
}

impl Schedule {
	pub fn new(offset: FixedOffset) -> Self {
		Self {
			offset,
			entries: Vec::new(),
		}
	}

	pub fn daily(mut self, trigger: Trigger, times: Vec<NaiveTime>) -> Self {
		if !times.is_empty() {
			self.entries.push((trigger, Cadence::Daily(times)));
		}
		self
	}

	pub fn every_minutes(mut self, trigger: Trigger, minutes: u32) -> Self {
		self.entries.push((trigger, Cadence::EveryMinutes(minutes)));
		self
	}

	pub fn entries(&self) -> &[(Trigger, Cadence)] {
		&self.entries
	}

	/// The earliest instant strictly after `after` at which anything fires,
	/// with every trigger due then, in registration order.
	pub fn next_fire(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<Trigger>)> {
		let local = after.with_timezone(&self.offset).naive_local();
		let due: Vec<(Trigger, NaiveDateTime)> = self
			.entries
			.iter()
			.filter_map(|(trigger, cadence)| cadence.next_after(local).map(|at| (*trigger, at)))
			.collect();
		let earliest = due.iter().map(|(_, at)| *at).min()?;
		let triggers = due
			.iter()
			.filter(|(_, at)| *at == earliest)
			.map(|(trigger, _)| *trigger)
			.collect();
		let at = self.offset.from_local_datetime(&earliest).single()?;
		Some((at.with_timezone(&Utc), triggers))
	}

	/// Sleep until each fire time and post its triggers. Returns when the
	/// control loop is gone.
	pub async fn run(self, clock: Arc<dyn Clock>, tx: mpsc::UnboundedSender<Event>) {
		info!(entries = self.entries.len(), offset = %self.offset, "schedule started");
		let mut after = clock.now();
		loop {
			let Some((at, triggers)) = self.next_fire(after) else {
				std::future::pending::<()>().await;
				return;
			};

			// The wall clock can trail tokio's timer by a little; keep
			// sleeping until it has really reached `at`.
			loop {
				let now = clock.now();
				if now >= at {
					break;
				}
				let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
				tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
			}

			for trigger in triggers {
				debug!(?trigger, "schedule fired");
				if tx.send(Event::Trigger(trigger)).is_err() {
					return;
				}
			}

			// After a suspend, skip missed slots rather than replaying them.
			after = at.max(clock.now());
		}
	}
}

impl Default for Schedule {
	/// Forced restarts at 00:00 and 22:00, pause entry at 03:00 and 15:00,
	/// pause exit at 08:30, reconciliation every 5 minutes, pause resync
	/// every minute, all at UTC+8.
	fn default() -> Self {
		Schedule::new(DEFAULT_OFFSET)
			.daily(Trigger::ForcedRestart, vec![hm(0, 0), hm(22, 0)])
			.daily(Trigger::PauseEntry, vec![hm(3, 0), hm(15, 0)])
			.daily(Trigger::PauseExit, vec![hm(8, 30)])
			.every_minutes(Trigger::Reconcile, 5)
			.every_minutes(Trigger::PauseResync, 1)
	}
}
