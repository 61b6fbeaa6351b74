//! Daily windows during which the worker must not run.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};

/// Half-open `[start, end)` interval of local time. A window whose end is
/// before its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseWindow {
	pub start: NaiveTime,
	pub end: NaiveTime,
}

impl PauseWindow {
	pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
		Self { start, end }
	}

	fn contains(&self, t: NaiveTime) -> bool {
		if self.start <= self.end {
			self.start <= t && t < self.end
		} else {
			t >= self.start || t < self.end
		}
	}
}

#[derive(Debug, Clone)]
pub struct PausePolicy {
	offset: FixedOffset,
	windows: Vec<PauseWindow>,
}

impl PausePolicy {
	pub fn new(offset: FixedOffset, windows: Vec<PauseWindow>) -> Self {
		Self { offset, windows }
	}

	pub fn windows(&self) -> &[PauseWindow] {
		&self.windows
	}

	/// Whether `now` falls in any window, compared at minute granularity.
	pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
		let local = now.with_timezone(&self.offset);
		let Some(minute) = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0) else {
			return false;
		};
		self.windows.iter().any(|w| w.contains(minute))
	}
}

/// UTC+8, the timezone the daily schedule is written in.
pub const DEFAULT_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
	Some(offset) => offset,
	None => panic!("offset out of range"),
};

pub const DEFAULT_WINDOWS: [PauseWindow; 2] = [
	PauseWindow { start: hm(3, 0), end: hm(8, 30) },
	PauseWindow { start: hm(15, 0), end: hm(22, 0) },
];

pub(crate) const fn hm(h: u32, m: u32) -> NaiveTime {
	match NaiveTime::from_hms_opt(h, m, 0) {
		Some(t) => t,
		None => panic!("invalid time of day"),
	}
}

impl Default for PausePolicy {
	fn default() -> Self {
		Self::new(DEFAULT_OFFSET, DEFAULT_WINDOWS.to_vec())
	}
}
