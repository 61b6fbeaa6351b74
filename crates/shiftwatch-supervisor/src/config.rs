//! Typed configuration sections. The binary reads these from TOML; every
//! field except the worker program has a default.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::output::DEFAULT_OUTPUT_LINES;
use crate::pause::{PausePolicy, PauseWindow};
use crate::retry::RetryPolicy;
use crate::schedule::Schedule;
use crate::types::Trigger;

pub const DEFAULT_RATE_LIMIT_MARKER: &str = "操作过于频繁";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
	pub program: PathBuf,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub dir: Option<PathBuf>,
	#[serde(default = "default_marker")]
	pub rate_limit_marker: String,
	#[serde(default = "default_output_lines")]
	pub output_lines: usize,
}

impl WorkerConfig {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
			dir: None,
			rate_limit_marker: default_marker(),
			output_lines: DEFAULT_OUTPUT_LINES,
		}
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}
}

fn default_marker() -> String {
	DEFAULT_RATE_LIMIT_MARKER.to_string()
}

fn default_output_lines() -> usize {
	DEFAULT_OUTPUT_LINES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
	pub crash_backoff_secs: u64,
	pub progress_interval_secs: u64,
	pub retry_cooldown_secs: u64,
	pub retry_max_attempts: Option<u32>,
	pub fast_restart_jitter_secs: u64,
	pub forced_restart_jitter_secs: u64,
	pub forced_restart_settle_secs: u64,
	pub kill_timeout_secs: u64,
}

impl Default for Timings {
	fn default() -> Self {
		Self {
			crash_backoff_secs: 25 * 60,
			progress_interval_secs: 5 * 60,
			retry_cooldown_secs: 5 * 60,
			retry_max_attempts: None,
			fast_restart_jitter_secs: 120,
			forced_restart_jitter_secs: 120,
			forced_restart_settle_secs: 5,
			kill_timeout_secs: 10,
		}
	}
}

impl Timings {
	pub fn crash_backoff(&self) -> Duration {
		Duration::from_secs(self.crash_backoff_secs)
	}

	pub fn progress_interval(&self) -> Duration {
		Duration::from_secs(self.progress_interval_secs.max(1))
	}

	pub fn fast_restart_jitter(&self) -> Duration {
		Duration::from_secs(self.fast_restart_jitter_secs)
	}

	pub fn forced_restart_jitter(&self) -> Duration {
		Duration::from_secs(self.forced_restart_jitter_secs)
	}

	pub fn forced_restart_settle(&self) -> Duration {
		Duration::from_secs(self.forced_restart_settle_secs)
	}

	pub fn kill_timeout(&self) -> Duration {
		Duration::from_secs(self.kill_timeout_secs)
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(Duration::from_secs(self.retry_cooldown_secs), self.retry_max_attempts)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
	pub utc_offset_hours: i32,
	/// `[start, end)` pairs of "HH:MM".
	pub pause_windows: Vec<[String; 2]>,
	pub forced_restarts: Vec<String>,
	pub pause_entries: Vec<String>,
	pub pause_exits: Vec<String>,
	pub reconcile_every_mins: u32,
	pub resync_every_mins: u32,
}

impl Default for ScheduleConfig {
	fn default() -> Self {
		let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
		Self {
			utc_offset_hours: 8,
			pause_windows: vec![
				["03:00".into(), "08:30".into()],
				["15:00".into(), "22:00".into()],
			],
			forced_restarts: strings(&["00:00", "22:00"]),
			pause_entries: strings(&["03:00", "15:00"]),
			pause_exits: strings(&["08:30"]),
			reconcile_every_mins: 5,
			resync_every_mins: 1,
		}
	}
}

impl ScheduleConfig {
	pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
		if !(-12..=14).contains(&self.utc_offset_hours) {
			return Err(ConfigError::InvalidOffset(self.utc_offset_hours));
		}
		FixedOffset::east_opt(self.utc_offset_hours * 3600)
			.ok_or(ConfigError::InvalidOffset(self.utc_offset_hours))
	}

	pub fn pause_policy(&self) -> Result<PausePolicy, ConfigError> {
		let windows = self
			.pause_windows
			.iter()
			.map(|[start, end]| Ok(PauseWindow::new(parse_time_of_day(start)?, parse_time_of_day(end)?)))
			.collect::<Result<Vec<_>, ConfigError>>()?;
		Ok(PausePolicy::new(self.offset()?, windows))
	}

	pub fn schedule(&self) -> Result<Schedule, ConfigError> {
		Ok(Schedule::new(self.offset()?)
			.daily(Trigger::ForcedRestart, parse_times(&self.forced_restarts)?)
			.daily(Trigger::PauseEntry, parse_times(&self.pause_entries)?)
			.daily(Trigger::PauseExit, parse_times(&self.pause_exits)?)
			.every_minutes(Trigger::Reconcile, interval(self.reconcile_every_mins)?)
			.every_minutes(Trigger::PauseResync, interval(self.resync_every_mins)?))
	}
}

fn parse_times(times: &[String]) -> Result<Vec<NaiveTime>, ConfigError> {
	times.iter().map(|t| parse_time_of_day(t)).collect()
}

fn interval(minutes: u32) -> Result<u32, ConfigError> {
	if minutes == 0 || 1440 % minutes != 0 {
		return Err(ConfigError::InvalidInterval(minutes));
	}
	Ok(minutes)
}

/// Parse "HH:MM" (24-hour).
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
	NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| ConfigError::InvalidTime(s.to_string()))
}
