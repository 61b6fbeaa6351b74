use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::status::RestartStatus;

/// Everything the control loop reacts to. Observers, timers, the schedule
/// and the control socket all post into one queue, so the order in which the
/// supervisor sees "kill requested" and "worker exited" is the queue order.
#[derive(Debug)]
pub enum Event {
	Trigger(Trigger),
	/// The worker of `generation` printed the rate-limit marker.
	RateLimited { generation: u64 },
	/// The worker of `generation` has been waited on. Its `Exited` follows
	/// once the output pipes drain.
	Reaped { generation: u64 },
	Exited(ExitInfo),
	RestartDue(RestartDue),
	/// The jitter delay after a scheduled forced restart has elapsed.
	ForcedRestartDue,
	KillTimeout { generation: u64 },
	Query(oneshot::Sender<Snapshot>),
	RestartNow,
	Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
	ForcedRestart,
	PauseEntry,
	PauseExit,
	Reconcile,
	PauseResync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
	pub generation: u64,
	pub pid: u32,
	pub code: Option<i32>,
	pub signal: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
	Startup,
	Resume,
	Crash,
	RateLimited,
	Forced,
	PauseExit,
	Reconcile,
	Resync,
}

impl RestartReason {
	/// Waits that another path may have beaten to it. Their wake-up is
	/// dropped, and the owed record cleared, if a worker is already up.
	pub fn is_backoff(self) -> bool {
		matches!(self, RestartReason::Crash | RestartReason::Resume)
	}
}

impl std::fmt::Display for RestartReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			RestartReason::Startup => "startup",
			RestartReason::Resume => "resume",
			RestartReason::Crash => "crash",
			RestartReason::RateLimited => "rate limit",
			RestartReason::Forced => "forced restart",
			RestartReason::PauseExit => "pause exit",
			RestartReason::Reconcile => "reconciliation",
			RestartReason::Resync => "pause resync",
		};
		f.write_str(s)
	}
}

/// A pending spawn. `due_at` is wall-clock so a long wait can be chopped into
/// progress-logging steps without drifting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartDue {
	pub reason: RestartReason,
	pub due_at: DateTime<Utc>,
	pub attempt: u32,
}

/// Point-in-time view of the supervisor, answered over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
	pub pid: Option<u32>,
	pub started_at: Option<DateTime<Utc>>,
	pub paused: bool,
	pub scheduled_restart_at: Option<DateTime<Utc>>,
	pub fast_restart: bool,
	pub restart_status: Option<RestartStatus>,
}
