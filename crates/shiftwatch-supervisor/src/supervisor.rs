//! The control loop. Every decision about the worker is made here, one event
//! at a time, so spawn guards and the intentional-exit flag never race.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Timings;
use crate::error::{SpawnError, SupervisorError};
use crate::jitter::{Jitter, RandomJitter};
use crate::pause::PausePolicy;
use crate::process::{ProcessController, WorkerHandle};
use crate::retry::{RetryPolicy, Verdict};
use crate::status::{RestartStatus, StatusStore};
use crate::timer::{ChannelDefer, Defer};
use crate::types::{Event, ExitInfo, RestartDue, RestartReason, Snapshot, Trigger};

/// A wait that is this close to its due time counts as due.
const DUE_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct SupervisorState {
	pub child: Option<WorkerHandle>,
	pub is_in_pause_time: bool,
	pub scheduled_restart_time: Option<DateTime<Utc>>,
	/// Set before we signal the worker; consumed by the next exit.
	pub is_intentional_exit: bool,
	/// The current worker printed the rate-limit marker.
	pub fast_restart_flag: bool,
	/// Spawn again once the intentionally stopped worker is gone.
	pub respawn_after_exit: bool,
	/// The current worker has been reaped and its exit report is on the way.
	pub exit_pending: bool,
}

pub struct Supervisor {
	state: SupervisorState,
	controller: ProcessController,
	store: StatusStore,
	pause: PausePolicy,
	timings: Timings,
	retry: RetryPolicy,
	clock: Arc<dyn Clock>,
	jitter: Arc<dyn Jitter>,
	defer: Arc<dyn Defer>,
	generation: u64,
}

impl Supervisor {
	/// `events` must feed the receiver later handed to [`Supervisor::run`].
	pub fn new(
		controller: ProcessController,
		store: StatusStore,
		pause: PausePolicy,
		timings: Timings,
		events: mpsc::UnboundedSender<Event>,
	) -> Self {
		let retry = timings.retry_policy();
		Self {
			state: SupervisorState::default(),
			controller,
			store,
			pause,
			timings,
			retry,
			clock: Arc::new(SystemClock),
			jitter: Arc::new(RandomJitter),
			defer: Arc::new(ChannelDefer::new(events)),
			generation: 0,
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
		self.jitter = jitter;
		self
	}

	pub fn with_defer(mut self, defer: Arc<dyn Defer>) -> Self {
		self.defer = defer;
		self
	}

	pub fn state(&self) -> &SupervisorState {
		&self.state
	}

	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			pid: self.state.child.map(|c| c.pid),
			started_at: self.state.child.map(|c| c.started_at),
			paused: self.state.is_in_pause_time,
			scheduled_restart_at: self.state.scheduled_restart_time,
			fast_restart: self.state.fast_restart_flag,
			restart_status: self.store.load(),
		}
	}

	/// Startup: pick up a restart a previous supervisor still owed, or start
	/// the worker right away.
	pub fn resume(&mut self) {
		let now = self.clock.now();
		self.state.is_in_pause_time = self.pause.is_paused(now);
		if self.state.is_in_pause_time {
			info!("starting inside a pause window");
		}

		if let Some(owed) = self.store.restart_owed() {
			let backoff = to_chrono(self.timings.crash_backoff());
			let elapsed = owed.elapsed(now);
			if elapsed < backoff {
				let remaining = backoff - elapsed;
				info!(
					owed_since = %owed.timestamp,
					"resuming interrupted restart, {} left",
					format_wait(remaining)
				);
				let due = RestartDue {
					reason: RestartReason::Resume,
					due_at: now + remaining,
					attempt: 0,
				};
				self.state.scheduled_restart_time = Some(due.due_at);
				self.defer_restart(due);
				return;
			}
			info!(owed_since = %owed.timestamp, "owed restart is overdue");
		}

		self.start_worker(RestartReason::Startup, 0);
	}

	pub fn handle(&mut self, event: Event) {
		match event {
			Event::Trigger(trigger) => self.on_trigger(trigger),
			Event::RateLimited { generation } => self.on_rate_limited(generation),
			Event::Reaped { generation } => self.on_reaped(generation),
			Event::Exited(info) => self.on_exited(info),
			Event::RestartDue(due) => self.on_restart_due(due),
			Event::ForcedRestartDue => self.forced_restart(),
			Event::RestartNow => {
				info!("restart requested");
				self.forced_restart();
			}
			Event::KillTimeout { generation } => self.on_kill_timeout(generation),
			Event::Query(reply) => {
				let _ = reply.send(self.snapshot());
			}
			Event::Shutdown => debug!("shutdown is handled by the run loop"),
		}
	}

	/// Resume, then process events until asked to shut down.
	pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) -> Result<(), SupervisorError> {
		self.resume();
		while let Some(event) = events.recv().await {
			if let Event::Shutdown = event {
				self.shutdown(&mut events).await;
				return Ok(());
			}
			self.handle(event);
		}
		Err(SupervisorError::EventsClosed)
	}

	/// Stop the worker on purpose and wait, bounded by the kill timeout, for
	/// it to go. The persisted record is left as is.
	pub async fn shutdown(&mut self, events: &mut mpsc::UnboundedReceiver<Event>) {
		let Some(child) = self.state.child else {
			info!("supervisor stopping, no worker running");
			return;
		};
		info!(pid = child.pid, "stopping worker before exit");
		self.state.is_intentional_exit = true;
		self.state.respawn_after_exit = false;
		self.controller.terminate(child.pid);

		let deadline = tokio::time::sleep(self.timings.kill_timeout());
		tokio::pin!(deadline);
		loop {
			tokio::select! {
				_ = &mut deadline => {
					warn!(pid = child.pid, "worker still running after {}s, killing", self.timings.kill_timeout_secs);
					self.controller.force_kill(child.pid);
					break;
				}
				event = events.recv() => match event {
					Some(Event::Exited(info)) if info.generation == child.generation => {
						info!(pid = info.pid, code = ?info.code, signal = ?info.signal, "worker stopped");
						break;
					}
					Some(Event::Query(reply)) => {
						let _ = reply.send(self.snapshot());
					}
					Some(_) => {}
					None => break,
				}
			}
		}
		self.state.child = None;
		self.state.exit_pending = false;
		self.state.is_intentional_exit = false;
	}

	fn on_trigger(&mut self, trigger: Trigger) {
		match trigger {
			Trigger::ForcedRestart => {
				let delay = self.jitter.pick(self.timings.forced_restart_jitter());
				info!("scheduled restart in {}s", delay.as_secs());
				self.defer.defer(delay, Event::ForcedRestartDue);
			}
			Trigger::PauseEntry => self.enter_pause(),
			Trigger::PauseExit => self.leave_pause(),
			Trigger::Reconcile => self.reconcile(),
			Trigger::PauseResync => self.resync_pause(),
		}
	}

	fn on_rate_limited(&mut self, generation: u64) {
		match self.state.child {
			Some(child) if child.generation == generation => {
				if !self.state.fast_restart_flag {
					info!(pid = child.pid, "rate limit hit, next exit restarts fast");
					self.state.fast_restart_flag = true;
				}
			}
			_ => debug!(generation, "rate limit from a worker no longer owned"),
		}
	}

	fn on_reaped(&mut self, generation: u64) {
		if let Some(child) = self.state.child.filter(|c| c.generation == generation) {
			debug!(pid = child.pid, "worker reaped, waiting for its output to drain");
			self.state.exit_pending = true;
		}
	}

	fn on_exited(&mut self, info: ExitInfo) {
		match self.state.child {
			Some(child) if child.generation == info.generation => {}
			_ => {
				debug!(pid = info.pid, generation = info.generation, "ignoring exit of a worker no longer owned");
				return;
			}
		}
		self.state.child = None;
		self.state.exit_pending = false;

		if std::mem::take(&mut self.state.is_intentional_exit) {
			info!(pid = info.pid, code = ?info.code, signal = ?info.signal, "worker stopped on request");
			self.after_intentional_exit();
			return;
		}

		if std::mem::take(&mut self.state.fast_restart_flag) {
			let delay = self.jitter.pick(self.timings.fast_restart_jitter());
			info!(pid = info.pid, code = ?info.code, "worker exited after rate limit, restarting in {}s", delay.as_secs());
			self.schedule_restart(RestartReason::RateLimited, delay, 0);
			return;
		}

		warn!(pid = info.pid, code = ?info.code, signal = ?info.signal, "worker exited unexpectedly");
		self.store.save(&RestartStatus::owed(self.clock.now()));
		let backoff = self.timings.crash_backoff();
		info!("restarting in {}", format_wait(to_chrono(backoff)));
		self.schedule_restart(RestartReason::Crash, backoff, 0);
	}

	fn on_kill_timeout(&mut self, generation: u64) {
		let Some(child) = self.state.child.filter(|c| c.generation == generation) else {
			return;
		};
		warn!(
			pid = child.pid,
			"worker ignored SIGTERM for {}s, killing",
			self.timings.kill_timeout_secs
		);
		self.controller.force_kill(child.pid);
		self.state.child = None;
		self.state.exit_pending = false;
		self.state.is_intentional_exit = false;
		self.after_intentional_exit();
	}

	fn after_intentional_exit(&mut self) {
		if std::mem::take(&mut self.state.respawn_after_exit) {
			self.schedule_restart(RestartReason::Forced, self.timings.forced_restart_settle(), 0);
		}
	}

	fn forced_restart(&mut self) {
		if self.stop_worker(true) {
			info!("restarting worker");
		} else {
			info!("no worker running, starting one");
			self.schedule_restart(RestartReason::Forced, self.timings.forced_restart_settle(), 0);
		}
	}

	fn enter_pause(&mut self) {
		self.state.is_in_pause_time = true;
		if self.stop_worker(false) {
			info!("pause window started, stopping worker");
		} else {
			info!("pause window started");
		}
	}

	fn leave_pause(&mut self) {
		self.state.is_in_pause_time = false;
		info!("pause window ended");
		if self.state.child.is_none() {
			self.start_worker(RestartReason::PauseExit, 0);
		}
	}

	fn reconcile(&mut self) {
		let now = self.clock.now();
		let backoff = to_chrono(self.timings.crash_backoff());

		if let Some(owed) = self.store.restart_owed() {
			if owed.elapsed(now) >= backoff {
				info!(owed_since = %owed.timestamp, "owed restart is overdue, clearing");
				self.store.clear(now);
				if self.state.child.is_none() {
					self.start_worker(RestartReason::Reconcile, 0);
				}
			}
		}

		let Some(child) = self.state.child else {
			return;
		};
		if self.state.exit_pending {
			debug!(pid = child.pid, "worker exit is still being reported");
			return;
		}
		if self.controller.is_alive(child.pid) {
			return;
		}
		warn!(pid = child.pid, "worker is gone but never reported an exit");
		self.state.child = None;
		if std::mem::take(&mut self.state.is_intentional_exit) {
			self.after_intentional_exit();
		} else {
			self.state.fast_restart_flag = false;
			self.store.save(&RestartStatus::overdue(now, backoff, child.pid));
		}
	}

	fn resync_pause(&mut self) {
		let paused = self.pause.is_paused(self.clock.now());
		if paused == self.state.is_in_pause_time {
			return;
		}
		self.state.is_in_pause_time = paused;
		if paused {
			warn!("inside a pause window without having entered it, stopping worker");
			self.stop_worker(false);
		} else {
			info!("outside the pause windows, resyncing");
			if self.state.child.is_none() && self.store.restart_owed().is_none() {
				self.start_worker(RestartReason::Resync, 0);
			}
		}
	}

	/// SIGTERM the worker, arming the kill timeout. Returns whether there was
	/// a worker to stop.
	fn stop_worker(&mut self, respawn: bool) -> bool {
		let Some(child) = self.state.child else {
			return false;
		};
		self.state.is_intentional_exit = true;
		self.state.respawn_after_exit = respawn;
		self.controller.terminate(child.pid);
		self.defer.defer(
			self.timings.kill_timeout(),
			Event::KillTimeout {
				generation: child.generation,
			},
		);
		true
	}

	fn schedule_restart(&mut self, reason: RestartReason, delay: Duration, attempt: u32) {
		let due = RestartDue {
			reason,
			due_at: self.clock.now() + to_chrono(delay),
			attempt,
		};
		self.state.scheduled_restart_time = Some(due.due_at);
		self.defer_restart(due);
	}

	/// Sleep towards `due` in steps of at most one progress interval.
	fn defer_restart(&self, due: RestartDue) {
		let remaining = (due.due_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
		let step = remaining.min(self.timings.progress_interval());
		self.defer.defer(step, Event::RestartDue(due));
	}

	fn on_restart_due(&mut self, due: RestartDue) {
		let now = self.clock.now();
		let remaining = due.due_at - now;
		if remaining > to_chrono(DUE_SLACK) {
			info!(reason = %due.reason, "restart in {}", format_wait(remaining));
			self.defer_restart(due);
			return;
		}
		if self.state.scheduled_restart_time == Some(due.due_at) {
			self.state.scheduled_restart_time = None;
		}

		if due.reason.is_backoff() {
			if let Some(child) = self.state.child {
				info!(pid = child.pid, reason = %due.reason, "worker already running, dropping restart");
				self.store.save(&RestartStatus::running(now, child.pid));
				return;
			}
		}
		self.start_worker(due.reason, due.attempt);
	}

	fn start_worker(&mut self, reason: RestartReason, attempt: u32) {
		let err = match self.spawn() {
			Ok(pid) => {
				info!(pid, %reason, "worker started");
				return;
			}
			Err(err) => err,
		};

		match self.retry.after_failure(attempt, &err, |e| !e.is_refusal()) {
			Verdict::GiveUp if err.is_refusal() => info!(%reason, "not starting worker: {}", err),
			Verdict::GiveUp => error!(%reason, attempts = attempt + 1, "giving up on starting worker: {}", err),
			Verdict::Retry(delay) => {
				error!(%reason, attempt, "failed to start worker: {}", err);
				info!("retrying in {}", format_wait(to_chrono(delay)));
				self.schedule_restart(reason, delay, attempt + 1);
			}
		}
	}

	/// The single entry point for launching a worker.
	fn spawn(&mut self) -> Result<u32, SpawnError> {
		if let Some(child) = self.state.child {
			return Err(SpawnError::AlreadyRunning { pid: child.pid });
		}
		let now = self.clock.now();
		if self.pause.is_paused(now) {
			return Err(SpawnError::Paused);
		}

		self.generation += 1;
		match self.controller.spawn(self.generation, now) {
			Ok(handle) => {
				self.state.child = Some(handle);
				self.state.exit_pending = false;
				self.state.is_intentional_exit = false;
				self.state.fast_restart_flag = false;
				self.state.respawn_after_exit = false;
				self.store.save(&RestartStatus::running(now, handle.pid));
				Ok(handle.pid)
			}
			Err(err) => {
				self.store.save(&RestartStatus::fault(now, err.error_type(), err.to_string()));
				Err(err)
			}
		}
	}
}

fn to_chrono(d: Duration) -> chrono::Duration {
	chrono::Duration::from_std(d).unwrap_or(chrono::Duration::days(365 * 100))
}

fn format_wait(d: chrono::Duration) -> String {
	let secs = d.num_seconds().max(0);
	match (secs / 60, secs % 60) {
		(0, s) => format!("{}s", s),
		(m, 0) => format!("{}m", m),
		(m, s) => format!("{}m{}s", m, s),
	}
}
