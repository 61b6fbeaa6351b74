use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

use shiftwatch_supervisor::pause::DEFAULT_OFFSET;
use shiftwatch_supervisor::*;

const EVENT_WAIT: Duration = Duration::from_secs(10);

fn local(h: u32, m: u32) -> DateTime<Utc> {
	DEFAULT_OFFSET
		.with_ymd_and_hms(2026, 3, 14, h, m, 0)
		.unwrap()
		.with_timezone(&Utc)
}

fn sh(script: &str) -> WorkerConfig {
	WorkerConfig::new("sh").args(["-c", script])
}

fn kill_group(pid: u32) {
	let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

/// Skip controller events until the exit report.
async fn next_exit(rx: &mut mpsc::UnboundedReceiver<Event>) -> ExitInfo {
	loop {
		match tokio::time::timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap() {
			Event::Exited(info) => return info,
			Event::Reaped { .. } | Event::RateLimited { .. } => {}
			other => panic!("unexpected {:?}", other),
		}
	}
}

struct Harness {
	sup: Supervisor,
	clock: ManualClock,
	defer: RecordingDefer,
	rx: mpsc::UnboundedReceiver<Event>,
	store: StatusStore,
	output: OutputTap,
	dir: TempDir,
}

impl Harness {
	fn new(worker: WorkerConfig, timings: Timings, at: DateTime<Utc>) -> Self {
		let dir = tempfile::tempdir().unwrap();
		let (tx, rx) = mpsc::unbounded_channel();
		let output = OutputTap::silent(100);
		let controller = ProcessController::new(&worker, output.clone(), tx.clone());
		let store = StatusStore::new(dir.path().join("test.restart.json"));
		let clock = ManualClock::new(at);
		let defer = RecordingDefer::new();
		let sup = Supervisor::new(controller, store.clone(), PausePolicy::default(), timings, tx)
			.with_clock(Arc::new(clock.clone()))
			.with_jitter(Arc::new(FixedJitter(Duration::from_secs(42))))
			.with_defer(Arc::new(defer.clone()));
		Self {
			sup,
			clock,
			defer,
			rx,
			store,
			output,
			dir,
		}
	}

	fn script(script: &str, at: DateTime<Utc>) -> Self {
		Self::new(sh(script), Timings::default(), at)
	}

	fn child(&self) -> WorkerHandle {
		self.sup.state().child.expect("worker should be running")
	}

	async fn next_event(&mut self) -> Event {
		tokio::time::timeout(EVENT_WAIT, self.rx.recv())
			.await
			.expect("timed out waiting for an event")
			.expect("event queue closed")
	}

	/// Feed observer events to the supervisor until an exit has been handled.
	async fn pump_until_exit(&mut self) -> ExitInfo {
		loop {
			let event = self.next_event().await;
			let exit = match &event {
				Event::Exited(info) => Some(*info),
				_ => None,
			};
			self.sup.handle(event);
			if let Some(info) = exit {
				return info;
			}
		}
	}

	/// The single deferred event, with its delay.
	fn take_one(&self) -> (Duration, Event) {
		let mut deferred = self.defer.take();
		assert_eq!(deferred.len(), 1, "expected one deferred event, got {:?}", deferred);
		deferred.remove(0)
	}

	fn take_restart(&self) -> (Duration, RestartDue) {
		match self.take_one() {
			(delay, Event::RestartDue(due)) => (delay, due),
			other => panic!("expected a restart, got {:?}", other),
		}
	}

	async fn wait_for_output(&self, needle: &str) {
		let deadline = tokio::time::Instant::now() + EVENT_WAIT;
		while !self.output.tail(100).await.iter().any(|l| l.contains(needle)) {
			assert!(tokio::time::Instant::now() < deadline, "worker never printed {:?}", needle);
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	}
}

impl Drop for Harness {
	fn drop(&mut self) {
		if let Some(child) = self.sup.state().child {
			kill_group(child.pid);
		}
	}
}

// --- Process controller ---

#[tokio::test]
async fn controller_reports_exit_code_and_output() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let tap = OutputTap::silent(10);
	let controller = ProcessController::new(&sh("echo hello; echo oops >&2; exit 4"), tap.clone(), tx);

	let handle = controller.spawn(7, local(10, 0)).unwrap();
	assert_eq!(handle.generation, 7);
	assert_eq!(handle.started_at, local(10, 0));

	let info = next_exit(&mut rx).await;
	assert_eq!(info.generation, 7);
	assert_eq!(info.pid, handle.pid);
	assert_eq!(info.code, Some(4));
	assert_eq!(info.signal, None);

	let lines = tap.tail(10).await;
	assert!(lines.contains(&"hello".to_string()));
	assert!(lines.contains(&"oops".to_string()));
	assert!(!controller.is_alive(handle.pid));
}

#[tokio::test]
async fn controller_terminate_signals_the_group() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let controller = ProcessController::new(&sh("sleep 30"), OutputTap::silent(10), tx);

	let handle = controller.spawn(1, local(10, 0)).unwrap();
	assert!(controller.is_alive(handle.pid));
	controller.terminate(handle.pid);

	assert_eq!(next_exit(&mut rx).await.signal, Some(15));
}

#[tokio::test]
async fn controller_launch_failure() {
	let (tx, _rx) = mpsc::unbounded_channel();
	let worker = WorkerConfig::new("/nonexistent/shiftwatch-worker");
	let controller = ProcessController::new(&worker, OutputTap::silent(10), tx);

	let err = controller.spawn(1, local(10, 0)).unwrap_err();
	assert!(matches!(err, SpawnError::Launch { .. }));
	assert_eq!(err.error_type(), ErrorType::SpawnError);
}

#[tokio::test]
async fn controller_survives_invalid_utf8() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let tap = OutputTap::silent(10);
	let controller = ProcessController::new(&sh("printf '\\377\\n'; echo after"), tap.clone(), tx);

	controller.spawn(1, local(10, 0)).unwrap();
	next_exit(&mut rx).await;
	assert_eq!(tap.tail(1).await, vec!["after".to_string()]);
}

#[tokio::test]
async fn marker_is_reported_once_and_before_exit() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let controller = ProcessController::new(
		&sh("echo '请求失败: 操作过于频繁'; echo '操作过于频繁' >&2; exit 2"),
		OutputTap::silent(10),
		tx,
	);
	controller.spawn(3, local(10, 0)).unwrap();

	let mut seen = Vec::new();
	loop {
		let event = tokio::time::timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();
		let done = matches!(event, Event::Exited(_));
		if !matches!(event, Event::Reaped { .. }) {
			seen.push(event);
		}
		if done {
			break;
		}
	}
	assert_eq!(seen.len(), 2, "{:?}", seen);
	assert!(matches!(seen[0], Event::RateLimited { generation: 3 }));
}

#[tokio::test]
async fn reap_is_reported_before_output_drains() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let controller = ProcessController::new(&sh("(sleep 3 &); exit 0"), OutputTap::silent(10), tx);
	controller.spawn(5, local(10, 0)).unwrap();

	let first = tokio::time::timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();
	assert!(matches!(first, Event::Reaped { generation: 5 }), "{:?}", first);
	// The background sleep holds stdout open, so the exit report waits.
	assert!(rx.try_recv().is_err());
	assert_eq!(next_exit(&mut rx).await.code, Some(0));
}

// --- Startup ---

#[tokio::test]
async fn startup_spawns_and_records_pid() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.sup.resume();

	let child = h.child();
	assert!(!h.sup.state().is_in_pause_time);
	let status = h.store.load().unwrap();
	assert!(!status.need_restart);
	assert_eq!(status.pid, Some(child.pid));
	assert_eq!(status.timestamp, local(10, 0));

	// Other start paths see the running worker and do nothing.
	h.sup.handle(Event::Trigger(Trigger::PauseExit));
	h.sup.handle(Event::RestartDue(RestartDue {
		reason: RestartReason::Reconcile,
		due_at: local(10, 0),
		attempt: 0,
	}));
	assert_eq!(h.child().pid, child.pid);
	assert!(h.defer.is_empty());
}

#[tokio::test]
async fn startup_inside_pause_window_waits() {
	let mut h = Harness::script("sleep 30", local(4, 0));
	h.sup.resume();

	assert!(h.sup.state().child.is_none());
	assert!(h.sup.state().is_in_pause_time);
	assert!(h.store.load().is_none());
	assert!(h.defer.is_empty());
}

#[tokio::test]
async fn resume_continues_an_interrupted_backoff() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.store.save(&RestartStatus::owed(local(9, 50)));
	h.sup.resume();

	assert!(h.sup.state().child.is_none());
	assert_eq!(h.sup.state().scheduled_restart_time, Some(local(10, 15)));
	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(300));
	assert_eq!(due.reason, RestartReason::Resume);
	assert_eq!(due.due_at, local(10, 15));

	h.clock.set(local(10, 15));
	h.sup.handle(Event::RestartDue(due));
	h.child();
	assert!(h.store.restart_owed().is_none());
}

#[tokio::test]
async fn resume_overdue_restarts_immediately() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.store.save(&RestartStatus::owed(local(9, 30)));
	h.sup.resume();

	h.child();
	assert!(h.store.restart_owed().is_none());
}

// --- Pause windows ---

#[tokio::test]
async fn pause_window_stops_and_resumes_worker() {
	let mut h = Harness::script("sleep 30", local(2, 59));
	h.sup.resume();
	let first = h.child();

	h.clock.set(local(3, 0));
	h.sup.handle(Event::Trigger(Trigger::PauseEntry));
	assert!(h.sup.state().is_in_pause_time);
	assert!(h.sup.state().is_intentional_exit);
	match h.take_one() {
		(delay, Event::KillTimeout { generation }) => {
			assert_eq!(delay, Duration::from_secs(10));
			assert_eq!(generation, first.generation);
		}
		other => panic!("unexpected {:?}", other),
	}

	let exit = h.pump_until_exit().await;
	assert_eq!(exit.pid, first.pid);
	assert_eq!(exit.signal, Some(15));
	assert!(h.sup.state().child.is_none());
	assert!(!h.sup.state().is_intentional_exit);
	assert!(h.defer.is_empty());
	assert!(h.store.restart_owed().is_none());

	// Nothing inside the window brings it back.
	h.clock.set(local(5, 0));
	h.sup.handle(Event::Trigger(Trigger::PauseResync));
	h.sup.handle(Event::Trigger(Trigger::Reconcile));
	h.sup.handle(Event::RestartNow);
	let (_, due) = h.take_restart();
	h.clock.set(local(5, 0) + chrono::Duration::seconds(5));
	h.sup.handle(Event::RestartDue(due));
	assert!(h.sup.state().child.is_none());

	h.clock.set(local(8, 30));
	h.sup.handle(Event::Trigger(Trigger::PauseExit));
	assert!(!h.sup.state().is_in_pause_time);
	assert_ne!(h.child().pid, first.pid);
}

#[tokio::test]
async fn resync_catches_a_missed_pause_entry() {
	let mut h = Harness::script("sleep 30", local(2, 59));
	h.sup.resume();

	h.clock.set(local(3, 1));
	h.sup.handle(Event::Trigger(Trigger::PauseResync));
	assert!(h.sup.state().is_in_pause_time);
	assert!(h.sup.state().is_intentional_exit);
	h.defer.take();
	h.pump_until_exit().await;
	assert!(h.sup.state().child.is_none());
	assert!(h.defer.is_empty());

	h.clock.set(local(8, 31));
	h.sup.handle(Event::Trigger(Trigger::PauseResync));
	assert!(!h.sup.state().is_in_pause_time);
	h.child();
}

#[tokio::test]
async fn resync_out_of_pause_leaves_an_owed_restart_waiting() {
	let mut h = Harness::script("sleep 30", local(8, 20));
	h.store.save(&RestartStatus::owed(local(8, 20)));
	h.sup.resume();
	assert!(h.sup.state().is_in_pause_time);
	let (_, mut due) = h.take_restart();
	assert_eq!(due.due_at, local(8, 45));

	h.clock.set(local(8, 31));
	h.sup.handle(Event::Trigger(Trigger::PauseResync));
	assert!(!h.sup.state().is_in_pause_time);
	assert!(h.sup.state().child.is_none());
	assert!(h.defer.is_empty());
	assert_eq!(h.store.restart_owed().unwrap().timestamp, local(8, 20));

	// The owed wait still runs to its end.
	for minute in [35, 40] {
		h.clock.set(local(8, minute));
		h.sup.handle(Event::RestartDue(due));
		assert!(h.sup.state().child.is_none());
		due = h.take_restart().1;
	}
	h.clock.set(local(8, 45));
	h.sup.handle(Event::RestartDue(due));
	h.child();
	assert!(h.store.restart_owed().is_none());
}

// --- Crash backoff ---

#[tokio::test]
async fn crash_waits_twenty_five_minutes() {
	let mut h = Harness::script("exit 3", local(10, 0));
	h.sup.resume();
	h.child();

	let exit = h.pump_until_exit().await;
	assert_eq!(exit.code, Some(3));
	assert!(h.sup.state().child.is_none());
	let owed = h.store.restart_owed().expect("restart should be owed");
	assert_eq!(owed.timestamp, local(10, 0));
	assert_eq!(h.sup.state().scheduled_restart_time, Some(local(10, 25)));

	let (delay, mut due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(300));
	assert_eq!(due.reason, RestartReason::Crash);

	// Each wake-up before the due time only logs progress and re-arms.
	for minute in [5, 10, 15, 20] {
		h.clock.set(local(10, minute));
		h.sup.handle(Event::RestartDue(due));
		assert!(h.sup.state().child.is_none());
		let (delay, next) = h.take_restart();
		assert_eq!(delay, Duration::from_secs(300));
		due = next;
	}

	h.clock.set(local(10, 25));
	h.sup.handle(Event::RestartDue(due));
	h.child();
	assert!(h.store.restart_owed().is_none());
	assert_eq!(h.sup.state().scheduled_restart_time, None);
}

#[tokio::test]
async fn crash_wait_is_dropped_if_worker_came_back() {
	let flag = tempfile::tempdir().unwrap();
	let script = format!(
		"if [ -e {f} ]; then exec sleep 30; else touch {f}; exit 1; fi",
		f = flag.path().join("crashed").display()
	);
	let mut h = Harness::script(&script, local(10, 0));
	h.sup.resume();
	h.pump_until_exit().await;
	let (_, due) = h.take_restart();

	h.clock.set(local(10, 7));
	h.sup.handle(Event::Trigger(Trigger::PauseExit));
	let second = h.child();

	h.clock.set(local(10, 25));
	h.sup.handle(Event::RestartDue(due));
	assert_eq!(h.child().pid, second.pid);
	let status = h.store.load().unwrap();
	assert!(!status.need_restart);
	assert_eq!(status.pid, Some(second.pid));
}

#[tokio::test]
async fn reconcile_recovers_a_silently_lost_worker() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.sup.resume();
	let first = h.child();

	kill_group(first.pid);
	// The exit reports are held back, as if they got lost.
	let mut stale = Vec::new();
	loop {
		let event = h.next_event().await;
		let done = matches!(event, Event::Exited(_));
		stale.push(event);
		if done {
			break;
		}
	}

	h.sup.handle(Event::Trigger(Trigger::Reconcile));
	assert!(h.sup.state().child.is_none());
	let owed = h.store.restart_owed().expect("restart should be owed");
	assert_eq!(owed.dead_pid, Some(first.pid));
	assert_eq!(owed.timestamp, local(9, 35));

	h.clock.set(local(10, 5));
	h.sup.handle(Event::Trigger(Trigger::Reconcile));
	let second = h.child();
	assert_ne!(second.pid, first.pid);

	for event in stale {
		h.sup.handle(event);
	}
	assert_eq!(h.child().pid, second.pid);
}

#[tokio::test]
async fn reconcile_leaves_a_recent_debt_alone() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.store.save(&RestartStatus::owed(local(9, 50)));
	h.sup.handle(Event::Trigger(Trigger::Reconcile));
	assert!(h.sup.state().child.is_none());
	assert!(h.store.restart_owed().is_some());
}

// --- Rate limit ---

#[tokio::test]
async fn rate_limit_restarts_fast() {
	let mut h = Harness::script("echo '操作过于频繁'; exit 2", local(10, 0));
	h.sup.resume();

	let exit = h.pump_until_exit().await;
	assert_eq!(exit.code, Some(2));
	assert!(!h.sup.state().fast_restart_flag);
	assert!(!h.store.load().unwrap().need_restart);

	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(42));
	assert_eq!(due.reason, RestartReason::RateLimited);
	assert!(h.output.tail(5).await.iter().any(|l| l.contains("操作过于频繁")));

	h.clock.set(local(10, 0) + chrono::Duration::seconds(42));
	h.sup.handle(Event::RestartDue(due));
	h.child();
}

#[tokio::test]
async fn reconcile_waits_for_a_slow_exit_report() {
	// The background sleep keeps stdout open past the worker's exit.
	let mut h = Harness::script("echo '操作过于频繁'; (sleep 3 &); exit 2", local(10, 0));
	h.sup.resume();
	let child = h.child();

	while !(h.sup.state().fast_restart_flag && h.sup.state().exit_pending) {
		let event = h.next_event().await;
		assert!(!matches!(event, Event::Exited(_)), "exit reported before the tick");
		h.sup.handle(event);
	}
	tokio::time::sleep(Duration::from_millis(500)).await;

	h.clock.set(local(10, 0) + chrono::Duration::seconds(1));
	h.sup.handle(Event::Trigger(Trigger::Reconcile));
	assert_eq!(h.child().pid, child.pid);
	assert!(h.sup.state().fast_restart_flag);
	assert!(h.store.restart_owed().is_none());
	assert!(h.defer.is_empty());

	let exit = h.pump_until_exit().await;
	assert_eq!(exit.code, Some(2));
	assert!(h.store.restart_owed().is_none());
	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(42));
	assert_eq!(due.reason, RestartReason::RateLimited);
}

// --- Forced restarts ---

#[tokio::test]
async fn forced_restart_respawns_and_flag_is_one_shot() {
	let flag = tempfile::tempdir().unwrap();
	let script = format!(
		"if [ -e {f} ]; then exit 1; else touch {f}; exec sleep 30; fi",
		f = flag.path().join("started").display()
	);
	let mut h = Harness::script(&script, local(12, 0));
	h.sup.resume();
	let first = h.child();

	h.sup.handle(Event::Trigger(Trigger::ForcedRestart));
	match h.take_one() {
		(delay, Event::ForcedRestartDue) => assert_eq!(delay, Duration::from_secs(42)),
		other => panic!("unexpected {:?}", other),
	}
	h.sup.handle(Event::ForcedRestartDue);
	assert!(h.sup.state().is_intentional_exit);
	assert!(matches!(h.take_one(), (_, Event::KillTimeout { .. })));

	let exit = h.pump_until_exit().await;
	assert_eq!(exit.pid, first.pid);
	assert!(h.store.restart_owed().is_none());
	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(5));
	assert_eq!(due.reason, RestartReason::Forced);

	h.clock.set(local(12, 0) + chrono::Duration::seconds(5));
	h.sup.handle(Event::RestartDue(due));
	let second = h.child();
	assert_ne!(second.pid, first.pid);
	assert!(!h.sup.state().is_intentional_exit);

	// The replacement crashing is a crash, not another intentional stop.
	h.pump_until_exit().await;
	assert!(h.store.restart_owed().is_some());
	let (_, due) = h.take_restart();
	assert_eq!(due.reason, RestartReason::Crash);
}

#[tokio::test]
async fn forced_restart_without_worker_starts_one() {
	let mut h = Harness::new(WorkerConfig::new("/nonexistent/shiftwatch-worker"), Timings::default(), local(12, 0));
	h.sup.handle(Event::RestartNow);
	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(5));
	assert_eq!(due.reason, RestartReason::Forced);
}

#[tokio::test]
async fn kill_timeout_escalates_to_sigkill() {
	let mut h = Harness::script("trap '' TERM; echo ready; sleep 30", local(12, 0));
	h.sup.resume();
	let child = h.child();
	h.wait_for_output("ready").await;

	h.sup.handle(Event::RestartNow);
	let (_, timeout) = h.take_one();
	assert!(matches!(timeout, Event::KillTimeout { .. }));

	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(h.child().pid, child.pid);

	h.sup.handle(timeout);
	assert!(h.sup.state().child.is_none());
	assert!(!h.sup.state().is_intentional_exit);
	let (delay, _) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(5));

	// The late exit report belongs to a worker we already let go of.
	let exit = h.pump_until_exit().await;
	assert_eq!(exit.signal, Some(9));
	assert!(h.sup.state().child.is_none());
	assert!(h.defer.is_empty());
}

// --- Spawn failures ---

#[tokio::test]
async fn spawn_failure_is_recorded_and_retried() {
	let mut h = Harness::new(WorkerConfig::new("/nonexistent/shiftwatch-worker"), Timings::default(), local(10, 0));
	h.sup.resume();

	assert!(h.sup.state().child.is_none());
	let status = h.store.restart_owed().expect("failure should owe a restart");
	assert_eq!(status.error_type, Some(ErrorType::SpawnError));
	assert!(status.error.unwrap().contains("/nonexistent/shiftwatch-worker"));

	let (delay, due) = h.take_restart();
	assert_eq!(delay, Duration::from_secs(300));
	assert_eq!(due.attempt, 1);

	h.clock.set(local(10, 5));
	h.sup.handle(Event::RestartDue(due));
	let (_, due) = h.take_restart();
	assert_eq!(due.attempt, 2);
}

#[tokio::test]
async fn bounded_retries_give_up() {
	let timings = Timings {
		retry_max_attempts: Some(1),
		..Timings::default()
	};
	let mut h = Harness::new(WorkerConfig::new("/nonexistent/shiftwatch-worker"), timings, local(10, 0));
	h.sup.resume();
	assert!(h.defer.is_empty());
	assert!(h.store.restart_owed().is_some());
}

// --- Queries and the run loop ---

#[tokio::test]
async fn query_answers_with_a_snapshot() {
	let mut h = Harness::script("sleep 30", local(10, 0));
	h.sup.resume();
	let child = h.child();

	let (reply, rx) = oneshot::channel();
	h.sup.handle(Event::Query(reply));
	let snapshot = rx.await.unwrap();
	assert_eq!(snapshot.pid, Some(child.pid));
	assert_eq!(snapshot.started_at, Some(local(10, 0)));
	assert!(!snapshot.paused);
	assert_eq!(snapshot.restart_status.unwrap().pid, Some(child.pid));
	assert!(h.dir.path().join("test.restart.json").exists());
}

#[tokio::test]
async fn run_loop_stops_worker_on_shutdown() {
	let dir = tempfile::tempdir().unwrap();
	let (tx, rx) = mpsc::unbounded_channel();
	let controller = ProcessController::new(&sh("sleep 30"), OutputTap::silent(10), tx.clone());
	let store = StatusStore::new(dir.path().join("run.restart.json"));
	let sup = Supervisor::new(controller, store.clone(), PausePolicy::default(), Timings::default(), tx.clone())
		.with_clock(Arc::new(ManualClock::new(local(10, 0))));
	let task = tokio::spawn(sup.run(rx));

	let (reply, answer) = oneshot::channel();
	tx.send(Event::Query(reply)).unwrap();
	let pid = answer.await.unwrap().pid.expect("worker should be running");

	tx.send(Event::Shutdown).unwrap();
	let result = tokio::time::timeout(Duration::from_secs(15), task).await.unwrap().unwrap();
	assert!(result.is_ok());
	assert!(nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_err());

	let status = store.load().unwrap();
	assert!(!status.need_restart);
	assert_eq!(status.pid, Some(pid));
}
