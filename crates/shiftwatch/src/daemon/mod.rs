pub mod control;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shiftwatch_daemon::{Daemon, DaemonError, DaemonPaths};
use shiftwatch_supervisor::{
	ConfigError, ErrorType, Event, OutputTap, ProcessController, RestartStatus, StatusStore, Supervisor,
	SupervisorError, SystemClock,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const DEFAULT_LOG_FILTER: &str = "shiftwatch=info,shiftwatch_supervisor=info,shiftwatch_daemon=info";

/// Extra time, past the kill timeout, to wait for the control loop after a
/// helper task failed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunError {
	#[error(transparent)]
	Daemon(#[from] DaemonError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Supervisor(#[from] SupervisorError),
	#[error("control loop stopped abnormally")]
	Aborted,
}

pub fn init_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

/// Supervise the configured worker until a signal, a `shutdown` request, or
/// a fault. Faults are persisted before this returns an error.
pub async fn run(config: AppConfig, paths: DaemonPaths) -> Result<(), RunError> {
	let pause = config.schedule.pause_policy()?;
	let schedule = config.schedule.schedule()?;

	let daemon = Daemon::new(paths.clone());
	daemon.prepare()?;

	let store = StatusStore::new(paths.status_path());
	install_fault_hook(store.clone());

	let (tx, rx) = mpsc::unbounded_channel();
	let output = OutputTap::new(config.worker.output_lines);
	let controller = ProcessController::new(&config.worker, output.clone(), tx.clone());
	let kill_timeout = config.timings.kill_timeout();
	let supervisor = Supervisor::new(controller, store.clone(), pause, config.timings, tx.clone());

	info!(
		identity = %paths.identity,
		program = %config.worker.program.display(),
		"supervising worker"
	);

	let mut main_loop = tokio::spawn(supervisor.run(rx));
	let mut scheduler = tokio::spawn(schedule.run(Arc::new(SystemClock), tx.clone()));
	let mut server = tokio::spawn(control::serve(paths.clone(), tx.clone(), output));

	let signal_tx = tx.clone();
	tokio::spawn(async move {
		wait_for_signal().await;
		info!("shutting down");
		let _ = signal_tx.send(Event::Shutdown);
	});

	let result = tokio::select! {
		res = &mut main_loop => main_loop_result(&store, res),
		_ = &mut scheduler => Err(helper_died(&store, &tx, &mut main_loop, "scheduler", kill_timeout).await),
		_ = &mut server => Err(helper_died(&store, &tx, &mut main_loop, "control socket", kill_timeout).await),
	};

	scheduler.abort();
	server.abort();
	daemon.cleanup();
	result
}

fn main_loop_result(
	store: &StatusStore,
	res: Result<Result<(), SupervisorError>, tokio::task::JoinError>,
) -> Result<(), RunError> {
	match res {
		Ok(Ok(())) => {
			info!("supervisor stopped");
			Ok(())
		}
		Ok(Err(e)) => {
			error!("control loop failed: {}", e);
			persist_fault(store, ErrorType::MainLoopError, e.to_string());
			Err(e.into())
		}
		// The panic hook already recorded it.
		Err(e) if e.is_panic() => Err(RunError::Aborted),
		Err(e) => {
			error!("control loop failed: {}", e);
			persist_fault(store, ErrorType::MainLoopError, e.to_string());
			Err(RunError::Aborted)
		}
	}
}

/// Record the fault, then give the control loop a bounded chance to stop
/// the worker.
async fn helper_died(
	store: &StatusStore,
	tx: &mpsc::UnboundedSender<Event>,
	main_loop: &mut JoinHandle<Result<(), SupervisorError>>,
	task: &'static str,
	kill_timeout: Duration,
) -> RunError {
	let err = SupervisorError::TaskDied(task);
	error!("{}", err);
	persist_fault(store, ErrorType::UnhandledRejection, err.to_string());

	let _ = tx.send(Event::Shutdown);
	if tokio::time::timeout(kill_timeout + SHUTDOWN_GRACE, main_loop).await.is_err() {
		warn!("control loop did not stop in time");
	}
	err.into()
}

fn persist_fault(store: &StatusStore, kind: ErrorType, message: String) {
	store.save(&RestartStatus::fault(Utc::now(), kind, message));
}

fn install_fault_hook(store: StatusStore) {
	let default_hook = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		persist_fault(&store, ErrorType::UncaughtException, info.to_string());
		default_hook(info);
		std::process::exit(1);
	}));
}

async fn wait_for_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	match signal(SignalKind::terminate()) {
		Ok(mut term) => {
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {}
				_ = term.recv() => {}
			}
		}
		Err(e) => {
			warn!("failed to install SIGTERM handler: {}", e);
			let _ = tokio::signal::ctrl_c().await;
		}
	}
}
