use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::error::SpawnError;
use crate::output::OutputTap;
use crate::types::{Event, ExitInfo};

/// How long to wait for output pipes to drain once the worker has exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHandle {
	pub pid: u32,
	pub generation: u64,
	pub started_at: DateTime<Utc>,
}

/// Launches the worker and turns what happens to it into [`Event`]s.
pub struct ProcessController {
	program: PathBuf,
	args: Vec<String>,
	dir: Option<PathBuf>,
	marker: Arc<str>,
	output: OutputTap,
	events: mpsc::UnboundedSender<Event>,
}

impl ProcessController {
	pub fn new(worker: &WorkerConfig, output: OutputTap, events: mpsc::UnboundedSender<Event>) -> Self {
		Self {
			program: worker.program.clone(),
			args: worker.args.clone(),
			dir: worker.dir.clone(),
			marker: Arc::from(worker.rate_limit_marker.as_str()),
			output,
			events,
		}
	}

	/// Start the worker in its own process group. Output watchers and an
	/// exit monitor are attached before this returns; the monitor posts
	/// one `Reaped` and then exactly one `Exited` for `generation`.
	pub fn spawn(&self, generation: u64, now: DateTime<Utc>) -> Result<WorkerHandle, SpawnError> {
		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args)
			.stdin(Stdio::inherit())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);
		if let Some(dir) = &self.dir {
			cmd.current_dir(dir);
		}

		let mut child = cmd.spawn().map_err(|source| SpawnError::Launch {
			program: self.program.clone(),
			source,
		})?;
		let pid = match child.id() {
			Some(pid) => pid,
			None => return Err(SpawnError::NoPid),
		};

		let seen = Arc::new(AtomicBool::new(false));
		let mut watchers = Vec::new();
		if let Some(stdout) = child.stdout.take() {
			watchers.push(self.watch_output(stdout, generation, Arc::clone(&seen)));
		}
		if let Some(stderr) = child.stderr.take() {
			watchers.push(self.watch_output(stderr, generation, Arc::clone(&seen)));
		}

		let events = self.events.clone();
		tokio::spawn(async move {
			monitor(child, generation, pid, watchers, events).await;
		});

		Ok(WorkerHandle {
			pid,
			generation,
			started_at: now,
		})
	}

	fn watch_output<R>(&self, reader: R, generation: u64, seen: Arc<AtomicBool>) -> JoinHandle<()>
	where
		R: AsyncRead + Unpin + Send + 'static,
	{
		let marker = Arc::clone(&self.marker);
		let output = self.output.clone();
		let events = self.events.clone();
		tokio::spawn(async move {
			let mut reader = BufReader::new(reader);
			let mut buf = Vec::new();
			loop {
				buf.clear();
				match reader.read_until(b'\n', &mut buf).await {
					Ok(0) => break,
					Ok(_) => {}
					Err(e) => {
						debug!(generation, "worker output closed: {}", e);
						break;
					}
				}
				let text = String::from_utf8_lossy(&buf);
				let line = text.trim_end_matches(['\n', '\r']);
				output.write_line(line).await;

				if !marker.is_empty() && line.contains(&*marker) && !seen.swap(true, Ordering::SeqCst) {
					let _ = events.send(Event::RateLimited { generation });
				}
			}
		})
	}

	/// SIGTERM the worker's process group.
	pub fn terminate(&self, pid: u32) {
		signal_group(pid, Signal::SIGTERM);
	}

	/// SIGKILL the worker's process group.
	pub fn force_kill(&self, pid: u32) {
		signal_group(pid, Signal::SIGKILL);
	}

	/// Signal-0 liveness probe.
	pub fn is_alive(&self, pid: u32) -> bool {
		matches!(kill(Pid::from_raw(pid as i32), None), Ok(()) | Err(Errno::EPERM))
	}
}

async fn monitor(
	mut child: Child,
	generation: u64,
	pid: u32,
	watchers: Vec<JoinHandle<()>>,
	events: mpsc::UnboundedSender<Event>,
) {
	let status = child.wait().await;
	let _ = events.send(Event::Reaped { generation });

	// Let the watchers finish so a marker printed just before exiting is
	// queued ahead of the exit itself.
	let drain = async {
		for watcher in watchers {
			let _ = watcher.await;
		}
	};
	if tokio::time::timeout(OUTPUT_DRAIN, drain).await.is_err() {
		debug!(pid, "worker output still open after exit");
	}

	let (code, signal) = match status {
		Ok(status) => (status.code(), status.signal()),
		Err(e) => {
			warn!(pid, "failed to wait for worker: {}", e);
			(None, None)
		}
	};
	let _ = events.send(Event::Exited(ExitInfo {
		generation,
		pid,
		code,
		signal,
	}));
}

fn signal_group(pid: u32, signal: Signal) {
	let pgid = Pid::from_raw(pid as i32);
	if let Err(e) = killpg(pgid, signal) {
		// The group may already be gone; fall back to the leader alone.
		if e != Errno::ESRCH {
			debug!(pid, ?signal, "killpg failed: {}", e);
		}
		let _ = kill(pgid, signal);
	}
}
