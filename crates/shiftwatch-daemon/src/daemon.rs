use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;

use crate::paths::DaemonPaths;

#[derive(Debug, Error)]
pub enum DaemonError {
	#[error("daemon already running for '{0}'")]
	AlreadyRunning(String),
	#[error("daemon not running")]
	NotRunning,
	#[error("failed to start daemon: {0}")]
	Launch(io::Error),
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("failed to signal pid {pid}: {source}")]
	Signal { pid: u32, source: nix::Error },
}

/// Lifecycle of one supervisor instance on disk: PID file and control socket.
pub struct Daemon {
	pub paths: DaemonPaths,
}

impl Daemon {
	pub fn new(paths: DaemonPaths) -> Self {
		Self { paths }
	}

	/// Claim the instance's files before serving.
	///
	/// Fails if another live daemon already answers on the socket; a stale
	/// socket left by a killed daemon is removed.
	pub fn prepare(&self) -> Result<(), DaemonError> {
		if crate::client::is_running(&self.paths) {
			return Err(DaemonError::AlreadyRunning(self.paths.identity.clone()));
		}

		std::fs::create_dir_all(self.paths.state_dir())?;
		std::fs::write(self.paths.pid_path(), std::process::id().to_string())?;

		let socket_path = self.paths.socket_path();
		if socket_path.exists() {
			std::fs::remove_file(&socket_path)?;
		}

		tracing::info!(
			identity = %self.paths.identity,
			"daemon started (pid {})",
			std::process::id()
		);
		Ok(())
	}

	pub fn cleanup(&self) {
		let _ = std::fs::remove_file(self.paths.socket_path());
		let _ = std::fs::remove_file(self.paths.pid_path());
	}

	/// Re-launch the current binary detached with `args`, appending its
	/// output to the instance log file. Returns the child's pid.
	pub fn start_background(&self, args: &[String]) -> Result<u32, DaemonError> {
		if crate::client::is_running(&self.paths) {
			return Err(DaemonError::AlreadyRunning(self.paths.identity.clone()));
		}

		std::fs::create_dir_all(self.paths.state_dir())?;
		let log = OpenOptions::new()
			.create(true)
			.append(true)
			.open(self.paths.log_path())?;
		let log_err = log.try_clone()?;

		let binary = find_current_binary();
		let child = std::process::Command::new(&binary)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::from(log))
			.stderr(Stdio::from(log_err))
			.spawn()
			.map_err(DaemonError::Launch)?;

		Ok(child.id())
	}

	/// SIGTERM the daemon named in the PID file. A PID file whose process is
	/// gone is removed and reported as not running.
	pub fn stop(&self) -> Result<u32, DaemonError> {
		use nix::errno::Errno;
		use nix::sys::signal::{kill, Signal};
		use nix::unistd::Pid;

		let pid = crate::client::read_pid(&self.paths).ok_or(DaemonError::NotRunning)?;
		match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
			Ok(()) => Ok(pid),
			Err(Errno::ESRCH) => {
				let _ = std::fs::remove_file(self.paths.pid_path());
				Err(DaemonError::NotRunning)
			}
			Err(source) => Err(DaemonError::Signal { pid, source }),
		}
	}
}

fn find_current_binary() -> PathBuf {
	std::env::current_exe().unwrap_or_else(|_| PathBuf::from("shiftwatch"))
}
