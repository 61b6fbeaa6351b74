use serde::{Deserialize, Serialize};
use shiftwatch_daemon::DaemonPaths;
use shiftwatch_supervisor::Snapshot;

pub const APP_NAME: &str = "shiftwatch";
pub const DEFAULT_LOG_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
	Ping,
	Status,
	Restart,
	Logs {
		#[serde(default = "default_log_lines")]
		lines: usize,
	},
	Shutdown,
}

fn default_log_lines() -> usize {
	DEFAULT_LOG_LINES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
	Ok { message: Option<String> },
	Status { snapshot: Snapshot },
	Log { lines: Vec<String> },
	Error { message: String },
	Pong,
}

pub fn daemon_paths(identity: &str) -> DaemonPaths {
	DaemonPaths::new(APP_NAME, identity)
}
