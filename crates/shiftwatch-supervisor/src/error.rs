use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::status::ErrorType;

/// Why a worker could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
	#[error("worker already running (pid {pid})")]
	AlreadyRunning { pid: u32 },
	#[error("inside a pause window")]
	Paused,
	#[error("failed to launch {program}: {source}")]
	Launch {
		program: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("worker exited before it reported a pid")]
	NoPid,
}

impl SpawnError {
	/// Guard refusals are expected outcomes, not failures.
	pub fn is_refusal(&self) -> bool {
		matches!(self, SpawnError::AlreadyRunning { .. } | SpawnError::Paused)
	}

	/// Fault tag recorded in the status file for this failure.
	pub fn error_type(&self) -> ErrorType {
		match self {
			SpawnError::Launch { source, .. }
				if matches!(
					source.kind(),
					io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
				) =>
			{
				ErrorType::SpawnError
			}
			SpawnError::NoPid => ErrorType::SpawnError,
			_ => ErrorType::SpawnSyncError,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid time of day '{0}', expected HH:MM")]
	InvalidTime(String),
	#[error("utc offset of {0} hours is out of range")]
	InvalidOffset(i32),
	#[error("interval must be a positive number of minutes dividing a day, got {0}")]
	InvalidInterval(u32),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
	#[error("event queue closed")]
	EventsClosed,
	#[error("{0} stopped unexpectedly")]
	TaskDied(&'static str),
}
