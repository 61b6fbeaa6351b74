//! The durable "a restart is owed" record.
//!
//! One JSON file per supervisor identity. It is the only state that outlives a
//! supervisor process, so every path that owes the worker a restart writes it
//! before acting, and every path that consumes the restart clears it. Reads
//! and writes are best-effort: failures are logged and otherwise treated as
//! "no record".

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fault kinds tagged onto a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
	UncaughtException,
	UnhandledRejection,
	SpawnError,
	SpawnSyncError,
	#[serde(rename = "mainIIFEError")]
	MainLoopError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartStatus {
	pub need_restart: bool,
	#[serde(with = "chrono::serde::ts_milliseconds")]
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_type: Option<ErrorType>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dead_pid: Option<u32>,
}

impl RestartStatus {
	fn at(now: DateTime<Utc>, need_restart: bool) -> Self {
		Self {
			need_restart,
			timestamp: now,
			pid: None,
			error_type: None,
			error: None,
			dead_pid: None,
		}
	}

	/// Nothing owed; the worker is up as `pid`.
	pub fn running(now: DateTime<Utc>, pid: u32) -> Self {
		Self {
			pid: Some(pid),
			..Self::at(now, false)
		}
	}

	pub fn cleared(now: DateTime<Utc>) -> Self {
		Self::at(now, false)
	}

	/// A crash restart is owed, counted from `now`.
	pub fn owed(now: DateTime<Utc>) -> Self {
		Self::at(now, true)
	}

	/// A restart owed because of a fault, tagged with its kind.
	pub fn fault(now: DateTime<Utc>, kind: ErrorType, error: impl Into<String>) -> Self {
		Self {
			error_type: Some(kind),
			error: Some(error.into()),
			..Self::at(now, true)
		}
	}

	/// A restart owed for a worker found dead, timestamped `backoff` in the
	/// past so the next reconciliation pass treats it as already due.
	pub fn overdue(now: DateTime<Utc>, backoff: chrono::Duration, dead_pid: u32) -> Self {
		Self {
			dead_pid: Some(dead_pid),
			..Self::at(now - backoff, true)
		}
	}

	/// Time since the record was written; never negative.
	pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
		(now - self.timestamp).max(chrono::Duration::zero())
	}
}

/// Best-effort store for one identity's [`RestartStatus`].
#[derive(Debug, Clone)]
pub struct StatusStore {
	path: PathBuf,
}

impl StatusStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Overwrite the record. Goes through a temp file and a rename so a
	/// crash mid-write leaves the previous record intact.
	pub fn save(&self, status: &RestartStatus) {
		if let Err(e) = self.try_save(status) {
			tracing::warn!(path = %self.path.display(), "failed to save restart status: {}", e);
		}
	}

	fn try_save(&self, status: &RestartStatus) -> std::io::Result<()> {
		if let Some(dir) = self.path.parent() {
			fs::create_dir_all(dir)?;
		}
		let data = serde_json::to_vec_pretty(status)?;
		let tmp = self.path.with_extension("json.tmp");
		fs::write(&tmp, data)?;
		fs::rename(&tmp, &self.path)
	}

	pub fn load(&self) -> Option<RestartStatus> {
		let data = match fs::read(&self.path) {
			Ok(d) => d,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
			Err(e) => {
				tracing::warn!(path = %self.path.display(), "failed to read restart status: {}", e);
				return None;
			}
		};
		match serde_json::from_slice(&data) {
			Ok(status) => Some(status),
			Err(e) => {
				tracing::warn!(path = %self.path.display(), "ignoring malformed restart status: {}", e);
				None
			}
		}
	}

	/// The record, only if it still owes a restart.
	pub fn restart_owed(&self) -> Option<RestartStatus> {
		self.load().filter(|s| s.need_restart)
	}

	pub fn clear(&self, now: DateTime<Utc>) {
		self.save(&RestartStatus::cleared(now));
	}
}
