use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use shiftwatch_supervisor::{ConfigError, ScheduleConfig, Timings, WorkerConfig};
use thiserror::Error;

use crate::protocol::daemon_paths;

// ── config.toml ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppConfigError {
	#[error("no config file at {0}")]
	NotFound(PathBuf),
	#[error("failed to read {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
	#[error("{0}: worker.program must not be empty")]
	MissingProgram(PathBuf),
	#[error("{path}: {source}")]
	Invalid {
		path: PathBuf,
		#[source]
		source: ConfigError,
	},
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	#[serde(default)]
	pub identity: Option<String>,
	pub worker: WorkerConfig,
	#[serde(default)]
	pub timings: Timings,
	#[serde(default)]
	pub schedule: ScheduleConfig,
}

impl AppConfig {
	pub fn load(path: &Path) -> Result<Self, AppConfigError> {
		let content = match std::fs::read_to_string(path) {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				return Err(AppConfigError::NotFound(path.to_path_buf()))
			}
			Err(source) => {
				return Err(AppConfigError::Read {
					path: path.to_path_buf(),
					source,
				})
			}
		};
		Self::parse(&content, path)
	}

	/// Parse and validate. `path` only labels errors.
	pub fn parse(content: &str, path: &Path) -> Result<Self, AppConfigError> {
		let config: AppConfig = toml::from_str(content).map_err(|source| AppConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

		if config.worker.program.as_os_str().is_empty() {
			return Err(AppConfigError::MissingProgram(path.to_path_buf()));
		}
		let invalid = |source| AppConfigError::Invalid {
			path: path.to_path_buf(),
			source,
		};
		config.schedule.pause_policy().map_err(invalid)?;
		config.schedule.schedule().map_err(invalid)?;
		Ok(config)
	}

	pub fn identity(&self) -> String {
		resolve_identity(self.identity.as_deref())
	}
}

/// Explicit name, else the login user, else "default".
pub fn resolve_identity(explicit: Option<&str>) -> String {
	explicit
		.map(str::to_string)
		.or_else(|| std::env::var("USER").ok())
		.filter(|s| !s.trim().is_empty())
		.unwrap_or_else(|| "default".to_string())
}

pub fn default_config_path() -> PathBuf {
	daemon_paths("default").config_dir().join("config.toml")
}
