use std::path::PathBuf;

/// Filesystem locations of one supervisor instance.
///
/// Everything an instance writes is keyed by its `identity`, so several
/// supervisors (one per account) can share a state directory.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
	pub app_name: String,
	pub identity: String,
	state_root: Option<PathBuf>,
}

impl DaemonPaths {
	pub fn new(app_name: impl Into<String>, identity: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
			identity: sanitize(&identity.into()),
			state_root: None,
		}
	}

	/// Keep state under `dir` instead of the XDG state directory.
	pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.state_root = Some(dir.into());
		self
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Some(root) = &self.state_root {
			root.clone()
		} else if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	pub fn socket_path(&self) -> PathBuf {
		self.state_dir().join(format!("{}.sock", self.identity))
	}

	pub fn pid_path(&self) -> PathBuf {
		self.state_dir().join(format!("{}.pid", self.identity))
	}

	pub fn status_path(&self) -> PathBuf {
		self.state_dir().join(format!("{}.restart.json", self.identity))
	}

	pub fn log_path(&self) -> PathBuf {
		self.state_dir().join(format!("{}.log", self.identity))
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}

// Identities come from usernames and end up in file names.
fn sanitize(identity: &str) -> String {
	let cleaned: String = identity
		.trim()
		.chars()
		.map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
		.collect();
	if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
		"default".to_string()
	} else {
		cleaned
	}
}
