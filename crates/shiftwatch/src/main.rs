mod config;
mod daemon;
mod protocol;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use config::{resolve_identity, AppConfig};
use owo_colors::OwoColorize;
use protocol::{daemon_paths, Request, Response, DEFAULT_LOG_LINES};
use shiftwatch_daemon::{ClientError, Daemon, DaemonClient, DaemonError, DaemonPaths};
use shiftwatch_supervisor::{RestartStatus, Snapshot, StatusStore};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const START_WAIT: Duration = Duration::from_secs(3);
const STOP_WAIT: Duration = Duration::from_secs(20);

fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();
	let opts = match Options::parse(&args) {
		Ok(opts) => opts,
		Err(e) => fail(e),
	};

	match opts.command() {
		"help" | "--help" | "-h" => print_usage(),
		"version" | "--version" | "-V" => println!("shiftwatch {}", env!("CARGO_PKG_VERSION")),
		"run" => cmd_run(&opts),
		"start" => cmd_start(&opts),
		"stop" => cmd_stop(&opts),
		"status" | "st" => cmd_status(&opts),
		"restart" => cmd_restart(&opts),
		"logs" => cmd_logs(&opts),
		other => {
			eprintln!("unknown command: {}", other);
			eprintln!("run 'shiftwatch help' for usage");
			std::process::exit(1);
		}
	}
}

fn print_usage() {
	eprintln!("{} {}: keeps one worker alive on a daily schedule", "shiftwatch".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [--config <path>] [--identity <name>] [command]", "shiftwatch".bold());
	eprintln!();

	eprintln!("{}", "supervisor".cyan().bold());
	eprintln!("  {}                  Supervise in the foreground", "run".bold());
	eprintln!("  {}                Supervise in the background", "start".bold());
	eprintln!("  {}                 Stop the worker and the supervisor", "stop".bold());
	eprintln!("  {}               Show worker and restart state (default)", "status".bold());
	eprintln!("  {}              Restart the worker now", "restart".bold());
	eprintln!("  {} [n]              Last n lines of worker output", "logs".bold());
	eprintln!();

	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {} <path>      Config file (default {})", "--config".bold(), config::default_config_path().display());
	eprintln!("  {} <name>    Instance name (default: config identity, then $USER)", "--identity".bold());
}

// --- Options ---

struct Options {
	config: Option<PathBuf>,
	identity: Option<String>,
	rest: Vec<String>,
}

impl Options {
	fn parse(args: &[String]) -> Result<Self, String> {
		let mut opts = Options {
			config: None,
			identity: None,
			rest: Vec::new(),
		};
		let mut iter = args.iter();
		while let Some(arg) = iter.next() {
			match arg.as_str() {
				"--config" | "-c" => {
					let value = iter.next().ok_or("--config needs a path")?;
					opts.config = Some(PathBuf::from(value));
				}
				"--identity" | "-i" => {
					let value = iter.next().ok_or("--identity needs a name")?;
					opts.identity = Some(value.clone());
				}
				_ => opts.rest.push(arg.clone()),
			}
		}
		Ok(opts)
	}

	fn command(&self) -> &str {
		self.rest.first().map(String::as_str).unwrap_or("status")
	}

	fn config_path(&self) -> PathBuf {
		self.config.clone().unwrap_or_else(config::default_config_path)
	}

	/// Loading failures are fatal here.
	fn load_config(&self) -> AppConfig {
		match AppConfig::load(&self.config_path()) {
			Ok(config) => config,
			Err(e) => fail(e),
		}
	}

	/// Commands that only talk to a running instance still work without a
	/// readable config file.
	fn identity(&self) -> String {
		if let Some(identity) = &self.identity {
			return resolve_identity(Some(identity));
		}
		match AppConfig::load(&self.config_path()) {
			Ok(config) => config.identity(),
			Err(_) => resolve_identity(None),
		}
	}
}

fn fail(message: impl std::fmt::Display) -> ! {
	eprintln!("{} {}", "error:".red().bold(), message);
	std::process::exit(1);
}

// --- Daemon lifecycle ---

fn cmd_run(opts: &Options) {
	let config = opts.load_config();
	let identity = match &opts.identity {
		Some(identity) => resolve_identity(Some(identity)),
		None => config.identity(),
	};
	let paths = daemon_paths(&identity);

	daemon::init_logging();
	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => fail(format!("failed to start runtime: {}", e)),
	};
	if let Err(e) = runtime.block_on(daemon::run(config, paths)) {
		tracing::error!("{}", e);
		std::process::exit(1);
	}
}

fn cmd_start(opts: &Options) {
	let config_path = absolute(&opts.config_path());
	let config = match AppConfig::load(&config_path) {
		Ok(config) => config,
		Err(e) => fail(e),
	};
	let identity = match &opts.identity {
		Some(identity) => resolve_identity(Some(identity)),
		None => config.identity(),
	};
	let paths = daemon_paths(&identity);

	let args = vec![
		"run".to_string(),
		"--config".to_string(),
		config_path.display().to_string(),
		"--identity".to_string(),
		identity.clone(),
	];
	match Daemon::new(paths.clone()).start_background(&args) {
		Ok(pid) => {
			if wait_until(START_WAIT, || shiftwatch_daemon::client::is_running(&paths)) {
				eprintln!("{} started (pid {})", identity.bold(), pid);
			} else {
				eprintln!("{} launched (pid {}) but not answering yet", identity.bold(), pid);
			}
			eprintln!("output: {}", paths.log_path().display());
		}
		Err(DaemonError::AlreadyRunning(_)) => eprintln!("{} already running", identity.bold()),
		Err(e) => fail(e),
	}
}

fn cmd_stop(opts: &Options) {
	let identity = opts.identity();
	let paths = daemon_paths(&identity);
	match send(&paths, &Request::Shutdown) {
		Ok(Response::Ok { message }) => {
			eprintln!("{}: {}", identity.bold(), message.unwrap_or_default());
			if !wait_until(STOP_WAIT, || !shiftwatch_daemon::client::is_running(&paths)) {
				fail(format!("{} is still running", identity));
			}
			eprintln!("{} stopped", identity.bold());
		}
		Ok(Response::Error { message }) => fail(message),
		Ok(other) => fail(format!("unexpected response: {:?}", other)),
		Err(ClientError::NotRunning) => stop_by_signal(&identity, &paths),
		Err(e) => {
			eprintln!("{} control socket not answering: {}", "warning:".yellow().bold(), e);
			stop_by_signal(&identity, &paths);
		}
	}
}

/// The socket is gone or silent; fall back to the PID file.
fn stop_by_signal(identity: &str, paths: &DaemonPaths) {
	match Daemon::new(paths.clone()).stop() {
		Ok(pid) => {
			eprintln!("{}: sent SIGTERM to pid {}", identity.bold(), pid);
			if !wait_until(STOP_WAIT, || shiftwatch_daemon::client::read_pid(paths).is_none()) {
				fail(format!("{} is still running", identity));
			}
			eprintln!("{} stopped", identity.bold());
		}
		Err(DaemonError::NotRunning) => eprintln!("{} not running", identity.bold()),
		Err(e) => fail(e),
	}
}

fn cmd_restart(opts: &Options) {
	let identity = opts.identity();
	match send(&daemon_paths(&identity), &Request::Restart) {
		Ok(Response::Ok { message }) => eprintln!("{}: {}", identity.bold(), message.unwrap_or_default()),
		Ok(Response::Error { message }) => fail(message),
		Ok(other) => fail(format!("unexpected response: {:?}", other)),
		Err(ClientError::NotRunning) => fail(format!("{} not running", identity)),
		Err(e) => fail(e),
	}
}

// --- Inspection ---

fn cmd_status(opts: &Options) {
	let identity = opts.identity();
	let paths = daemon_paths(&identity);
	match send(&paths, &Request::Status) {
		Ok(Response::Status { snapshot }) => render_snapshot(&identity, &snapshot),
		Ok(Response::Error { message }) => fail(message),
		Ok(other) => fail(format!("unexpected response: {:?}", other)),
		Err(ClientError::NotRunning) => {
			println!(" {} {} not running", "○".dimmed(), identity.bold());
			let store = StatusStore::new(paths.status_path());
			if let Some(record) = store.load() {
				print_record(&record);
			}
		}
		Err(e) => fail(e),
	}
}

fn cmd_logs(opts: &Options) {
	let lines = match opts.rest.get(1) {
		Some(n) => match n.parse::<usize>() {
			Ok(n) => n,
			Err(_) => fail(format!("not a line count: {}", n)),
		},
		None => DEFAULT_LOG_LINES,
	};
	let identity = opts.identity();
	let paths = daemon_paths(&identity);
	match send(&paths, &Request::Logs { lines }) {
		Ok(Response::Log { lines }) => {
			for line in lines {
				println!("{}", line);
			}
		}
		Ok(Response::Error { message }) => fail(message),
		Ok(other) => fail(format!("unexpected response: {:?}", other)),
		Err(ClientError::NotRunning) => {
			eprintln!("{} not running", identity.bold());
			let log = paths.log_path();
			if log.exists() {
				eprintln!("background output was written to {}", log.display());
			}
			std::process::exit(1);
		}
		Err(e) => fail(e),
	}
}

fn render_snapshot(identity: &str, snapshot: &Snapshot) {
	match (snapshot.pid, snapshot.started_at) {
		(Some(pid), Some(started)) => {
			let up = (Utc::now() - started).num_seconds().max(0) as u64;
			println!(
				" {} {} running (pid {}, up {})",
				"●".green(),
				identity.bold(),
				pid,
				format_uptime(up)
			);
		}
		(Some(pid), None) => println!(" {} {} running (pid {})", "●".green(), identity.bold(), pid),
		_ if snapshot.paused => println!(" {} {} paused", "●".yellow(), identity.bold()),
		_ => println!(" {} {} stopped", "●".red(), identity.bold()),
	}

	if snapshot.paused && snapshot.pid.is_some() {
		println!("   └ inside a pause window, stopping");
	}
	if let Some(at) = snapshot.scheduled_restart_at {
		println!("   └ restart scheduled at {}", format_time(at));
	}
	if snapshot.fast_restart {
		println!("   └ rate limited, next exit restarts fast");
	}
	if let Some(record) = &snapshot.restart_status {
		if record.need_restart {
			print_record(record);
		}
	}
}

fn print_record(record: &RestartStatus) {
	let state = if record.need_restart {
		"restart owed".yellow().to_string()
	} else {
		"no restart owed".dimmed().to_string()
	};
	println!("   └ {} since {}", state, format_time(record.timestamp));
	if let Some(kind) = record.error_type {
		let kind = serde_json::to_value(kind)
			.ok()
			.and_then(|v| v.as_str().map(str::to_string))
			.unwrap_or_default();
		println!("     {} {}", kind.red(), record.error.as_deref().unwrap_or(""));
	}
	if let Some(pid) = record.dead_pid {
		println!("     worker {} was found dead", pid);
	}
}

fn send(paths: &DaemonPaths, request: &Request) -> Result<Response, ClientError> {
	let mut client = DaemonClient::<Request, Response>::connect(paths)?.with_timeout(CLIENT_TIMEOUT)?;
	client.send(request)
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
	let start = Instant::now();
	while start.elapsed() < limit {
		if done() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(100));
	}
	done()
}

fn absolute(path: &Path) -> PathBuf {
	if path.is_absolute() {
		return path.to_path_buf();
	}
	match std::env::current_dir() {
		Ok(dir) => dir.join(path),
		Err(_) => path.to_path_buf(),
	}
}

fn format_time(at: DateTime<Utc>) -> String {
	at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_uptime(secs: u64) -> String {
	if secs < 60 {
		format!("{}s", secs)
	} else if secs < 3600 {
		let m = secs / 60;
		let s = secs % 60;
		if s == 0 { format!("{}m", m) } else { format!("{}m{}s", m, s) }
	} else if secs < 86400 {
		let h = secs / 3600;
		let m = (secs % 3600) / 60;
		if m == 0 { format!("{}h", h) } else { format!("{}h{}m", h, m) }
	} else {
		let d = secs / 86400;
		let h = (secs % 86400) / 3600;
		if h == 0 { format!("{}d", d) } else { format!("{}d{}h", d, h) }
	}
}
