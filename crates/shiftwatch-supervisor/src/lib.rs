//! # shiftwatch-supervisor
//!
//! Keeps one long-running worker process alive around a daily schedule.
//!
//! The worker is stopped for fixed pause windows, restarted at fixed times,
//! restarted quickly when it prints a rate-limit marker, and restarted after a
//! long backoff when it crashes. A pending backoff restart is written to disk
//! so a new supervisor picks it up where the old one left off.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shiftwatch_supervisor::{
//!     OutputTap, PausePolicy, ProcessController, Schedule, StatusStore, Supervisor, SystemClock,
//!     Timings, WorkerConfig,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let worker = WorkerConfig::new("./bot").args(["--quiet"]);
//! let controller = ProcessController::new(&worker, OutputTap::new(500), tx.clone());
//! let store = StatusStore::new("/tmp/shiftwatch/default.restart.json");
//!
//! tokio::spawn(Schedule::default().run(Arc::new(SystemClock), tx.clone()));
//! let sup = Supervisor::new(controller, store, PausePolicy::default(), Timings::default(), tx);
//! sup.run(rx).await.unwrap();
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod jitter;
pub mod output;
pub mod pause;
pub mod process;
pub mod retry;
pub mod schedule;
pub mod status;
pub mod supervisor;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ScheduleConfig, Timings, WorkerConfig};
pub use error::{ConfigError, SpawnError, SupervisorError};
pub use jitter::{FixedJitter, Jitter, RandomJitter};
pub use output::OutputTap;
pub use pause::{PausePolicy, PauseWindow};
pub use process::{ProcessController, WorkerHandle};
pub use retry::{RetryPolicy, Verdict};
pub use schedule::Schedule;
pub use status::{ErrorType, RestartStatus, StatusStore};
pub use supervisor::{Supervisor, SupervisorState};
pub use timer::{ChannelDefer, Defer, RecordingDefer};
pub use types::*;
