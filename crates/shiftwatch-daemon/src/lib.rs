//! # shiftwatch-daemon
//!
//! Daemon lifecycle for shiftwatch: per-identity state paths, a PID file, and a
//! JSON-lines control channel over a Unix socket.

pub mod client;
pub mod daemon;
pub mod paths;
pub mod server;

pub use client::{ClientError, DaemonClient};
pub use daemon::{Daemon, DaemonError};
pub use paths::DaemonPaths;
