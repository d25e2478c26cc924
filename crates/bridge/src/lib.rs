//! Bridge to the external Pike analysis worker process.
//!
//! The worker is a long-lived subprocess that performs parsing, type
//! introspection and tokenization on behalf of the analysis engine. It is
//! reached exclusively through a line-delimited JSON request/response
//! protocol over its standard I/O; there is no shared memory.
//!
//! The central type is [`Bridge`]: it owns the worker lifecycle, frames
//! requests, correlates concurrent in-flight calls by a monotonically
//! increasing id, detects crashes (pipe EOF, I/O errors, fatal stderr
//! output) and restarts the worker transparently on the next call.
//!
//! In-flight work is lost on a crash: every pending call resolves with
//! [`Error::Crashed`] and the caller decides whether to re-issue it. The
//! bridge never retries a call on its own and never enforces timeouts;
//! call durations vary too widely between operations (tokenizing a line
//! vs. introspecting a module) for a single deadline to make sense here.

use std::io;

mod config;
mod io_task;
mod spawn;
mod types;
mod worker;

pub use config::BridgeConfig;
pub use spawn::{ProcessSpawner, WorkerPipes, WorkerSpawner};
pub use types::{BridgeRequest, BridgeResponse, RequestId};
pub use worker::{Bridge, HealthSnapshot};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible bridge failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The worker executable or entry script could not be started.
	#[error("failed to spawn worker `{command}`: {reason}")]
	Spawn {
		/// The command that failed to start.
		command: String,
		/// Human-readable spawn failure reason.
		reason: String,
	},
	/// The worker process crashed while the call was in flight.
	#[error("worker crashed")]
	Crashed,
	/// The bridge was stopped while the call was in flight.
	#[error("bridge stopped")]
	Stopped,
	/// The worker answered this request with an error.
	#[error("worker error: {0}")]
	Worker(String),
	/// The worker violated the line-delimited JSON protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// A frame could not be serialized or deserialized.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// Input/output errors on the worker's pipes.
	#[error("{0}")]
	Io(#[from] io::Error),
}

impl Error {
	/// Whether the error indicates the worker is gone and a restart may help.
	pub fn is_disconnect(&self) -> bool {
		matches!(self, Error::Crashed | Error::Stopped | Error::Io(_))
	}
}
