//! Spawning the worker process.
//!
//! [`WorkerSpawner`] is the seam between the bridge and the operating
//! system: production code uses [`ProcessSpawner`] to launch the real Pike
//! worker, while tests inject a spawner backed by in-memory duplex pipes to
//! drive the protocol without a subprocess.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::{BridgeConfig, Error, Result};

/// The I/O endpoints of a started worker.
pub struct WorkerPipes {
	/// Write side (the worker's stdin).
	pub writer: Box<dyn AsyncWrite + Send + Unpin>,
	/// Read side (the worker's stdout).
	pub reader: Box<dyn AsyncRead + Send + Unpin>,
	/// The worker's stderr, when the spawner captures it.
	pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
	/// OS process id, when a real process backs the pipes.
	pub pid: Option<u32>,
	/// Child handle kept for termination; `None` for in-memory spawners.
	pub child: Option<Child>,
}

/// Produces the pipes of a freshly started worker.
pub trait WorkerSpawner: Send + Sync {
	/// Start a worker for the given configuration.
	fn spawn(&self, config: &BridgeConfig) -> Result<WorkerPipes>;
}

/// Spawner that launches the worker as a real child process.
#[derive(Debug, Default)]
pub struct ProcessSpawner;

impl WorkerSpawner for ProcessSpawner {
	fn spawn(&self, config: &BridgeConfig) -> Result<WorkerPipes> {
		if !config.entry_script.exists() {
			return Err(Error::Spawn {
				command: config.command.display().to_string(),
				reason: format!("entry script not found: {}", config.entry_script.display()),
			});
		}

		let mut cmd = Command::new(&config.command);
		cmd.arg(&config.entry_script)
			.args(&config.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		for (key, value) in &config.env {
			cmd.env(key, value);
		}
		if let Some(cwd) = &config.cwd {
			cmd.current_dir(cwd);
		}

		let mut child = cmd.spawn().map_err(|e| Error::Spawn {
			command: config.command.display().to_string(),
			reason: e.to_string(),
		})?;

		let stdin = child.stdin.take().ok_or_else(|| Error::Spawn {
			command: config.command.display().to_string(),
			reason: "failed to capture stdin".into(),
		})?;
		let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
			command: config.command.display().to_string(),
			reason: "failed to capture stdout".into(),
		})?;
		let stderr = child.stderr.take();

		Ok(WorkerPipes {
			writer: Box::new(stdin),
			reader: Box::new(stdout),
			stderr: stderr.map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>),
			pid: child.id(),
			child: Some(child),
		})
	}
}
