//! The bridge facade: worker lifecycle, request correlation, health.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use crate::io_task::{self, Outbound};
use crate::spawn::{ProcessSpawner, WorkerSpawner};
use crate::types::BridgeRequest;
use crate::{BridgeConfig, Error, Result};

const RECENT_ERROR_CAP: usize = 8;

/// Shared state between the bridge and one session's I/O task.
pub(crate) struct Session {
	/// Cleared by the I/O task when the session ends for any reason.
	pub(crate) alive: AtomicBool,
	errors: Arc<ErrorLog>,
}

impl Session {
	pub(crate) fn record_error(&self, message: String) {
		self.errors.push(message);
	}
}

/// Bounded ring of the most recent worker errors, for the health snapshot.
struct ErrorLog {
	inner: Mutex<VecDeque<String>>,
}

impl ErrorLog {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			inner: Mutex::new(VecDeque::with_capacity(RECENT_ERROR_CAP)),
		})
	}

	fn push(&self, message: String) {
		let mut log = self.inner.lock();
		if log.len() == RECENT_ERROR_CAP {
			log.pop_front();
		}
		log.push_back(message);
	}

	fn snapshot(&self) -> Vec<String> {
		self.inner.lock().iter().cloned().collect()
	}
}

/// A running worker session.
struct Running {
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	session: Arc<Session>,
	child: Option<Child>,
	pid: Option<u32>,
	started_at: Instant,
}

/// Point-in-time view of the worker for operator diagnostics.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
	/// Whether a worker session is currently alive.
	pub running: bool,
	/// OS process id of the worker, if a real process backs it.
	pub pid: Option<u32>,
	/// Time since the current session started.
	pub uptime: Option<Duration>,
	/// Number of worker (re)starts so far.
	pub generation: u64,
	/// Total requests sent across all sessions.
	pub requests_sent: u64,
	/// The most recent worker errors, oldest first.
	pub recent_errors: Vec<String>,
}

/// Manages one long-lived Pike analysis worker and correlates RPC over its
/// standard I/O.
///
/// Callers share a `Bridge` behind an [`Arc`]; concurrent [`call`]s are
/// multiplexed onto one wire by the session's I/O task. A crashed worker is
/// restarted transparently on the next call; the caller of the failed
/// request sees [`Error::Crashed`] and decides whether to re-issue.
///
/// [`call`]: Bridge::call
pub struct Bridge {
	config: BridgeConfig,
	spawner: Arc<dyn WorkerSpawner>,
	inner: Mutex<Option<Running>>,
	next_id: AtomicU64,
	generation: AtomicU64,
	requests_sent: AtomicU64,
	errors: Arc<ErrorLog>,
}

impl Bridge {
	/// Create a bridge that spawns the real worker process.
	pub fn new(config: BridgeConfig) -> Self {
		Self::with_spawner(config, Arc::new(ProcessSpawner))
	}

	/// Create a bridge with a custom spawner (used by tests).
	pub fn with_spawner(config: BridgeConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
		Self {
			config,
			spawner,
			inner: Mutex::new(None),
			next_id: AtomicU64::new(0),
			generation: AtomicU64::new(0),
			requests_sent: AtomicU64::new(0),
			errors: ErrorLog::new(),
		}
	}

	/// Start the worker if it is not already running. Idempotent.
	pub fn start(&self) -> Result<()> {
		self.ensure_running().map(|_| ())
	}

	/// Whether a worker session is currently alive.
	pub fn is_running(&self) -> bool {
		self.inner
			.lock()
			.as_ref()
			.is_some_and(|r| r.session.alive.load(Ordering::Acquire))
	}

	/// Number of worker (re)starts; bumps on every session.
	///
	/// Downstream caches key negative results by this value so a restart
	/// invalidates them.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// Send a request to the worker and await its response.
	///
	/// Restarts the worker first when the previous session crashed. Ids are
	/// allocated from a counter that is never reset, so a late response from
	/// a dead session can never answer a new request.
	pub async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
		let outbound_tx = self.ensure_running()?;

		let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
		self.requests_sent.fetch_add(1, Ordering::Relaxed);

		let (response_tx, response_rx) = oneshot::channel();
		let request = BridgeRequest {
			id,
			method: method.to_string(),
			params,
		};

		tracing::trace!(id, method, "Bridge call");
		outbound_tx
			.send(Outbound::Request { request, response_tx })
			.map_err(|_| Error::Crashed)?;

		match response_rx.await {
			Ok(result) => result,
			Err(_) => Err(Error::Crashed),
		}
	}

	/// Gracefully terminate the worker. Pending calls resolve with
	/// [`Error::Stopped`]. Idempotent.
	pub async fn stop(&self) {
		let running = self.inner.lock().take();
		let Some(mut running) = running else {
			return;
		};

		tracing::info!(pid = ?running.pid, "Stopping worker");
		running.session.alive.store(false, Ordering::Release);
		let _ = running.outbound_tx.send(Outbound::Shutdown);

		if let Some(mut child) = running.child.take() {
			let _ = child.start_kill();
			let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
		}
	}

	/// Point-in-time health view for operator diagnostics.
	pub fn health(&self) -> HealthSnapshot {
		let inner = self.inner.lock();
		let (running, pid, uptime) = match inner.as_ref() {
			Some(r) if r.session.alive.load(Ordering::Acquire) => {
				(true, r.pid, Some(r.started_at.elapsed()))
			}
			_ => (false, None, None),
		};
		HealthSnapshot {
			running,
			pid,
			uptime,
			generation: self.generation.load(Ordering::Acquire),
			requests_sent: self.requests_sent.load(Ordering::Relaxed),
			recent_errors: self.errors.snapshot(),
		}
	}

	/// Returns the outbound queue of a live session, starting one if needed.
	fn ensure_running(&self) -> Result<mpsc::UnboundedSender<Outbound>> {
		let mut inner = self.inner.lock();
		if let Some(running) = inner.as_ref()
			&& running.session.alive.load(Ordering::Acquire)
		{
			return Ok(running.outbound_tx.clone());
		}

		// Previous session (if any) is dead; its child is reaped on drop.
		let running = self.spawn_session()?;
		let outbound_tx = running.outbound_tx.clone();
		*inner = Some(running);
		Ok(outbound_tx)
	}

	fn spawn_session(&self) -> Result<Running> {
		let mut pipes = self.spawner.spawn(&self.config)?;
		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

		tracing::info!(
			command = %self.config.command.display(),
			pid = ?pipes.pid,
			generation,
			"Worker started"
		);

		let session = Arc::new(Session {
			alive: AtomicBool::new(true),
			errors: self.errors.clone(),
		});

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

		if let Some(stderr) = pipes.stderr.take() {
			tokio::spawn(io_task::run_stderr_watch(stderr, fatal_tx));
		}
		tokio::spawn(io_task::run_worker_io(
			pipes.writer,
			pipes.reader,
			outbound_rx,
			fatal_rx,
			session.clone(),
		));

		Ok(Running {
			outbound_tx,
			session,
			child: pipes.child,
			pid: pipes.pid,
			started_at: Instant::now(),
		})
	}
}
