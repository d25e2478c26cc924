//! The per-session worker I/O loop.
//!
//! One task per worker session owns both pipe ends and the pending-request
//! map. All writes go through a single outbound queue so the worker's
//! line-based reader always sees whole frames, regardless of how many
//! callers have requests in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::types::{BridgeRequest, BridgeResponse, RequestId};
use crate::worker::Session;
use crate::{Error, Result};

/// Outbound message envelope; writes are serialized for total ordering.
pub(crate) enum Outbound {
	Request {
		request: BridgeRequest,
		response_tx: oneshot::Sender<Result<JsonValue>>,
	},
	Shutdown,
}

/// Why the I/O loop terminated.
enum ExitReason {
	Crashed,
	Stopped,
}

impl ExitReason {
	fn to_error(&self) -> Error {
		match self {
			ExitReason::Crashed => Error::Crashed,
			ExitReason::Stopped => Error::Stopped,
		}
	}
}

/// Runs the I/O loop for a single worker session.
pub(crate) async fn run_worker_io(
	mut writer: Box<dyn AsyncWrite + Send + Unpin>,
	reader: Box<dyn AsyncRead + Send + Unpin>,
	mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
	mut fatal_rx: mpsc::UnboundedReceiver<String>,
	session: Arc<Session>,
) {
	let mut lines = BufReader::new(reader).lines();
	let mut pending: HashMap<RequestId, oneshot::Sender<Result<JsonValue>>> = HashMap::new();
	let mut fatal_open = true;

	let reason = loop {
		tokio::select! {
			out = outbound_rx.recv() => match out {
				Some(Outbound::Request { request, response_tx }) => {
					let id = request.id;
					match write_request(&mut writer, &request).await {
						Ok(()) => {
							pending.insert(id, response_tx);
						}
						Err(e) => {
							session.record_error(format!("write failed: {e}"));
							tracing::error!(id, error = %e, "Outbound write failed; terminating worker I/O");
							let _ = response_tx.send(Err(e));
							break ExitReason::Crashed;
						}
					}
				}
				Some(Outbound::Shutdown) | None => break ExitReason::Stopped,
			},

			line = lines.next_line() => match line {
				Ok(Some(line)) => handle_line(&line, &mut pending),
				Ok(None) => {
					session.record_error("worker closed stdout".into());
					tracing::warn!("Worker closed its stdout; treating as crash");
					break ExitReason::Crashed;
				}
				Err(e) => {
					session.record_error(format!("read failed: {e}"));
					tracing::error!(error = %e, "Error reading from worker");
					break ExitReason::Crashed;
				}
			},

			fatal = fatal_rx.recv(), if fatal_open => match fatal {
				Some(msg) => {
					session.record_error(msg.clone());
					tracing::error!(message = %msg, "Fatal worker fault on stderr");
					break ExitReason::Crashed;
				}
				None => fatal_open = false,
			},
		}
	};

	session.alive.store(false, Ordering::Release);

	// In-flight work is lost; callers must re-issue after restart.
	for (_, tx) in pending.drain() {
		let _ = tx.send(Err(reason.to_error()));
	}
	while let Ok(out) = outbound_rx.try_recv() {
		if let Outbound::Request { response_tx, .. } = out {
			let _ = response_tx.send(Err(reason.to_error()));
		}
	}
}

/// Watches the worker's stderr for fatal fault patterns.
///
/// Ordinary stderr chatter is logged and ignored; only patterns that
/// indicate the interpreter itself is going down escalate to a crash.
pub(crate) async fn run_stderr_watch(
	stderr: Box<dyn AsyncRead + Send + Unpin>,
	fatal_tx: mpsc::UnboundedSender<String>,
) {
	const FATAL_PATTERNS: &[&str] = &["Segmentation fault", "Fatal error", "Out of memory", "Aborted"];

	let mut lines = BufReader::new(stderr).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		if FATAL_PATTERNS.iter().any(|p| line.contains(p)) {
			let _ = fatal_tx.send(format!("worker fault: {line}"));
			return;
		}
		tracing::debug!(line = %line, "Worker stderr");
	}
}

async fn write_request(writer: &mut (dyn AsyncWrite + Send + Unpin), request: &BridgeRequest) -> Result<()> {
	let mut frame = serde_json::to_string(request)?;
	frame.push('\n');
	writer.write_all(frame.as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}

fn handle_line(line: &str, pending: &mut HashMap<RequestId, oneshot::Sender<Result<JsonValue>>>) {
	let line = line.trim();
	if line.is_empty() {
		return;
	}

	let resp: BridgeResponse = match serde_json::from_str(line) {
		Ok(resp) => resp,
		Err(e) => {
			tracing::warn!(error = %e, "Discarding malformed worker frame");
			return;
		}
	};

	let Some(tx) = pending.remove(&resp.id) else {
		// Stale or unknown id: never delivered to a caller.
		tracing::warn!(id = resp.id, "Response for unknown request id");
		return;
	};

	let result = match (resp.result, resp.error) {
		(Some(result), None) => Ok(result),
		(None, Some(error)) => Err(Error::Worker(error)),
		(Some(result), Some(_)) => Ok(result),
		(None, None) => Err(Error::Protocol("response carries neither result nor error".into())),
	};
	let _ = tx.send(result);
}
