//! In-process worker harness for engine-level tests.
//!
//! Builds a [`Bridge`] whose spawner hands out in-memory duplex pipes and
//! serves them with a scripted handler, so tests exercise the real wire
//! protocol (framing, id correlation, restart) without a subprocess.

use std::sync::Arc;

use parking_lot::Mutex;
use pike_bridge::{Bridge, BridgeConfig, BridgeRequest, BridgeResponse, WorkerPipes, WorkerSpawner};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Per-method handler: `Ok` becomes a result frame, `Err` an error frame.
pub(crate) type Handler = dyn Fn(&str, &JsonValue) -> Result<JsonValue, String> + Send + Sync;

/// Records every call the fake worker has served.
#[derive(Clone, Default)]
pub(crate) struct CallLog {
	calls: Arc<Mutex<Vec<(String, JsonValue)>>>,
}

impl CallLog {
	pub(crate) fn count(&self, method: &str) -> usize {
		self.calls.lock().iter().filter(|(m, _)| m == method).count()
	}

	pub(crate) fn total(&self) -> usize {
		self.calls.lock().len()
	}
}

struct DuplexSpawner {
	sessions: mpsc::UnboundedSender<tokio::io::DuplexStream>,
}

impl WorkerSpawner for DuplexSpawner {
	fn spawn(&self, _config: &BridgeConfig) -> pike_bridge::Result<WorkerPipes> {
		let (client, server) = tokio::io::duplex(256 * 1024);
		let (reader, writer) = tokio::io::split(client);
		self.sessions
			.send(server)
			.map_err(|_| pike_bridge::Error::Protocol("test worker loop gone".into()))?;
		Ok(WorkerPipes {
			writer: Box::new(writer),
			reader: Box::new(reader),
			stderr: None,
			pid: None,
			child: None,
		})
	}
}

/// Build a bridge served by `handler`; sessions restart transparently.
pub(crate) fn scripted_bridge(handler: Box<Handler>) -> (Arc<Bridge>, CallLog) {
	let (sessions_tx, mut sessions_rx) = mpsc::unbounded_channel();
	let spawner = Arc::new(DuplexSpawner { sessions: sessions_tx });
	let bridge = Arc::new(Bridge::with_spawner(
		BridgeConfig::new("pike", "worker.pike"),
		spawner,
	));
	let log = CallLog::default();

	let serve_log = log.clone();
	tokio::spawn(async move {
		while let Some(server) = sessions_rx.recv().await {
			let (read, mut write) = tokio::io::split(server);
			let mut reader = BufReader::new(read);
			loop {
				let mut line = String::new();
				match reader.read_line(&mut line).await {
					Ok(0) | Err(_) => break,
					Ok(_) => {}
				}
				let req: BridgeRequest = match serde_json::from_str(line.trim()) {
					Ok(req) => req,
					Err(_) => break,
				};
				serve_log.calls.lock().push((req.method.clone(), req.params.clone()));
				let resp = match handler(&req.method, &req.params) {
					Ok(result) => BridgeResponse {
						id: req.id,
						result: Some(result),
						error: None,
					},
					Err(error) => BridgeResponse {
						id: req.id,
						result: None,
						error: Some(error),
					},
				};
				let mut frame = serde_json::to_string(&resp).unwrap();
				frame.push('\n');
				if write.write_all(frame.as_bytes()).await.is_err() {
					break;
				}
			}
		}
	});

	(bridge, log)
}
