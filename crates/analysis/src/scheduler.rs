//! Debounced per-document validation scheduling.
//!
//! Every document tracks one pending timer at most. A new edit restarts
//! the debounce window by bumping the document's timer generation; the
//! previously spawned timer wakes, sees a stale generation and drops out.
//! While a validation is running, further requests do not stack: the
//! newest one is parked in a single rerun slot and dispatched when the
//! running pass finishes, so a burst of edits costs at most one
//! in-flight validation plus one queued.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::Uri;
use parking_lot::Mutex;

/// The work the scheduler dispatches.
///
/// Implementations must tolerate overlapping calls for different
/// documents; calls for the same document are serialized by the
/// scheduler.
pub trait Validator: Send + Sync + 'static {
	/// Validate one document snapshot.
	fn validate(&self, uri: Uri, version: i32, text: Arc<str>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

struct PendingRun {
	version: i32,
	text: Arc<str>,
}

#[derive(Default)]
struct DocState {
	/// Bumped on every schedule/cancel; stale timers compare and bail.
	timer_generation: u64,
	running: bool,
	rerun: Option<PendingRun>,
}

/// State shared with the spawned timer and run tasks.
struct Inner {
	validator: Arc<dyn Validator>,
	delay: Duration,
	docs: Mutex<HashMap<Uri, DocState>>,
}

/// Per-document debounce and coalescing front of the validation pipeline.
pub struct ValidationScheduler {
	inner: Arc<Inner>,
}

impl ValidationScheduler {
	/// Create a scheduler dispatching to `validator` after `delay`.
	pub fn new(validator: Arc<dyn Validator>, delay: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				validator,
				delay,
				docs: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Schedule a validation after the debounce window.
	///
	/// An earlier pending window for the same document is abandoned; only
	/// the newest snapshot reaches the validator.
	pub fn schedule(&self, uri: Uri, version: i32, text: Arc<str>) {
		let generation = self.inner.bump_generation(&uri);
		tracing::trace!(uri = uri.as_str(), version, generation, "Debounce window started");

		let inner = Arc::clone(&self.inner);
		tokio::spawn(async move {
			tokio::time::sleep(inner.delay).await;
			if !inner.timer_current(&uri, generation) {
				return;
			}
			inner.run(uri, version, text).await;
		});
	}

	/// Validate immediately, bypassing the debounce window.
	///
	/// Used for open and save, where the snapshot is authoritative and
	/// waiting would only delay diagnostics.
	pub fn schedule_now(&self, uri: Uri, version: i32, text: Arc<str>) {
		self.inner.bump_generation(&uri);

		let inner = Arc::clone(&self.inner);
		tokio::spawn(async move {
			inner.run(uri, version, text).await;
		});
	}

	/// Drop all pending work for a closed document.
	///
	/// A validation already in flight finishes on its own; its completion
	/// handling tolerates the missing entry.
	pub fn cancel(&self, uri: &Uri) {
		let mut docs = self.inner.docs.lock();
		docs.remove(uri);
		tracing::trace!(uri = uri.as_str(), "Cancelled scheduled validation");
	}

	/// Number of documents with scheduler state, for observability.
	pub fn tracked_documents(&self) -> usize {
		self.inner.docs.lock().len()
	}
}

impl Inner {
	fn bump_generation(&self, uri: &Uri) -> u64 {
		let mut docs = self.docs.lock();
		let doc = docs.entry(uri.clone()).or_default();
		doc.timer_generation += 1;
		doc.timer_generation
	}

	fn timer_current(&self, uri: &Uri, generation: u64) -> bool {
		let docs = self.docs.lock();
		docs.get(uri).is_some_and(|doc| doc.timer_generation == generation)
	}

	async fn run(self: Arc<Self>, uri: Uri, version: i32, text: Arc<str>) {
		{
			let mut docs = self.docs.lock();
			// cancel() may have removed the entry before this task ran;
			// a closed document must not come back as scheduler state.
			let Some(doc) = docs.get_mut(&uri) else {
				return;
			};
			if doc.running {
				// Park the newest snapshot; older queued ones are obsolete.
				if doc.rerun.as_ref().is_none_or(|p| p.version <= version) {
					doc.rerun = Some(PendingRun { version, text });
				}
				return;
			}
			doc.running = true;
		}

		let mut next = Some((version, text));
		while let Some((version, text)) = next.take() {
			self.validator.validate(uri.clone(), version, text).await;

			let mut docs = self.docs.lock();
			let Some(doc) = docs.get_mut(&uri) else {
				// Document closed mid-run.
				break;
			};
			match doc.rerun.take() {
				Some(pending) => next = Some((pending.version, pending.text)),
				None => doc.running = false,
			}
		}
	}
}
