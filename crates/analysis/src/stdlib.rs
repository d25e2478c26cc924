//! Lazy standard-library module index.
//!
//! Stdlib modules are introspected on demand, never eagerly: bulk-loading
//! the bootstrap modules destabilizes the worker, so a module's symbol
//! table is fetched the first time something asks for it and cached for
//! the session. Nested paths (`Stdio.File`) are independent entries keyed
//! by the full dotted path. A module is either fully loaded or absent;
//! callers never observe a partial load.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use pike_bridge::Bridge;
use serde::Deserialize;
use serde_json::json;

use crate::Result;
use crate::symbol::{Symbol, flatten_symbols};

/// How long a failed resolution suppresses retries for the same path.
///
/// A bridge restart (generation bump) lifts the suppression early; a
/// permanently missing module is retried at most once per window.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Modules warmed by [`StdlibIndex::preload_common`].
const COMMON_MODULES: &[&str] = &["Stdio", "String", "Array", "Mapping", "Protocols", "Sql"];

/// A fully loaded standard-library module.
#[derive(Debug, Clone)]
pub struct StdlibModule {
	/// Dotted module path, e.g. `Stdio.File`.
	pub path: String,
	/// Filesystem path the worker resolved the module to, when known.
	pub resolved_path: Option<String>,
	/// Flat name index of the module's symbols.
	pub symbols: HashMap<String, Symbol>,
	/// When the module was introspected.
	pub loaded_at: Instant,
}

/// Index stats for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdlibStats {
	/// Loaded modules.
	pub module_count: usize,
	/// Symbols across all loaded modules.
	pub symbol_count: usize,
	/// Paths currently under negative caching.
	pub negative_count: usize,
}

/// Worker payload for `introspect_module`.
#[derive(Debug, Deserialize)]
struct IntrospectedModule {
	#[serde(default)]
	resolved_path: Option<String>,
	#[serde(default)]
	symbols: Vec<Symbol>,
}

struct NegativeEntry {
	at: Instant,
	generation: u64,
}

struct IndexState {
	modules: HashMap<String, Arc<StdlibModule>>,
	negative: HashMap<String, NegativeEntry>,
}

/// On-demand, cached resolution of standard-library symbol tables.
pub struct StdlibIndex {
	bridge: Arc<Bridge>,
	state: RwLock<IndexState>,
	/// Per-path gates collapsing concurrent misses into one worker call.
	gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
	negative_ttl: Duration,
}

impl StdlibIndex {
	/// Create an index backed by the given bridge.
	pub fn new(bridge: Arc<Bridge>) -> Self {
		Self::with_negative_ttl(bridge, NEGATIVE_TTL)
	}

	/// Create an index with a custom negative-cache window (tests).
	pub fn with_negative_ttl(bridge: Arc<Bridge>, negative_ttl: Duration) -> Self {
		Self {
			bridge,
			state: RwLock::new(IndexState {
				modules: HashMap::new(),
				negative: HashMap::new(),
			}),
			gates: Mutex::new(HashMap::new()),
			negative_ttl,
		}
	}

	/// Resolve a module by its full dotted path.
	///
	/// Cache hits return immediately; a miss issues exactly one worker
	/// introspection for the path, however many callers are waiting on it.
	/// `Ok(None)` means the worker does not know the module (cached
	/// negatively for a bounded time); `Err` means the bridge itself
	/// failed.
	pub async fn get_module(&self, path: &str) -> Result<Option<Arc<StdlibModule>>> {
		if let Some(hit) = self.lookup(path) {
			return Ok(Some(hit));
		}
		if self.negative_holds(path) {
			return Ok(None);
		}

		let gate = {
			let mut gates = self.gates.lock();
			gates.entry(path.to_string()).or_default().clone()
		};
		let guard = gate.lock().await;

		// Another caller may have completed the load while we waited.
		let outcome = if let Some(hit) = self.lookup(path) {
			Ok(Some(hit))
		} else if self.negative_holds(path) {
			Ok(None)
		} else {
			self.load(path).await
		};

		drop(guard);
		self.gates.lock().remove(path);
		outcome
	}

	async fn load(&self, path: &str) -> Result<Option<Arc<StdlibModule>>> {
		// The call lazily (re)starts a dead worker, bumping the session
		// generation, so worker-answered failures are stamped with the
		// generation read after the call returns.
		let generation_before = self.bridge.generation();
		match self.bridge.call("introspect_module", json!({ "module": path })).await {
			Ok(result) => {
				let parsed: IntrospectedModule = serde_json::from_value(result)
					.map_err(pike_bridge::Error::from)?;
				if parsed.symbols.is_empty() && parsed.resolved_path.is_none() {
					self.store_negative(path, self.bridge.generation());
					return Ok(None);
				}
				let module = Arc::new(StdlibModule {
					path: path.to_string(),
					resolved_path: parsed.resolved_path,
					symbols: flatten_symbols(&parsed.symbols),
					loaded_at: Instant::now(),
				});
				tracing::debug!(path, symbols = module.symbols.len(), "Loaded stdlib module");
				let mut state = self.state.write();
				state.negative.remove(path);
				state.modules.insert(path.to_string(), module.clone());
				Ok(Some(module))
			}
			Err(pike_bridge::Error::Worker(message)) => {
				tracing::debug!(path, %message, "Stdlib module resolution failed");
				self.store_negative(path, self.bridge.generation());
				Ok(None)
			}
			Err(e) => {
				// Bridge-level failure: stamp with the generation observed
				// before the call, so the next restart retries immediately.
				self.store_negative(path, generation_before);
				Err(e.into())
			}
		}
	}

	/// Already-loaded module, without touching the worker.
	pub fn cached(&self, path: &str) -> Option<Arc<StdlibModule>> {
		self.lookup(path)
	}

	/// Dotted paths of all loaded modules.
	pub fn cached_paths(&self) -> Vec<String> {
		self.state.read().modules.keys().cloned().collect()
	}

	/// Warm a fixed set of frequently used top-level modules.
	///
	/// Failures are logged and skipped; one broken module never aborts the
	/// rest. Returns the number of modules loaded.
	pub async fn preload_common(&self) -> usize {
		let mut loaded = 0;
		for path in COMMON_MODULES {
			match self.get_module(path).await {
				Ok(Some(_)) => loaded += 1,
				Ok(None) => tracing::debug!(path, "Common stdlib module not resolvable"),
				Err(e) => tracing::warn!(path, error = %e, "Failed to preload stdlib module"),
			}
		}
		loaded
	}

	/// Index stats for observability.
	pub fn stats(&self) -> StdlibStats {
		let state = self.state.read();
		StdlibStats {
			module_count: state.modules.len(),
			symbol_count: state.modules.values().map(|m| m.symbols.len()).sum(),
			negative_count: state.negative.len(),
		}
	}

	#[cfg(test)]
	pub(crate) fn pending_gates(&self) -> usize {
		self.gates.lock().len()
	}

	fn lookup(&self, path: &str) -> Option<Arc<StdlibModule>> {
		self.state.read().modules.get(path).cloned()
	}

	/// Whether a prior failure still suppresses a retry for this path.
	fn negative_holds(&self, path: &str) -> bool {
		let state = self.state.read();
		let Some(entry) = state.negative.get(path) else {
			return false;
		};
		entry.generation == self.bridge.generation() && entry.at.elapsed() < self.negative_ttl
	}

	fn store_negative(&self, path: &str, generation: u64) {
		self.state.write().negative.insert(
			path.to_string(),
			NegativeEntry {
				at: Instant::now(),
				generation,
			},
		);
	}
}
