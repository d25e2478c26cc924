//! The type database: compiled-program info bounded by a byte budget.
//!
//! Entries are whole-program snapshots produced by validation. The store
//! tracks an aggregate byte estimate and evicts least-recently-validated
//! entries when a configured budget is exceeded. Eviction prefers entries
//! whose document has been closed; an open document's entry goes only when
//! no closed entry remains, and the entry just inserted is never a victim.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use lsp_types::Uri;
use parking_lot::RwLock;

use crate::symbol::{Symbol, SymbolKind, flatten_symbols};

/// Introspection snapshot of one compiled program.
#[derive(Debug, Clone)]
pub struct CompiledProgramInfo {
	/// Document the program was compiled from.
	pub uri: Uri,
	/// Document version at compile time.
	pub version: i32,
	/// Flat name index over the program's symbol tree.
	pub symbols: HashMap<String, Symbol>,
	/// Top-level functions.
	pub functions: Vec<Symbol>,
	/// Top-level variables.
	pub variables: Vec<Symbol>,
	/// Classes declared in the program.
	pub classes: Vec<Symbol>,
	/// Parent program/class names from `inherit` declarations, in order.
	pub inherits: Vec<String>,
	/// Imported module paths.
	pub imports: HashSet<String>,
	/// Textual include paths, as written in the source.
	pub includes: Vec<String>,
	/// When this snapshot was produced.
	pub compiled_at: Instant,
	/// Deterministic size estimate used for the budget.
	pub size_bytes: u64,
}

impl CompiledProgramInfo {
	/// Build a snapshot from an introspected symbol tree.
	pub fn new(
		uri: Uri,
		version: i32,
		symbols: Vec<Symbol>,
		inherits: Vec<String>,
		imports: HashSet<String>,
		includes: Vec<String>,
	) -> Self {
		let flat = flatten_symbols(&symbols);
		let functions = symbols.iter().filter(|s| s.kind == SymbolKind::Method).cloned().collect();
		let variables = symbols.iter().filter(|s| s.kind == SymbolKind::Variable).cloned().collect();
		let classes = symbols.iter().filter(|s| s.kind == SymbolKind::Class).cloned().collect();
		let size_bytes = estimate_size(&symbols, &inherits, &imports, &includes);
		Self {
			uri,
			version,
			symbols: flat,
			functions,
			variables,
			classes,
			inherits,
			imports,
			includes,
			compiled_at: Instant::now(),
			size_bytes,
		}
	}
}

/// Deterministic byte estimate for one program snapshot.
///
/// Not an exact measurement; the invariant that matters is that the same
/// input always yields the same estimate, so the aggregate never drifts.
pub fn estimate_size(symbols: &[Symbol], inherits: &[String], imports: &HashSet<String>, includes: &[String]) -> u64 {
	const ENTRY_OVERHEAD: u64 = 256;
	const PER_SYMBOL: u64 = 64;
	const PER_NAME: u64 = 32;

	fn symbol_bytes(symbol: &Symbol) -> u64 {
		let own = PER_SYMBOL
			+ symbol.name.len() as u64
			+ symbol.type_name.as_deref().map_or(0, |t| t.len() as u64)
			+ symbol.documentation.as_deref().map_or(0, |d| d.len() as u64)
			+ symbol.modifiers.iter().map(|m| m.len() as u64).sum::<u64>();
		own + symbol.children.iter().map(symbol_bytes).sum::<u64>()
	}

	ENTRY_OVERHEAD
		+ symbols.iter().map(symbol_bytes).sum::<u64>()
		+ inherits.iter().map(|n| PER_NAME + n.len() as u64).sum::<u64>()
		+ imports.iter().map(|n| PER_NAME + n.len() as u64).sum::<u64>()
		+ includes.iter().map(|n| PER_NAME + n.len() as u64).sum::<u64>()
}

/// Aggregate usage counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDatabaseStats {
	/// Number of live entries.
	pub entry_count: usize,
	/// Sum of entry size estimates.
	pub total_bytes: u64,
	/// Configured budget.
	pub budget_bytes: u64,
}

struct DbState {
	entries: HashMap<Uri, Arc<CompiledProgramInfo>>,
	open: HashSet<Uri>,
	total_bytes: u64,
}

/// Byte-budgeted store of [`CompiledProgramInfo`] keyed by URI.
pub struct TypeDatabase {
	budget: u64,
	state: RwLock<DbState>,
}

impl TypeDatabase {
	/// Create a database with the given byte budget.
	pub fn new(budget: u64) -> Self {
		Self {
			budget,
			state: RwLock::new(DbState {
				entries: HashMap::new(),
				open: HashSet::new(),
				total_bytes: 0,
			}),
		}
	}

	/// Insert or replace the program for its URI, then evict as needed.
	pub fn set_program(&self, info: CompiledProgramInfo) {
		let uri = info.uri.clone();
		let size = info.size_bytes;
		let mut state = self.state.write();

		if let Some(old) = state.entries.insert(uri.clone(), Arc::new(info)) {
			state.total_bytes -= old.size_bytes;
		}
		state.total_bytes += size;

		self.evict_locked(&mut state, &uri);
	}

	/// Remove a program explicitly (document closed and dropped).
	pub fn remove_program(&self, uri: &Uri) {
		let mut state = self.state.write();
		if let Some(old) = state.entries.remove(uri) {
			state.total_bytes -= old.size_bytes;
		}
		state.open.remove(uri);
	}

	/// Mark a document as open; open documents are evicted last.
	pub fn mark_open(&self, uri: &Uri) {
		self.state.write().open.insert(uri.clone());
	}

	/// Mark a document as closed; its entry becomes a preferred victim.
	pub fn mark_closed(&self, uri: &Uri) {
		self.state.write().open.remove(uri);
	}

	/// Whether the document is currently marked open.
	pub fn is_open(&self, uri: &Uri) -> bool {
		self.state.read().open.contains(uri)
	}

	/// Program snapshot for a URI, if cached.
	pub fn get(&self, uri: &Uri) -> Option<Arc<CompiledProgramInfo>> {
		self.state.read().entries.get(uri).cloned()
	}

	/// Search every cached document for classes with the given name.
	///
	/// Last-resort lookup for qualified references; results are unordered.
	pub fn find_class(&self, name: &str) -> Vec<(Uri, Symbol)> {
		let state = self.state.read();
		state
			.entries
			.values()
			.filter_map(|info| {
				info.classes
					.iter()
					.find(|c| c.name == name)
					.map(|c| (info.uri.clone(), c.clone()))
			})
			.collect()
	}

	/// First cached program whose URI ends with the given suffix.
	///
	/// Fallback lookup for include paths that do not resolve to an exact
	/// URI, matching `/globals.h` style tails.
	pub fn find_by_suffix(&self, suffix: &str) -> Option<Arc<CompiledProgramInfo>> {
		let state = self.state.read();
		state
			.entries
			.values()
			.find(|info| info.uri.as_str().ends_with(suffix))
			.cloned()
	}

	/// Cached program whose file stem matches, e.g. `connection` for
	/// `file:///srv/connection.pike`.
	pub fn find_by_stem(&self, stem: &str) -> Option<Arc<CompiledProgramInfo>> {
		let state = self.state.read();
		state
			.entries
			.values()
			.find(|info| {
				info.uri
					.as_str()
					.rsplit('/')
					.next()
					.and_then(|name| name.strip_suffix(".pike"))
					.is_some_and(|s| s == stem)
			})
			.cloned()
	}

	/// Current aggregate usage.
	pub fn total_bytes(&self) -> u64 {
		self.state.read().total_bytes
	}

	/// Usage counters for observability.
	pub fn stats(&self) -> TypeDatabaseStats {
		let state = self.state.read();
		TypeDatabaseStats {
			entry_count: state.entries.len(),
			total_bytes: state.total_bytes,
			budget_bytes: self.budget,
		}
	}

	/// Evict least-recently-validated entries until usage fits the budget.
	///
	/// Victim order: closed documents oldest-first, then open documents
	/// oldest-first. `just_inserted` is exempt, so a single oversized entry
	/// is admitted on its own rather than thrashing.
	fn evict_locked(&self, state: &mut DbState, just_inserted: &Uri) {
		while state.total_bytes > self.budget {
			let victim = state
				.entries
				.values()
				.filter(|info| info.uri != *just_inserted)
				.min_by_key(|info| (state.open.contains(&info.uri), info.compiled_at))
				.map(|info| info.uri.clone());

			let Some(victim) = victim else {
				break;
			};
			if let Some(evicted) = state.entries.remove(&victim) {
				state.total_bytes -= evicted.size_bytes;
				tracing::debug!(
					uri = victim.as_str(),
					freed = evicted.size_bytes,
					total = state.total_bytes,
					"Evicted type database entry"
				);
			}
		}
	}
}

#[cfg(test)]
mod tests;
