//! The engine facade: document lifecycle in, diagnostics and lookups out.
//!
//! Owns every cache and the worker bridge. Collaborators feed it open,
//! change, save and close events; validation runs on the scheduler's
//! debounce policy, and each completed validation publishes one
//! [`DiagnosticsEvent`]. Lookup entry points (symbol resolution,
//! completion) answer from the caches, warming stdlib modules on demand.
//!
//! Worker failures are absorbed: a validation against a dead worker keeps
//! the last good snapshot and warns once, not once per keystroke.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lsp_types::{Diagnostic, Position, Uri};
use pike_bridge::{Bridge, HealthSnapshot};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::AnalysisConfig;
use crate::context::{CompletionContext, completion_context, completion_context_from_tokens};
use crate::document::{self, DocumentCacheEntry, DocumentStore};
use crate::resolve::{self, ResolvedSymbol, Waterfall, WaterfallBuilder};
use crate::scheduler::{ValidationScheduler, Validator};
use crate::stdlib::{StdlibIndex, StdlibModule, StdlibStats};
use crate::symbol::{Symbol, SymbolKind, flatten_symbols, symbol_names};
use crate::token::Token;
use crate::typedb::{CompiledProgramInfo, TypeDatabase, TypeDatabaseStats};

/// Diagnostics published after one completed validation.
#[derive(Debug, Clone)]
pub struct DiagnosticsEvent {
	/// The validated document.
	pub uri: Uri,
	/// Document version the diagnostics belong to.
	pub version: i32,
	/// Full replacement set of diagnostics.
	pub diagnostics: Vec<Diagnostic>,
}

/// Consumer half of the diagnostics stream.
pub type DiagnosticsEventReceiver = mpsc::UnboundedReceiver<DiagnosticsEvent>;

/// Aggregate engine counters for observability.
#[derive(Debug, Clone)]
pub struct EngineStats {
	/// Documents with an analyzed snapshot.
	pub documents: usize,
	/// Documents with scheduler state.
	pub scheduled_documents: usize,
	/// Type database usage.
	pub type_db: TypeDatabaseStats,
	/// Stdlib index usage.
	pub stdlib: StdlibStats,
}

/// Worker wire shape of one full document analysis.
#[derive(Debug, Deserialize)]
struct AnalyzeResult {
	#[serde(default)]
	diagnostics: Vec<Diagnostic>,
	#[serde(default)]
	symbols: Vec<Symbol>,
	#[serde(default)]
	inherits: Vec<String>,
	#[serde(default)]
	imports: HashSet<String>,
	#[serde(default)]
	includes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenizeResult {
	#[serde(default)]
	tokens: Vec<Token>,
}

/// Incremental analysis engine for one workspace.
pub struct AnalysisEngine {
	bridge: Arc<Bridge>,
	documents: DocumentStore,
	typedb: TypeDatabase,
	stdlib: Arc<StdlibIndex>,
	scheduler: ValidationScheduler,
	events: mpsc::UnboundedSender<DiagnosticsEvent>,
	worker_down_warned: AtomicBool,
}

struct EngineValidator {
	engine: Weak<AnalysisEngine>,
}

impl Validator for EngineValidator {
	fn validate(&self, uri: Uri, version: i32, text: Arc<str>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
		let engine = self.engine.clone();
		Box::pin(async move {
			if let Some(engine) = engine.upgrade() {
				engine.validate_document(uri, version, text).await;
			}
		})
	}
}

impl AnalysisEngine {
	/// Create an engine that launches its worker per `config`.
	pub fn new(config: AnalysisConfig) -> (Arc<Self>, DiagnosticsEventReceiver) {
		let bridge = Arc::new(Bridge::new(config.bridge.clone()));
		Self::with_bridge(config, bridge)
	}

	/// Create an engine over an externally-constructed bridge.
	pub fn with_bridge(config: AnalysisConfig, bridge: Arc<Bridge>) -> (Arc<Self>, DiagnosticsEventReceiver) {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let engine = Arc::new_cyclic(|weak: &Weak<AnalysisEngine>| {
			let scheduler = ValidationScheduler::new(
				Arc::new(EngineValidator { engine: weak.clone() }),
				config.debounce_delay(),
			);
			AnalysisEngine {
				bridge: Arc::clone(&bridge),
				documents: DocumentStore::new(),
				typedb: TypeDatabase::new(config.type_db_budget_bytes),
				stdlib: Arc::new(StdlibIndex::new(bridge)),
				scheduler,
				events: events_tx,
				worker_down_warned: AtomicBool::new(false),
			}
		});
		(engine, events_rx)
	}

	/// Start the worker and warm common stdlib modules in the background.
	pub fn start(&self) -> crate::Result<()> {
		self.bridge.start()?;
		let stdlib = Arc::clone(&self.stdlib);
		tokio::spawn(async move {
			let loaded = stdlib.preload_common().await;
			tracing::debug!(loaded, "Stdlib preload finished");
		});
		Ok(())
	}

	/// Stop the worker; caches stay answerable.
	pub async fn shutdown(&self) {
		self.bridge.stop().await;
	}

	/// A document was opened: validate immediately.
	pub fn on_open(&self, uri: Uri, version: i32, text: &str) {
		self.typedb.mark_open(&uri);
		self.scheduler.schedule_now(uri, version, Arc::from(text));
	}

	/// A document changed: validate after the debounce window.
	pub fn on_change(&self, uri: Uri, version: i32, text: &str) {
		self.scheduler.schedule(uri, version, Arc::from(text));
	}

	/// A document was saved: validate immediately.
	pub fn on_save(&self, uri: Uri, version: i32, text: &str) {
		self.scheduler.schedule_now(uri, version, Arc::from(text));
	}

	/// A document was closed.
	///
	/// Pending validation is dropped and the snapshot removed; the compiled
	/// program stays cached for cross-file resolution until budget pressure
	/// evicts it.
	pub fn on_close(&self, uri: &Uri) {
		self.scheduler.cancel(uri);
		self.documents.remove(uri);
		self.typedb.mark_closed(uri);
	}

	/// Diagnostics from the last completed validation.
	pub fn diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
		self.documents.diagnostics(uri)
	}

	/// Last analyzed snapshot of a document.
	pub fn document(&self, uri: &Uri) -> Option<Arc<DocumentCacheEntry>> {
		self.documents.get(uri)
	}

	/// Resolve a (possibly qualified) name as seen from `uri`.
	pub async fn resolve_symbol(&self, uri: &Uri, name: &str) -> Option<ResolvedSymbol> {
		let program = self.typedb.get(uri)?;
		self.warm_imports(&program).await;

		if let Some((base, member)) = resolve::split_qualified(name) {
			let (origin, members) = self.member_map(&program, base).await?;
			return members.get(member).map(|symbol| ResolvedSymbol {
				symbol: symbol.clone(),
				origin,
			});
		}
		self.waterfall(&program).resolve(name)
	}

	/// Classify the cursor and list matching candidate symbols.
	///
	/// Candidates are sorted by name so identical state always yields the
	/// same answer.
	pub async fn completion_candidates(&self, uri: &Uri, text: &str, position: Position) -> Vec<ResolvedSymbol> {
		let context = self.completion_context(text, position).await;
		let Some(program) = self.typedb.get(uri) else {
			return Vec::new();
		};
		self.warm_imports(&program).await;

		let mut candidates = match &context {
			CompletionContext::Global => self.waterfall(&program).visible().into_values().collect(),
			CompletionContext::Identifier { prefix } => self
				.waterfall(&program)
				.visible()
				.into_values()
				.filter(|c| c.symbol.name.starts_with(prefix.as_str()))
				.collect(),
			CompletionContext::MemberAccess { object, prefix }
			| CompletionContext::ScopeAccess { scope: object, prefix } => {
				match self.member_map(&program, object).await {
					Some((origin, members)) => members
						.into_values()
						.filter(|s| s.name.starts_with(prefix.as_str()))
						.map(|symbol| ResolvedSymbol {
							symbol,
							origin: origin.clone(),
						})
						.collect(),
					None => Vec::new(),
				}
			}
		};
		candidates.sort_by(|a, b| a.symbol.name.cmp(&b.symbol.name));
		candidates
	}

	/// Classify the cursor position for completion.
	///
	/// Classification runs over the worker's token stream; when the
	/// worker is down or the text fails to tokenize it degrades to the
	/// lower-fidelity textual scan.
	pub async fn completion_context(&self, text: &str, position: Position) -> CompletionContext {
		match self.tokenize(text).await {
			Some(tokens) => completion_context_from_tokens(&tokens, position),
			None => completion_context(text, position),
		}
	}

	/// Look up a stdlib module, loading it from the worker if needed.
	///
	/// Bridge failures degrade to `None`; the warn-once policy applies.
	pub async fn stdlib_module(&self, path: &str) -> Option<Arc<StdlibModule>> {
		match self.stdlib.get_module(path).await {
			Ok(module) => module,
			Err(e) => {
				self.note_worker_error(&e);
				None
			}
		}
	}

	/// Worker process health.
	pub fn worker_health(&self) -> HealthSnapshot {
		self.bridge.health()
	}

	/// Aggregate cache counters.
	pub fn stats(&self) -> EngineStats {
		EngineStats {
			documents: self.documents.len(),
			scheduled_documents: self.scheduler.tracked_documents(),
			type_db: self.typedb.stats(),
			stdlib: self.stdlib.stats(),
		}
	}

	/// One full validation pass over a document snapshot.
	async fn validate_document(&self, uri: Uri, version: i32, text: Arc<str>) {
		let raw = match self
			.bridge
			.call("analyze", json!({ "uri": uri.as_str(), "version": version, "text": &*text }))
			.await
		{
			Ok(raw) => raw,
			Err(e) => {
				// Keep the previous snapshot; diagnostics stay as they were.
				self.note_worker_error(&e);
				return;
			}
		};
		self.worker_down_warned.store(false, Ordering::Relaxed);

		let analysis: AnalyzeResult = match serde_json::from_value(raw) {
			Ok(analysis) => analysis,
			Err(e) => {
				tracing::error!(uri = uri.as_str(), error = %e, "Malformed analysis result");
				return;
			}
		};

		let names_owned = symbol_names(&analysis.symbols);
		let names: HashSet<&str> = names_owned.iter().map(String::as_str).collect();
		let positions = self.position_index(&text, &names).await;

		if !self.typedb.is_open(&uri) {
			tracing::debug!(uri = uri.as_str(), "Discarding result for closed document");
			return;
		}
		let entry = DocumentCacheEntry {
			version,
			symbols: analysis.symbols.clone(),
			diagnostics: analysis.diagnostics.clone(),
			symbol_positions: positions,
		};
		if !self.documents.insert(uri.clone(), entry) {
			return;
		}
		self.typedb.set_program(CompiledProgramInfo::new(
			uri.clone(),
			version,
			analysis.symbols,
			analysis.inherits,
			analysis.imports,
			analysis.includes,
		));
		tracing::debug!(
			uri = uri.as_str(),
			version,
			diagnostics = analysis.diagnostics.len(),
			"Validation complete"
		);
		let _ = self.events.send(DiagnosticsEvent {
			uri,
			version,
			diagnostics: analysis.diagnostics,
		});
	}

	/// Symbol-position index via the worker tokenizer, or the textual scan
	/// when tokenization is unavailable.
	async fn position_index(&self, text: &str, names: &HashSet<&str>) -> HashMap<String, Vec<Position>> {
		match self.tokenize(text).await {
			Some(tokens) => document::positions_from_tokens(names, &tokens),
			None => document::scan_positions(text, names),
		}
	}

	/// Token stream from the worker, or `None` when tokenization fails.
	async fn tokenize(&self, text: &str) -> Option<Vec<Token>> {
		let raw = match self.bridge.call("tokenize", json!({ "text": text })).await {
			Ok(raw) => raw,
			Err(e) => {
				tracing::debug!(error = %e, "Tokenizer unavailable, using textual fallback");
				return None;
			}
		};
		match serde_json::from_value::<TokenizeResult>(raw) {
			Ok(result) => Some(result.tokens),
			Err(e) => {
				tracing::debug!(error = %e, "Malformed tokenizer result, using textual fallback");
				None
			}
		}
	}

	fn waterfall(&self, program: &CompiledProgramInfo) -> Waterfall {
		WaterfallBuilder::new(&self.typedb, &self.stdlib).build(program)
	}

	/// Load the program's imported modules into the stdlib cache so the
	/// synchronous waterfall sees them.
	async fn warm_imports(&self, program: &CompiledProgramInfo) {
		for import in &program.imports {
			if let Err(e) = self.stdlib.get_module(import).await {
				self.note_worker_error(&e);
			}
		}
	}

	/// Member table of a base expression: a stdlib module path, a visible
	/// class, a typed variable's class, or any cached class by name.
	async fn member_map(&self, program: &CompiledProgramInfo, base: &str) -> Option<(String, HashMap<String, Symbol>)> {
		if let Some(module) = self.stdlib_module(base).await {
			return Some((module_origin(&module), module.symbols.clone()));
		}

		let waterfall = self.waterfall(program);
		if let Some(hit) = waterfall.resolve(base) {
			if hit.symbol.kind == SymbolKind::Class {
				return Some((hit.origin, flatten_symbols(&hit.symbol.children)));
			}
			if let Some(target) = hit.symbol.type_name.as_deref().and_then(resolve::extract_type_name) {
				if let Some(module) = self.stdlib_module(&target).await {
					return Some((module_origin(&module), module.symbols.clone()));
				}
				if let Some(class_hit) = waterfall.resolve(&target)
					&& class_hit.symbol.kind == SymbolKind::Class
				{
					return Some((class_hit.origin, flatten_symbols(&class_hit.symbol.children)));
				}
				if let Some((class_uri, class)) = self.typedb.find_class(&target).into_iter().next() {
					return Some((class_uri.as_str().to_string(), flatten_symbols(&class.children)));
				}
			}
		}

		self.typedb
			.find_class(base)
			.into_iter()
			.next()
			.map(|(class_uri, class)| (class_uri.as_str().to_string(), flatten_symbols(&class.children)))
	}

	fn note_worker_error(&self, error: &dyn std::fmt::Display) {
		if !self.worker_down_warned.swap(true, Ordering::Relaxed) {
			tracing::warn!(%error, "Analysis worker unavailable, keeping last good results");
		} else {
			tracing::debug!(%error, "Analysis worker still unavailable");
		}
	}
}

fn module_origin(module: &StdlibModule) -> String {
	module.resolved_path.clone().unwrap_or_else(|| module.path.clone())
}
