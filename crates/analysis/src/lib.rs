//! Incremental analysis and symbol-resolution engine for Pike tooling.
//!
//! This crate turns raw source edits into symbol, type and diagnostic
//! information for editor features, delegating all parsing and type
//! introspection to an external Pike worker reached through
//! [`pike_bridge::Bridge`]. It deliberately owns no editor-protocol wiring:
//! collaborators feed it document lifecycle events and consume diagnostics
//! and lookup results.
//!
//! The moving parts, leaves first:
//! - [`symbol`]: the symbol tree and its derived flat name index.
//! - [`document`]: per-document snapshot cache with version monotonicity
//!   and the symbol-position index.
//! - [`typedb`]: compiled-program store bounded by a byte budget with
//!   closed-before-open LRU eviction.
//! - [`stdlib`]: lazy, per-path standard-library module index with bounded
//!   negative caching.
//! - [`resolve`]: the waterfall merge of symbol sources (own file,
//!   includes, imports, inherited classes, stdlib).
//! - [`scheduler`]: reset-on-activity debouncing of validation runs, one
//!   in-flight validation per document.
//! - [`context`]: the completion/hover context classifier.
//! - [`engine`]: the facade wiring everything together.
//!
//! All mutable caches are explicitly owned, injected state; there are no
//! process-wide singletons, and multiple independent engines can coexist
//! in one process (the tests rely on this).

pub mod config;
pub mod context;
pub mod document;
pub mod engine;
pub mod resolve;
pub mod scheduler;
pub mod stdlib;
pub mod symbol;
pub mod token;
pub mod typedb;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::AnalysisConfig;
pub use context::{CompletionContext, completion_context, completion_context_from_tokens};
pub use document::{DocumentCacheEntry, DocumentStore};
pub use engine::{AnalysisEngine, DiagnosticsEvent, DiagnosticsEventReceiver};
pub use resolve::{ResolutionWarning, ResolvedSymbol, SymbolSource, Waterfall};
pub use stdlib::{StdlibIndex, StdlibModule};
pub use symbol::{Symbol, SymbolKind};
pub use token::Token;
pub use typedb::{CompiledProgramInfo, TypeDatabase};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures that can escape the engine's entry points.
///
/// Most failure modes never surface here: parse and introspection problems
/// become diagnostics, stale cache writes are rejected silently, budget
/// pressure triggers eviction, and failed lookups return `None`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The worker bridge failed.
	#[error(transparent)]
	Bridge(#[from] pike_bridge::Error),
	/// A module path or include path could not be interpreted.
	#[error("invalid path: {0}")]
	InvalidPath(String),
}
