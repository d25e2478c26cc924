//! Per-document symbol/diagnostic snapshots.
//!
//! One [`DocumentCacheEntry`] per open document, replaced wholesale on each
//! successful validation. Readers hold an `Arc` snapshot and are never
//! exposed to a partially-updated entry; a write from a stale version is
//! rejected so an older in-flight validation can never clobber a newer one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lsp_types::{Diagnostic, Position, Uri};
use parking_lot::RwLock;

use crate::symbol::Symbol;
use crate::token::Token;

/// The most recent successfully-analyzed snapshot of one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentCacheEntry {
	/// Document version the snapshot was computed from.
	pub version: i32,
	/// Symbol tree for the document.
	pub symbols: Vec<Symbol>,
	/// Diagnostics produced by the last validation.
	pub diagnostics: Vec<Diagnostic>,
	/// Every occurrence of each known symbol name in the text.
	pub symbol_positions: HashMap<String, Vec<Position>>,
}

/// Store of per-document snapshots, keyed by URI.
///
/// Owned, injected state; each document has exactly one writer (the
/// validation pipeline) while readers clone stable `Arc` snapshots.
pub struct DocumentStore {
	entries: RwLock<HashMap<Uri, Arc<DocumentCacheEntry>>>,
}

impl DocumentStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// Insert or replace the snapshot for `uri`.
	///
	/// Returns `false` and leaves the store untouched when `entry.version`
	/// is lower than the stored version: the newer snapshot already won.
	pub fn insert(&self, uri: Uri, entry: DocumentCacheEntry) -> bool {
		let mut entries = self.entries.write();
		if let Some(current) = entries.get(&uri)
			&& entry.version < current.version
		{
			tracing::debug!(
				uri = uri.as_str(),
				stale = entry.version,
				current = current.version,
				"Rejecting stale document snapshot"
			);
			return false;
		}
		entries.insert(uri, Arc::new(entry));
		true
	}

	/// Stable snapshot of the document's entry, if analyzed.
	pub fn get(&self, uri: &Uri) -> Option<Arc<DocumentCacheEntry>> {
		self.entries.read().get(uri).cloned()
	}

	/// Remove the entry on document close.
	pub fn remove(&self, uri: &Uri) -> Option<Arc<DocumentCacheEntry>> {
		self.entries.write().remove(uri)
	}

	/// Whether the document has an analyzed snapshot.
	pub fn contains(&self, uri: &Uri) -> bool {
		self.entries.read().contains_key(uri)
	}

	/// Diagnostics of the last validation, empty when unknown.
	pub fn diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
		self.entries
			.read()
			.get(uri)
			.map(|e| e.diagnostics.clone())
			.unwrap_or_default()
	}

	/// Number of cached documents.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether the store is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}

impl Default for DocumentStore {
	fn default() -> Self {
		Self::new()
	}
}

/// Build the symbol-position index from exact tokenizer output.
///
/// This is the authoritative path: every token whose text matches a known
/// symbol name contributes an occurrence.
pub fn positions_from_tokens(names: &HashSet<&str>, tokens: &[Token]) -> HashMap<String, Vec<Position>> {
	let mut index: HashMap<String, Vec<Position>> = HashMap::new();
	for token in tokens {
		if names.contains(token.text.as_str()) {
			index.entry(token.text.clone()).or_default().push(Position {
				line: token.line,
				character: token.character,
			});
		}
	}
	index
}

/// Word-boundary fallback scan used when the tokenizer path fails.
///
/// Matches whole identifiers only and skips `//` comments, `/* */` blocks
/// and single/double-quoted string literals (including escapes), so a
/// symbol mentioned in a comment never becomes a navigation target.
pub fn scan_positions(text: &str, names: &HashSet<&str>) -> HashMap<String, Vec<Position>> {
	let mut index: HashMap<String, Vec<Position>> = HashMap::new();
	let mut in_block_comment = false;

	for (line_no, line) in text.lines().enumerate() {
		let chars: Vec<char> = line.chars().collect();
		let mut i = 0;
		while i < chars.len() {
			if in_block_comment {
				if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
					in_block_comment = false;
					i += 2;
				} else {
					i += 1;
				}
				continue;
			}
			match chars[i] {
				'/' if chars.get(i + 1) == Some(&'/') => break,
				'/' if chars.get(i + 1) == Some(&'*') => {
					in_block_comment = true;
					i += 2;
				}
				quote @ ('"' | '\'') => {
					i += 1;
					while i < chars.len() {
						if chars[i] == '\\' {
							i += 2;
						} else if chars[i] == quote {
							i += 1;
							break;
						} else {
							i += 1;
						}
					}
				}
				c if c.is_ascii_alphabetic() || c == '_' => {
					let start = i;
					while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
						i += 1;
					}
					let word: String = chars[start..i].iter().collect();
					if names.contains(word.as_str()) {
						index.entry(word).or_default().push(Position {
							line: line_no as u32,
							character: start as u32,
						});
					}
				}
				_ if chars[i].is_ascii_digit() => {
					// Skip numbers so `0x1f` never yields the identifier `x1f`.
					while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
						i += 1;
					}
				}
				_ => i += 1,
			}
		}
	}
	index
}
