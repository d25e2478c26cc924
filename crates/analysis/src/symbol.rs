//! The symbol data model.
//!
//! Symbols form a tree (class → members) as reported by the worker's
//! introspection. The tree is canonical; a flattened, name-indexed view is
//! derived from it wholesale on each update ([`flatten_symbols`]) so the
//! two can never be mutated out of step. Flattened class members carry a
//! synthesized `Outer.Inner` qualified name.

use std::collections::HashMap;

use lsp_types::Position;
use serde::{Deserialize, Serialize};

/// The kind of a declared or introspected symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
	Class,
	Method,
	Variable,
	Constant,
	Typedef,
	Enum,
	EnumConstant,
	Inherit,
	Import,
	Module,
}

/// One symbol in a document or module.
///
/// A symbol without a `position` is legal (it came from introspection
/// rather than a parse of the current text) but cannot be used for
/// position-based navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
	/// Declared name; qualified (`Outer.Inner`) in flattened views.
	pub name: String,
	/// Symbol kind.
	pub kind: SymbolKind,
	/// Declaration position, when known from a parse.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub position: Option<Position>,
	/// Declared or inferred type, e.g. `Stdio.File` or `object(Foo)`.
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub type_name: Option<String>,
	/// Modifiers such as `static`, `private`, `protected`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub modifiers: Vec<String>,
	/// Child symbols (class members, enum constants).
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<Symbol>,
	/// Extracted doc comment, when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub documentation: Option<String>,
}

impl Symbol {
	/// Create a bare symbol.
	pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
		Self {
			name: name.into(),
			kind,
			position: None,
			type_name: None,
			modifiers: Vec::new(),
			children: Vec::new(),
			documentation: None,
		}
	}

	/// Attach a declaration position.
	pub fn at(mut self, line: u32, character: u32) -> Self {
		self.position = Some(Position { line, character });
		self
	}

	/// Attach a declared type.
	pub fn typed(mut self, type_name: impl Into<String>) -> Self {
		self.type_name = Some(type_name.into());
		self
	}

	/// Attach child symbols.
	pub fn with_children(mut self, children: Vec<Symbol>) -> Self {
		self.children = children;
		self
	}
}

/// Derive the flat name index from a symbol tree.
///
/// Children are inserted under `Parent.Child` qualified names, recursively.
/// On duplicate names the first declaration wins, which keeps answers
/// deterministic for malformed input.
pub fn flatten_symbols(symbols: &[Symbol]) -> HashMap<String, Symbol> {
	let mut flat = HashMap::new();
	flatten_into(symbols, None, &mut flat);
	flat
}

fn flatten_into(symbols: &[Symbol], prefix: Option<&str>, flat: &mut HashMap<String, Symbol>) {
	for symbol in symbols {
		let qualified = match prefix {
			Some(prefix) => format!("{prefix}.{}", symbol.name),
			None => symbol.name.clone(),
		};
		flatten_into(&symbol.children, Some(&qualified), flat);
		let mut entry = symbol.clone();
		entry.name = qualified.clone();
		flat.entry(qualified).or_insert(entry);
	}
}

/// Collect the names of every symbol in a tree, qualified names included.
pub fn symbol_names(symbols: &[Symbol]) -> Vec<String> {
	let mut names: Vec<String> = flatten_symbols(symbols).into_keys().collect();
	names.sort_unstable();
	names
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flatten_qualifies_children() {
		let tree = vec![
			Symbol::new("Outer", SymbolKind::Class).with_children(vec![
				Symbol::new("Inner", SymbolKind::Class)
					.with_children(vec![Symbol::new("read", SymbolKind::Method)]),
				Symbol::new("count", SymbolKind::Variable).typed("int"),
			]),
			Symbol::new("main", SymbolKind::Method).at(10, 4),
		];

		let flat = flatten_symbols(&tree);
		assert!(flat.contains_key("Outer"));
		assert!(flat.contains_key("Outer.Inner"));
		assert!(flat.contains_key("Outer.Inner.read"));
		assert_eq!(flat["Outer.count"].type_name.as_deref(), Some("int"));
		assert_eq!(flat["main"].position.map(|p| p.line), Some(10));
	}

	#[test]
	fn test_flatten_first_declaration_wins() {
		let tree = vec![
			Symbol::new("x", SymbolKind::Variable).typed("int"),
			Symbol::new("x", SymbolKind::Variable).typed("string"),
		];
		let flat = flatten_symbols(&tree);
		assert_eq!(flat["x"].type_name.as_deref(), Some("int"));
	}

	#[test]
	fn test_symbol_deserialize_tolerates_missing_fields() {
		let symbol: Symbol =
			serde_json::from_str(r#"{"name": "write", "kind": "method"}"#).unwrap();
		assert_eq!(symbol.kind, SymbolKind::Method);
		assert!(symbol.position.is_none());
		assert!(symbol.children.is_empty());
	}

	#[test]
	fn test_enum_constant_kind_snake_case() {
		let symbol: Symbol =
			serde_json::from_str(r#"{"name": "RED", "kind": "enum_constant"}"#).unwrap();
		assert_eq!(symbol.kind, SymbolKind::EnumConstant);
	}
}
