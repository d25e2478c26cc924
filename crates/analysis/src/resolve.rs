//! Waterfall symbol resolution.
//!
//! "What is visible from this file" is answered by merging several symbol
//! sources in a fixed precedence order, first match winning on name
//! collisions:
//!
//! 1. symbols declared in the current file,
//! 2. symbols from textual includes,
//! 3. symbols from explicit module imports,
//! 4. symbols inherited from parent classes (depth-first, nearest
//!    ancestor wins),
//! 5. loaded stdlib module names reachable by qualified path.
//!
//! Each tier is an independent [`SymbolSource`] so the precedence list
//! stays an ordered list of strategies rather than one branching
//! function. The waterfall itself is rebuilt per request from the current
//! caches; it is never persisted.

use std::collections::{HashMap, HashSet};

use lsp_types::Uri;

use crate::stdlib::StdlibIndex;
use crate::symbol::{Symbol, SymbolKind, flatten_symbols};
use crate::typedb::{CompiledProgramInfo, TypeDatabase};

/// A symbol together with the file or module it came from.
///
/// The origin is what navigation needs to jump into included or inherited
/// files.
#[derive(Debug, Clone)]
pub struct ResolvedSymbol {
	/// The resolved symbol.
	pub symbol: Symbol,
	/// Originating document URI, file path or stdlib module path.
	pub origin: String,
}

/// Non-fatal problems encountered while building a resolution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
	/// The inheritance chain revisited a class; traversal stopped there.
	InheritCycle {
		/// Name of the class that closed the cycle.
		class: String,
	},
}

/// One tier of the waterfall.
pub trait SymbolSource: Send + Sync {
	/// Where this tier's symbols come from, for diagnostics.
	fn origin(&self) -> &str;
	/// Resolve a single name within this tier.
	fn try_resolve(&self, name: &str) -> Option<ResolvedSymbol>;
	/// All symbols this tier contributes.
	fn symbols(&self) -> Vec<ResolvedSymbol>;
}

/// Flat name-map tier: current file, one include, one imported module.
pub struct MapSource {
	origin: String,
	symbols: HashMap<String, Symbol>,
}

impl MapSource {
	/// Create a tier over a flat name index.
	pub fn new(origin: impl Into<String>, symbols: HashMap<String, Symbol>) -> Self {
		Self {
			origin: origin.into(),
			symbols,
		}
	}
}

impl SymbolSource for MapSource {
	fn origin(&self) -> &str {
		&self.origin
	}

	fn try_resolve(&self, name: &str) -> Option<ResolvedSymbol> {
		self.symbols.get(name).map(|symbol| ResolvedSymbol {
			symbol: symbol.clone(),
			origin: self.origin.clone(),
		})
	}

	fn symbols(&self) -> Vec<ResolvedSymbol> {
		self.symbols
			.values()
			.map(|symbol| ResolvedSymbol {
				symbol: symbol.clone(),
				origin: self.origin.clone(),
			})
			.collect()
	}
}

/// Inheritance tier: flattened members of the chain, nearest ancestor
/// first.
pub struct InheritSource {
	chain: Vec<(String, HashMap<String, Symbol>)>,
}

impl SymbolSource for InheritSource {
	fn origin(&self) -> &str {
		"inherited"
	}

	fn try_resolve(&self, name: &str) -> Option<ResolvedSymbol> {
		self.chain.iter().find_map(|(origin, members)| {
			members.get(name).map(|symbol| ResolvedSymbol {
				symbol: symbol.clone(),
				origin: origin.clone(),
			})
		})
	}

	fn symbols(&self) -> Vec<ResolvedSymbol> {
		let mut seen = HashSet::new();
		let mut all = Vec::new();
		for (origin, members) in &self.chain {
			for (name, symbol) in members {
				if seen.insert(name.clone()) {
					all.push(ResolvedSymbol {
						symbol: symbol.clone(),
						origin: origin.clone(),
					});
				}
			}
		}
		all
	}
}

/// The ordered precedence list, plus warnings from building it.
pub struct Waterfall {
	sources: Vec<Box<dyn SymbolSource>>,
	warnings: Vec<ResolutionWarning>,
}

impl Waterfall {
	/// Resolve one name; the first tier that knows it wins.
	pub fn resolve(&self, name: &str) -> Option<ResolvedSymbol> {
		self.sources.iter().find_map(|source| source.try_resolve(name))
	}

	/// Merge every tier into one flat name map, first tier winning.
	pub fn visible(&self) -> HashMap<String, ResolvedSymbol> {
		let mut merged: HashMap<String, ResolvedSymbol> = HashMap::new();
		for source in &self.sources {
			for resolved in source.symbols() {
				merged.entry(resolved.symbol.name.clone()).or_insert(resolved);
			}
		}
		merged
	}

	/// Warnings collected while the context was built.
	pub fn warnings(&self) -> &[ResolutionWarning] {
		&self.warnings
	}
}

/// Builds waterfalls from the current caches.
///
/// Purely synchronous: anything that has to be fetched from the worker
/// (stdlib modules for imports, for instance) is warmed by the engine
/// before the build.
pub struct WaterfallBuilder<'a> {
	typedb: &'a TypeDatabase,
	stdlib: &'a StdlibIndex,
}

/// A class resolved for inheritance traversal.
struct ClassView {
	origin: String,
	members: HashMap<String, Symbol>,
	parents: Vec<String>,
}

impl<'a> WaterfallBuilder<'a> {
	/// Create a builder over the given caches.
	pub fn new(typedb: &'a TypeDatabase, stdlib: &'a StdlibIndex) -> Self {
		Self { typedb, stdlib }
	}

	/// Build the waterfall for one compiled program.
	pub fn build(&self, program: &CompiledProgramInfo) -> Waterfall {
		let mut sources: Vec<Box<dyn SymbolSource>> = Vec::new();
		let mut warnings = Vec::new();

		// 1. Current file.
		sources.push(Box::new(MapSource::new(
			program.uri.as_str(),
			program.symbols.clone(),
		)));

		// 2. Includes, in source order.
		for include in &program.includes {
			if let Some((origin, symbols)) = self.include_symbols(&program.uri, include) {
				sources.push(Box::new(MapSource::new(origin, symbols)));
			}
		}

		// 3. Imports, sorted for deterministic answers.
		let mut imports: Vec<&String> = program.imports.iter().collect();
		imports.sort_unstable();
		for import in imports {
			if let Some(module) = self.stdlib.cached(import) {
				sources.push(Box::new(MapSource::new(import.clone(), module.symbols.clone())));
			}
		}

		// 4. Inherited classes.
		sources.push(Box::new(self.inherit_chain(program, &mut warnings)));

		// 5. Loaded stdlib module names.
		let mut stdlib_names = HashMap::new();
		for path in self.stdlib.cached_paths() {
			let top = path.split('.').next().unwrap_or(&path).to_string();
			stdlib_names
				.entry(top.clone())
				.or_insert_with(|| Symbol::new(top, SymbolKind::Module));
		}
		sources.push(Box::new(MapSource::new("stdlib", stdlib_names)));

		Waterfall { sources, warnings }
	}

	/// Symbols of one textual include, when its file has been analyzed.
	fn include_symbols(&self, base: &Uri, include: &str) -> Option<(String, HashMap<String, Symbol>)> {
		let entry = resolve_include_uri(base, include)
			.and_then(|uri| self.typedb.get(&uri))
			.or_else(|| self.find_by_file_name(include))?;
		Some((entry.uri.as_str().to_string(), entry.symbols.clone()))
	}

	/// Fallback include lookup by trailing file name.
	fn find_by_file_name(&self, include: &str) -> Option<std::sync::Arc<CompiledProgramInfo>> {
		let file_name = include.rsplit('/').next()?;
		let suffix = format!("/{file_name}");
		self.typedb
			.find_by_suffix(&suffix)
	}

	/// Depth-first inheritance traversal with cycle detection.
	fn inherit_chain(&self, program: &CompiledProgramInfo, warnings: &mut Vec<ResolutionWarning>) -> InheritSource {
		let mut chain = Vec::new();
		let mut visited = HashSet::new();
		visited.insert(program_name(&program.uri));

		for parent in &program.inherits {
			self.visit_parent(program, parent, &mut visited, &mut chain, warnings);
		}
		InheritSource { chain }
	}

	fn visit_parent(
		&self,
		program: &CompiledProgramInfo,
		name: &str,
		visited: &mut HashSet<String>,
		chain: &mut Vec<(String, HashMap<String, Symbol>)>,
		warnings: &mut Vec<ResolutionWarning>,
	) {
		if !visited.insert(name.to_string()) {
			tracing::warn!(class = name, "Inheritance cycle detected");
			warnings.push(ResolutionWarning::InheritCycle { class: name.to_string() });
			return;
		}

		let Some(class) = self.find_parent_class(program, name) else {
			// Unresolvable parent: fall through, not an error.
			tracing::debug!(class = name, "Inherited class not resolvable");
			return;
		};

		chain.push((class.origin.clone(), class.members));
		for parent in &class.parents {
			self.visit_parent(program, parent, visited, chain, warnings);
		}
	}

	/// Locate a parent class: current file, includes, then any cached
	/// document (by class name or by file stem for whole-file programs).
	fn find_parent_class(&self, program: &CompiledProgramInfo, name: &str) -> Option<ClassView> {
		if let Some(class) = program.symbols.get(name).filter(|s| s.kind == SymbolKind::Class) {
			return Some(class_view(program.uri.as_str(), class));
		}

		for include in &program.includes {
			if let Some((origin, symbols)) = self.include_symbols(&program.uri, include)
				&& let Some(class) = symbols.get(name).filter(|s| s.kind == SymbolKind::Class)
			{
				return Some(class_view(&origin, class));
			}
		}

		if let Some((uri, class)) = self.typedb.find_class(name).into_iter().next() {
			return Some(class_view(uri.as_str(), &class));
		}

		// A whole file is itself a program: `inherit "connection"` pulls in
		// connection.pike's top level.
		let stem = name.trim_end_matches(".pike");
		self.typedb.find_by_stem(stem).map(|info| ClassView {
			origin: info.uri.as_str().to_string(),
			members: info.symbols.clone(),
			parents: info.inherits.clone(),
		})
	}
}

fn class_view(origin: &str, class: &Symbol) -> ClassView {
	let parents = class
		.children
		.iter()
		.filter(|c| c.kind == SymbolKind::Inherit)
		.map(|c| c.name.clone())
		.collect();
	ClassView {
		origin: origin.to_string(),
		members: flatten_symbols(&class.children),
		parents,
	}
}

/// File stem of a document URI, used as its program name.
fn program_name(uri: &Uri) -> String {
	uri.as_str()
		.rsplit('/')
		.next()
		.unwrap_or_default()
		.trim_end_matches(".pike")
		.to_string()
}

/// Resolve a textual include path against the including document.
///
/// Joins the include with the document's directory and collapses `.` and
/// `..` segments on the URI's string form.
pub fn resolve_include_uri(base: &Uri, include: &str) -> Option<Uri> {
	let base_str = base.as_str();
	let dir = &base_str[..base_str.rfind('/')? + 1];

	let mut segments: Vec<&str> = dir.trim_end_matches('/').split('/').collect();
	for part in include.split('/') {
		match part {
			"" | "." => {}
			".." => {
				// Never pop past the scheme root (`file://`).
				if segments.len() > 3 {
					segments.pop();
				}
			}
			other => segments.push(other),
		}
	}
	segments.join("/").parse().ok()
}

/// Split a qualified reference on its last access operator.
///
/// `Stdio.File->read` yields `("Stdio.File", "read")`; a name without an
/// operator yields `None`.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
	let mut best: Option<(usize, usize)> = None;
	for op in ["->", "::", "."] {
		if let Some(pos) = name.rfind(op)
			&& best.is_none_or(|(b, _)| pos > b)
		{
			best = Some((pos, op.len()));
		}
	}
	let (pos, len) = best?;
	let (base, member) = (&name[..pos], &name[pos + len..]);
	if base.is_empty() || member.is_empty() {
		return None;
	}
	Some((base, member))
}

/// Extract a class/module name from a declared type.
///
/// `object(Foo)` yields `Foo`; `Stdio.File` is already a path; builtin
/// types yield themselves and simply fail the later class lookup.
pub fn extract_type_name(type_name: &str) -> Option<String> {
	let trimmed = type_name.trim();
	if trimmed.is_empty() {
		return None;
	}
	if let Some(inner) = trimmed.strip_prefix("object(").and_then(|r| r.strip_suffix(')')) {
		return Some(inner.trim().to_string());
	}
	Some(trimmed.split_whitespace().next()?.to_string())
}

#[cfg(test)]
mod tests;
