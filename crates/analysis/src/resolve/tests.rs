use std::collections::HashSet;

use super::*;
use crate::stdlib::StdlibIndex;
use crate::testutil::scripted_bridge;

fn uri(s: &str) -> Uri {
	s.parse().unwrap()
}

fn program(
	uri_str: &str,
	symbols: Vec<Symbol>,
	inherits: Vec<&str>,
	imports: Vec<&str>,
	includes: Vec<&str>,
) -> CompiledProgramInfo {
	CompiledProgramInfo::new(
		uri(uri_str),
		1,
		symbols,
		inherits.into_iter().map(String::from).collect(),
		imports.into_iter().map(String::from).collect::<HashSet<_>>(),
		includes.into_iter().map(String::from).collect(),
	)
}

fn empty_stdlib() -> StdlibIndex {
	let (bridge, _log) = scripted_bridge(Box::new(|_, _| Err("no modules".into())));
	StdlibIndex::new(bridge)
}

async fn stdlib_with(modules: &[(&str, Vec<Symbol>)]) -> StdlibIndex {
	let scripted: Vec<(String, serde_json::Value)> = modules
		.iter()
		.map(|(path, symbols)| {
			let value = serde_json::json!({
				"resolved_path": format!("/usr/lib/pike/{path}.pmod"),
				"symbols": symbols,
			});
			(path.to_string(), value)
		})
		.collect();
	let (bridge, _log) = scripted_bridge(Box::new(move |_, params| {
		let wanted = params["module"].as_str().unwrap_or_default();
		scripted
			.iter()
			.find(|(path, _)| path == wanted)
			.map(|(_, value)| value.clone())
			.ok_or_else(|| format!("unknown module: {wanted}"))
	}));
	let index = StdlibIndex::new(bridge);
	for (path, _) in modules {
		index.get_module(path).await.unwrap().unwrap();
	}
	index
}

#[tokio::test]
async fn test_current_file_beats_include() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	typedb.set_program(program(
		"file:///ws/globals.h",
		vec![
			Symbol::new("MAX_CLIENTS", SymbolKind::Constant),
			Symbol::new("shutdown", SymbolKind::Method),
		],
		vec![],
		vec![],
		vec![],
	));
	let main = program(
		"file:///ws/main.pike",
		vec![Symbol::new("shutdown", SymbolKind::Method)],
		vec![],
		vec![],
		vec!["globals.h"],
	);

	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	let own = waterfall.resolve("shutdown").unwrap();
	assert_eq!(own.origin, "file:///ws/main.pike");
	let included = waterfall.resolve("MAX_CLIENTS").unwrap();
	assert_eq!(included.origin, "file:///ws/globals.h");
	assert_eq!(included.symbol.kind, SymbolKind::Constant);
}

#[tokio::test]
async fn test_include_beats_inherit() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	typedb.set_program(program(
		"file:///ws/defs.h",
		vec![Symbol::new("log_level", SymbolKind::Variable)],
		vec![],
		vec![],
		vec![],
	));
	typedb.set_program(program(
		"file:///ws/base.pike",
		vec![
			Symbol::new("log_level", SymbolKind::Variable),
			Symbol::new("base_only", SymbolKind::Method),
		],
		vec![],
		vec![],
		vec![],
	));
	let main = program(
		"file:///ws/main.pike",
		vec![],
		vec!["base"],
		vec![],
		vec!["defs.h"],
	);

	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	assert_eq!(waterfall.resolve("log_level").unwrap().origin, "file:///ws/defs.h");
	assert_eq!(waterfall.resolve("base_only").unwrap().origin, "file:///ws/base.pike");
}

#[tokio::test]
async fn test_imported_module_symbols_visible() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = stdlib_with(&[(
		"Protocols.HTTP",
		vec![Symbol::new("get_url", SymbolKind::Method)],
	)])
	.await;

	let main = program("file:///ws/main.pike", vec![], vec![], vec!["Protocols.HTTP"], vec![]);
	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	let hit = waterfall.resolve("get_url").unwrap();
	assert_eq!(hit.origin, "Protocols.HTTP");
	assert_eq!(hit.symbol.kind, SymbolKind::Method);
}

#[tokio::test]
async fn test_inherit_nearest_ancestor_wins() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	typedb.set_program(program(
		"file:///ws/grandparent.pike",
		vec![
			Symbol::new("create", SymbolKind::Method).typed("void"),
			Symbol::new("oldest_only", SymbolKind::Method),
		],
		vec![],
		vec![],
		vec![],
	));
	typedb.set_program(program(
		"file:///ws/parent.pike",
		vec![Symbol::new("create", SymbolKind::Method).typed("int")],
		vec!["grandparent"],
		vec![],
		vec![],
	));
	let child = program("file:///ws/child.pike", vec![], vec!["parent"], vec![], vec![]);

	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&child);

	let create = waterfall.resolve("create").unwrap();
	assert_eq!(create.origin, "file:///ws/parent.pike");
	assert_eq!(create.symbol.type_name.as_deref(), Some("int"));
	// Deeper ancestors remain reachable for names the parent lacks.
	assert_eq!(
		waterfall.resolve("oldest_only").unwrap().origin,
		"file:///ws/grandparent.pike"
	);
	assert!(waterfall.warnings().is_empty());
}

#[tokio::test]
async fn test_inherit_cycle_stops_with_warning() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	typedb.set_program(program(
		"file:///ws/a.pike",
		vec![Symbol::new("from_a", SymbolKind::Method)],
		vec!["b"],
		vec![],
		vec![],
	));
	typedb.set_program(program(
		"file:///ws/b.pike",
		vec![Symbol::new("from_b", SymbolKind::Method)],
		vec!["a"],
		vec![],
		vec![],
	));
	let main = program("file:///ws/a.pike", vec![Symbol::new("from_a", SymbolKind::Method)], vec!["b"], vec![], vec![]);

	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	// Traversal terminated and still collected the reachable ancestor.
	assert!(waterfall.resolve("from_b").is_some());
	assert_eq!(
		waterfall.warnings(),
		&[ResolutionWarning::InheritCycle { class: "a".into() }]
	);
}

#[tokio::test]
async fn test_nested_class_inherit_members() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	let base = Symbol::new("Connection", SymbolKind::Class).with_children(vec![
		Symbol::new("send", SymbolKind::Method),
		Symbol::new("peer", SymbolKind::Variable),
	]);
	typedb.set_program(program("file:///ws/net.pike", vec![base], vec![], vec![], vec![]));

	let main = program("file:///ws/server.pike", vec![], vec!["Connection"], vec![], vec![]);
	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	let send = waterfall.resolve("send").unwrap();
	assert_eq!(send.origin, "file:///ws/net.pike");
	assert_eq!(send.symbol.kind, SymbolKind::Method);
}

#[tokio::test]
async fn test_stdlib_name_tier_exposes_top_level_module() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = stdlib_with(&[(
		"Stdio.File",
		vec![Symbol::new("read", SymbolKind::Method)],
	)])
	.await;

	let main = program("file:///ws/main.pike", vec![], vec![], vec![], vec![]);
	let waterfall = WaterfallBuilder::new(&typedb, &stdlib).build(&main);

	let module = waterfall.resolve("Stdio").unwrap();
	assert_eq!(module.origin, "stdlib");
	assert_eq!(module.symbol.kind, SymbolKind::Module);
}

#[tokio::test]
async fn test_visible_merges_first_wins() {
	let typedb = TypeDatabase::new(u64::MAX);
	let stdlib = empty_stdlib();

	typedb.set_program(program(
		"file:///ws/base.pike",
		vec![
			Symbol::new("shared", SymbolKind::Variable),
			Symbol::new("inherited_only", SymbolKind::Method),
		],
		vec![],
		vec![],
		vec![],
	));
	let main = program(
		"file:///ws/main.pike",
		vec![Symbol::new("shared", SymbolKind::Method)],
		vec!["base"],
		vec![],
		vec![],
	);

	let visible = WaterfallBuilder::new(&typedb, &stdlib).build(&main).visible();

	assert_eq!(visible["shared"].symbol.kind, SymbolKind::Method);
	assert_eq!(visible["shared"].origin, "file:///ws/main.pike");
	assert!(visible.contains_key("inherited_only"));
}

#[test]
fn test_resolve_include_uri_normalizes_segments() {
	let base = uri("file:///ws/src/main.pike");
	assert_eq!(
		resolve_include_uri(&base, "../parent/globals.h").unwrap().as_str(),
		"file:///ws/parent/globals.h"
	);
	assert_eq!(
		resolve_include_uri(&base, "./defs.h").unwrap().as_str(),
		"file:///ws/src/defs.h"
	);
	// `..` never escapes the scheme root.
	assert_eq!(
		resolve_include_uri(&base, "../../../../etc/defs.h").unwrap().as_str(),
		"file:///etc/defs.h"
	);
}

#[test]
fn test_split_qualified() {
	assert_eq!(split_qualified("Stdio.File->read"), Some(("Stdio.File", "read")));
	assert_eq!(split_qualified("Foo::bar"), Some(("Foo", "bar")));
	assert_eq!(split_qualified("Protocols.HTTP.get_url"), Some(("Protocols.HTTP", "get_url")));
	assert_eq!(split_qualified("plain"), None);
	assert_eq!(split_qualified("obj->"), None);
}

#[test]
fn test_extract_type_name() {
	assert_eq!(extract_type_name("object(Connection)").as_deref(), Some("Connection"));
	assert_eq!(extract_type_name("Stdio.File").as_deref(), Some("Stdio.File"));
	assert_eq!(extract_type_name("  int  ").as_deref(), Some("int"));
	assert_eq!(extract_type_name(""), None);
}
