use super::*;
use crate::symbol::SymbolKind;

fn uri(s: &str) -> Uri {
	s.parse().unwrap()
}

fn program(path: &str, symbol_count: usize) -> CompiledProgramInfo {
	let symbols = (0..symbol_count)
		.map(|i| Symbol::new(format!("sym_{i}"), SymbolKind::Variable))
		.collect();
	CompiledProgramInfo::new(uri(path), 1, symbols, Vec::new(), HashSet::new(), Vec::new())
}

/// Checks the exact-accounting invariant: total == sum of live entries.
fn assert_accounting(db: &TypeDatabase) {
	let state = db.state.read();
	let sum: u64 = state.entries.values().map(|e| e.size_bytes).sum();
	assert_eq!(state.total_bytes, sum);
}

#[test]
fn test_size_estimate_is_deterministic() {
	let a = program("file:///a.pike", 10);
	let b = program("file:///b.pike", 10);
	assert_eq!(a.size_bytes, b.size_bytes);
	assert!(a.size_bytes > 0);
}

#[test]
fn test_total_tracks_insert_replace_remove() {
	let db = TypeDatabase::new(u64::MAX);
	let a = program("file:///a.pike", 5);
	let a_size = a.size_bytes;
	db.set_program(a);
	assert_eq!(db.total_bytes(), a_size);
	assert_accounting(&db);

	let bigger = program("file:///a.pike", 50);
	let bigger_size = bigger.size_bytes;
	db.set_program(bigger);
	assert_eq!(db.total_bytes(), bigger_size);
	assert_accounting(&db);

	db.set_program(program("file:///b.pike", 5));
	db.remove_program(&uri("file:///a.pike"));
	assert_accounting(&db);
	assert!(db.get(&uri("file:///a.pike")).is_none());
}

#[test]
fn test_budget_enforced_by_lru_eviction() {
	let one = program("file:///scratch.pike", 20).size_bytes;
	let db = TypeDatabase::new(one * 2);

	db.set_program(program("file:///a.pike", 20));
	db.set_program(program("file:///b.pike", 20));
	db.set_program(program("file:///c.pike", 20));

	// Oldest entry (a) was evicted; the newest two fit the budget.
	assert!(db.get(&uri("file:///a.pike")).is_none());
	assert!(db.get(&uri("file:///b.pike")).is_some());
	assert!(db.get(&uri("file:///c.pike")).is_some());
	assert!(db.total_bytes() <= one * 2);
	assert_accounting(&db);
}

#[test]
fn test_closed_documents_evicted_before_open() {
	let one = program("file:///scratch.pike", 20).size_bytes;
	let db = TypeDatabase::new(one * 2);

	// `a` is oldest but open; `b` is closed.
	db.set_program(program("file:///a.pike", 20));
	db.mark_open(&uri("file:///a.pike"));
	db.set_program(program("file:///b.pike", 20));
	db.set_program(program("file:///c.pike", 20));

	assert!(db.get(&uri("file:///a.pike")).is_some());
	assert!(db.get(&uri("file:///b.pike")).is_none());
	assert!(db.get(&uri("file:///c.pike")).is_some());
	assert_accounting(&db);
}

#[test]
fn test_just_inserted_entry_is_never_evicted() {
	let small = program("file:///scratch.pike", 1).size_bytes;
	let db = TypeDatabase::new(small);

	// A single entry larger than the whole budget is still admitted.
	db.set_program(program("file:///huge.pike", 100));
	assert!(db.get(&uri("file:///huge.pike")).is_some());
	assert_eq!(db.stats().entry_count, 1);
	assert_accounting(&db);
}

#[test]
fn test_open_entry_evicted_when_no_closed_remain() {
	let one = program("file:///scratch.pike", 20).size_bytes;
	let db = TypeDatabase::new(one);

	db.set_program(program("file:///a.pike", 20));
	db.mark_open(&uri("file:///a.pike"));
	db.set_program(program("file:///b.pike", 20));
	db.mark_open(&uri("file:///b.pike"));

	// Both open: the older one still has to go to honor the budget.
	assert!(db.get(&uri("file:///a.pike")).is_none());
	assert!(db.get(&uri("file:///b.pike")).is_some());
	assert_accounting(&db);
}

#[test]
fn test_find_class_across_documents() {
	let db = TypeDatabase::new(u64::MAX);
	let mut info = program("file:///a.pike", 0);
	info.classes = vec![Symbol::new("Connection", SymbolKind::Class)];
	db.set_program(info);

	let hits = db.find_class("Connection");
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].0, uri("file:///a.pike"));
	assert!(db.find_class("Missing").is_empty());
}

#[test]
fn test_stats() {
	let db = TypeDatabase::new(1024 * 1024);
	db.set_program(program("file:///a.pike", 3));
	let stats = db.stats();
	assert_eq!(stats.entry_count, 1);
	assert_eq!(stats.budget_bytes, 1024 * 1024);
	assert_eq!(stats.total_bytes, db.total_bytes());
}
