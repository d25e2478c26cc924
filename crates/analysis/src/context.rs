//! Cursor-context classification for completion requests.
//!
//! Two classifiers over the same [`CompletionContext`] answer. The
//! preferred one walks the worker's token stream backwards from the
//! cursor until it hits an access operator or a statement boundary, so
//! it sees past call arguments and other intervening tokens. The
//! textual one scans the current line backwards from the cursor with a
//! regex and only understands an operator directly in front of the
//! prefix; it is the lower-fidelity fallback for when the worker is
//! down or the file fails to tokenize.

use std::sync::LazyLock;

use lsp_types::Position;
use regex::Regex;

use crate::token::Token;

/// What the cursor is positioned in, for completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
	/// Top-level position with nothing typed yet.
	Global,
	/// A bare identifier is being typed.
	Identifier {
		/// Characters typed so far.
		prefix: String,
	},
	/// Member access through `->` or `.` on an object expression.
	MemberAccess {
		/// The expression left of the operator, e.g. `Stdio.File`.
		object: String,
		/// Characters typed after the operator.
		prefix: String,
	},
	/// Scope access through `::`.
	ScopeAccess {
		/// The scope left of the operator.
		scope: String,
		/// Characters typed after the operator.
		prefix: String,
	},
}

/// Trailing object expression: an identifier chain joined by `.` or `->`,
/// anchored at the end of the slice so statement boundaries (`;`, `{`,
/// `(`...) terminate it naturally.
static OBJECT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"([A-Za-z_][A-Za-z0-9_]*(?:(?:\.|->)[A-Za-z_][A-Za-z0-9_]*)*)$").unwrap()
});

/// Classify the cursor from the worker's token stream.
///
/// The backward walk skips over tokens that are neither an access
/// operator nor a statement boundary, so `fd->query_fd() re` still
/// classifies as member access on `fd` where the textual scan cannot.
pub fn completion_context_from_tokens(tokens: &[Token], position: Position) -> CompletionContext {
	let before: Vec<&Token> = tokens
		.iter()
		.filter(|t| {
			t.line < position.line || (t.line == position.line && t.character < position.character)
		})
		.collect();
	let Some((&last, mut scan)) = before.split_last() else {
		return CompletionContext::Global;
	};

	let mut prefix = String::new();
	if last.is_identifier() && touches_cursor(last, position) {
		let typed = (position.character - last.character) as usize;
		prefix = last.text.chars().take(typed).collect();
	} else {
		scan = &before[..];
	}

	for (idx, token) in scan.iter().enumerate().rev() {
		match token.text.as_str() {
			";" | "{" | "}" => break,
			"->" | "." => {
				if let Some(object) = object_chain(&scan[..idx]) {
					return CompletionContext::MemberAccess { object, prefix };
				}
				break;
			}
			"::" => {
				if let Some(scope) = object_chain(&scan[..idx]) {
					return CompletionContext::ScopeAccess { scope, prefix };
				}
				break;
			}
			_ => {}
		}
	}

	if prefix.is_empty() {
		CompletionContext::Global
	} else {
		CompletionContext::Identifier { prefix }
	}
}

fn touches_cursor(token: &Token, position: Position) -> bool {
	token.line == position.line
		&& position.character <= token.character + token.text.chars().count() as u32
}

/// Trailing identifier chain (`conn`, `Stdio.File`) of a token slice.
fn object_chain(tokens: &[&Token]) -> Option<String> {
	let mut parts: Vec<&str> = Vec::new();
	let mut expect_name = true;
	for token in tokens.iter().rev() {
		if expect_name {
			if !token.is_identifier() {
				break;
			}
			parts.push(&token.text);
		} else if matches!(token.text.as_str(), "." | "->") {
			parts.push(&token.text);
		} else {
			break;
		}
		expect_name = !expect_name;
	}
	// Drop a separator left dangling at the front of the chain.
	if parts.last().is_some_and(|p| matches!(*p, "." | "->")) {
		parts.pop();
	}
	if parts.is_empty() {
		return None;
	}
	Some(parts.iter().rev().copied().collect())
}

/// Classify the cursor position in `text` for completion.
pub fn completion_context(text: &str, position: Position) -> CompletionContext {
	let line = text.lines().nth(position.line as usize).unwrap_or("");
	let before: String = line.chars().take(position.character as usize).collect();
	classify(&before)
}

fn classify(before_cursor: &str) -> CompletionContext {
	let (rest, prefix) = split_prefix(before_cursor);
	let rest = rest.trim_end();

	if let Some(expr) = rest.strip_suffix("->") {
		if let Some(object) = object_tail(expr) {
			return CompletionContext::MemberAccess { object, prefix };
		}
	} else if let Some(expr) = rest.strip_suffix("::") {
		if let Some(scope) = object_tail(expr) {
			return CompletionContext::ScopeAccess { scope, prefix };
		}
	} else if let Some(expr) = rest.strip_suffix('.') {
		// `Stdio.` is member access too, but `1.` is a number literal.
		if let Some(object) = object_tail(expr) {
			return CompletionContext::MemberAccess { object, prefix };
		}
	}

	if prefix.is_empty() {
		CompletionContext::Global
	} else {
		CompletionContext::Identifier { prefix }
	}
}

/// Split the identifier being typed off the end of the slice.
fn split_prefix(before_cursor: &str) -> (&str, String) {
	let boundary = before_cursor
		.rfind(|c: char| !is_ident_char(c))
		.map(|i| i + 1)
		.unwrap_or(0);
	let prefix = &before_cursor[boundary..];
	// A prefix starting with a digit is a number literal, not a name.
	if prefix.chars().next().is_some_and(|c| c.is_ascii_digit()) {
		return (&before_cursor[..boundary], String::new());
	}
	(&before_cursor[..boundary], prefix.to_string())
}

fn object_tail(expr: &str) -> Option<String> {
	let tail = OBJECT_TAIL.find(expr.trim_end())?;
	Some(tail.as_str().to_string())
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}
