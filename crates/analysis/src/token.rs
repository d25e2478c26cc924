//! Tokens as reported by the worker's tokenizer.

use serde::{Deserialize, Serialize};

/// A single source token with its start position (0-based line/character).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Raw token text.
	pub text: String,
	/// 0-based line of the token's first character.
	pub line: u32,
	/// 0-based column of the token's first character.
	pub character: u32,
}

impl Token {
	/// Construct a token (test and fallback-path helper).
	pub fn new(text: impl Into<String>, line: u32, character: u32) -> Self {
		Self {
			text: text.into(),
			line,
			character,
		}
	}

	/// Whether the token is an identifier-shaped word.
	pub fn is_identifier(&self) -> bool {
		let mut chars = self.text.chars();
		match chars.next() {
			Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
			_ => return false,
		}
		chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
	}
}
