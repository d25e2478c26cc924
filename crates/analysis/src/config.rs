//! Engine configuration.

use std::time::Duration;

use pike_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

/// Lower clamp for the debounce window in milliseconds.
pub const MIN_DEBOUNCE_MS: u64 = 50;
/// Upper clamp for the debounce window in milliseconds.
pub const MAX_DEBOUNCE_MS: u64 = 2000;
/// Debounce window when the client does not configure one.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
/// Default type database budget: 32 MiB.
pub const DEFAULT_TYPE_DB_BUDGET: u64 = 32 * 1024 * 1024;

/// Engine settings, deserialized from client configuration.
///
/// Every field has a default so a partial (or empty) configuration
/// object is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
	/// Debounce window for change-triggered validation, in milliseconds.
	pub debounce_ms: u64,
	/// Byte budget for cached compiled-program info.
	pub type_db_budget_bytes: u64,
	/// How to launch the analysis worker.
	pub bridge: BridgeConfig,
}

impl Default for AnalysisConfig {
	fn default() -> Self {
		Self {
			debounce_ms: DEFAULT_DEBOUNCE_MS,
			type_db_budget_bytes: DEFAULT_TYPE_DB_BUDGET,
			bridge: BridgeConfig::new("pike", "analysis_worker.pike"),
		}
	}
}

impl AnalysisConfig {
	/// The debounce window, clamped to a sane range.
	///
	/// Out-of-range values are clamped rather than rejected so a bad
	/// client setting degrades instead of breaking validation.
	pub fn debounce_delay(&self) -> Duration {
		Duration::from_millis(self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
	}
}
