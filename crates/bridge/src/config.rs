//! Configuration for the worker subprocess.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for spawning the Pike analysis worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
	/// Path to the Pike executable.
	pub command: PathBuf,
	/// Path to the worker entry script, passed as the first argument.
	pub entry_script: PathBuf,
	/// Additional arguments appended after the entry script.
	#[serde(default)]
	pub args: Vec<String>,
	/// Working directory for the worker process.
	#[serde(default)]
	pub cwd: Option<PathBuf>,
	/// Environment variables to set for the worker.
	#[serde(default)]
	pub env: HashMap<String, String>,
}

impl BridgeConfig {
	/// Create a configuration for the given executable and entry script.
	pub fn new(command: impl Into<PathBuf>, entry_script: impl Into<PathBuf>) -> Self {
		Self {
			command: command.into(),
			entry_script: entry_script.into(),
			args: Vec::new(),
			cwd: None,
			env: HashMap::new(),
		}
	}

	/// Append extra command line arguments.
	pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Set the worker's working directory.
	pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}

	/// Add environment variables.
	pub fn env(mut self, env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
		self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		self
	}
}
