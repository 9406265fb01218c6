use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::transport::{Endpoint, Framing, DEFAULT_MAX_RESPONSE_BYTES};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub service: ServiceConfig,
	pub scenarios: ScenarioConfig,
}

/// Where the simulator service listens and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	pub host: String,
	pub port: u16,
	/// Per-call deadline covering connect, send and receive.
	pub timeout_ms: u64,
	pub framing: Framing,
	pub max_response_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
	pub parallel: bool,
	/// Minimum network-failure retries applied to every step.
	pub retries: u32,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".into(),
			port: 8000,
			timeout_ms: 5000,
			framing: Framing::default(),
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
		}
	}
}

impl ServiceConfig {
	pub fn endpoint(&self) -> Endpoint {
		Endpoint::new(self.host.clone(), self.port)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

impl Config {
	/// Directory where harness state is stored (~/.ethsim-harness/).
	///
	/// Falls back to the working directory when there is no home.
	pub fn dir() -> PathBuf {
		dirs::home_dir()
			.unwrap_or_else(|| PathBuf::from("."))
			.join(".ethsim-harness")
	}

	/// Path to the default config file.
	pub fn path() -> PathBuf {
		Self::dir().join("config.toml")
	}

	/// Load the default config file, falling back to defaults if it does
	/// not exist.
	pub fn load() -> anyhow::Result<Self> {
		Self::load_from(&Self::path())
	}

	pub fn load_from(path: &Path) -> anyhow::Result<Self> {
		if !path.exists() {
			return Ok(Self::default());
		}
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("reading {}", path.display()))?;
		toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
	}

	/// Persist the config, creating the parent directory if needed.
	pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, toml::to_string_pretty(self)?)?;
		Ok(())
	}
}
