//! Configuration loading (spec §6 "Configuration is via a map of named
//! options"), layered over a TOML file and environment variables the way
//! the teacher's `chainflip-engine` settings modules use the `config`
//! crate, with a thin `clap` layer for command-line overrides.

use std::{collections::HashMap, time::Duration};

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::coordinator::SelectionPolicy;

#[derive(Parser, Debug, Clone, Default)]
pub struct CommandLineOptions {
	/// Path to a TOML config file layered under environment variables.
	#[clap(long, env = "CONFIG_FILE")]
	pub config_file: Option<String>,

	#[clap(long, env = "PARTY_ID")]
	pub party_id: Option<u32>,

	#[clap(long, env = "THRESHOLD")]
	pub threshold: Option<u32>,

	#[clap(long, env = "TOTAL_PARTIES")]
	pub total_parties: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
	pub rpc: String,
	pub signal_address: String,
	#[serde(default = "default_confirmation_depth")]
	pub confirmation_depth: u64,
}

fn default_confirmation_depth() -> u64 {
	12
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreBackend {
	File,
	Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub party_id: u32,
	pub threshold: u32,
	pub total_parties: u32,
	/// Bind address for this party's transport listener. When no peer
	/// transport is configured at all, the supervisor falls back to the
	/// in-process `LoopbackBus` (useful for local development and tests).
	pub transport_endpoint: Option<String>,
	pub keystore_backend: KeystoreBackend,
	/// Directory the file key store backend writes encrypted shares to.
	#[serde(default = "default_keystore_path")]
	pub keystore_path: String,
	#[serde(default)]
	pub chains: HashMap<String, ChainConfig>,
	#[serde(default = "default_round_timeout_ms")]
	pub round_timeout_ms: u64,
	#[serde(default = "default_heartbeat_window_ms")]
	pub heartbeat_window_ms: u64,
	#[serde(default)]
	pub selection_policy: SelectionPolicyConfig,
	#[serde(default = "default_http_bind")]
	pub http_bind: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicyConfig {
	#[default]
	FirstAvailable,
	HashRotation,
}

impl From<SelectionPolicyConfig> for SelectionPolicy {
	fn from(value: SelectionPolicyConfig) -> Self {
		match value {
			SelectionPolicyConfig::FirstAvailable => SelectionPolicy::FirstAvailable,
			SelectionPolicyConfig::HashRotation => SelectionPolicy::HashRotation,
		}
	}
}

fn default_keystore_path() -> String {
	"./keystore".to_string()
}

fn default_round_timeout_ms() -> u64 {
	60_000
}

fn default_heartbeat_window_ms() -> u64 {
	10_000
}

fn default_http_bind() -> String {
	"127.0.0.1:8080".to_string()
}

impl Settings {
	pub fn round_timeout(&self) -> Duration {
		Duration::from_millis(self.round_timeout_ms)
	}

	pub fn heartbeat_window(&self) -> Duration {
		Duration::from_millis(self.heartbeat_window_ms)
	}

	/// Layers, lowest to highest priority: built-in defaults, an optional
	/// TOML file, environment variables (`<SECTION>__<KEY>` or the flat
	/// keys named in spec §6), then explicit CLI flags.
	pub fn load(opts: CommandLineOptions) -> Result<Self, ConfigError> {
		let mut builder = Config::builder()
			.set_default("threshold", 3)?
			.set_default("total_parties", 5)?
			.set_default("keystore_backend", "file")?
			.set_default("keystore_path", default_keystore_path())?
			.set_default("round_timeout_ms", default_round_timeout_ms() as i64)?
			.set_default("heartbeat_window_ms", default_heartbeat_window_ms() as i64)?
			.set_default("http_bind", default_http_bind())?;

		if let Some(path) = &opts.config_file {
			builder = builder.add_source(File::with_name(path));
		}

		builder = builder.add_source(Environment::default().separator("__"));

		if let Some(party_id) = opts.party_id {
			builder = builder.set_override("party_id", party_id as i64)?;
		}
		if let Some(threshold) = opts.threshold {
			builder = builder.set_override("threshold", threshold as i64)?;
		}
		if let Some(total_parties) = opts.total_parties {
			builder = builder.set_override("total_parties", total_parties as i64)?;
		}

		let settings: Settings = builder.build()?.try_deserialize()?;
		settings.validate()?;
		Ok(settings)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.party_id == 0 {
			return Err(ConfigError::Message("PARTY_ID must not be zero".into()))
		}
		if self.threshold < 2 || self.threshold > self.total_parties {
			return Err(ConfigError::Message(format!(
				"THRESHOLD must satisfy 2 <= t <= N (got t={}, N={})",
				self.threshold, self.total_parties
			)))
		}
		Ok(())
	}
}
