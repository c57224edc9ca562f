//! Engine configuration.
//!
//! Every struct deserializes with defaults for missing fields, so a partial
//! TOML table is a valid configuration. Durations are stored in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
pub use sibyl_primitives::DisplayOptions;

use crate::error::Result;

const DEFAULT_ASYNC_TIMEOUT_MS: u64 = 4_000;
const DEBUG_ASYNC_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;
const DEFAULT_GC_INTERVAL_MS: u64 = 4_000;

/// Options passed with every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
	pub mix: MixOptions,
	pub schedule: ScheduleOptions,
	/// How long speculation keeps running after an update before workers
	/// pause. Unset means 4s, or 24h in block-debug mode.
	pub async_timeout_ms: Option<u64>,
	/// Upper bound on how long a blocking update waits for blocking providers.
	pub block_timeout_ms: Option<u64>,
	/// Block every update until speculation has drained or paused.
	pub block_debug: bool,
	/// Always block on update, even when no completions are requested.
	pub unit_test_mode: bool,
}

impl Options {
	/// Parses options from a TOML document.
	pub fn from_toml_str(src: &str) -> Result<Self> {
		Ok(toml::from_str(src)?)
	}

	pub fn async_timeout(&self) -> Duration {
		let ms = self.async_timeout_ms.unwrap_or(if self.block_debug {
			DEBUG_ASYNC_TIMEOUT_MS
		} else {
			DEFAULT_ASYNC_TIMEOUT_MS
		});
		Duration::from_millis(ms)
	}

	pub fn block_timeout(&self) -> Option<Duration> {
		self.block_timeout_ms.map(Duration::from_millis)
	}
}

/// Speculation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
	/// States at this distance from the root or further are never scheduled.
	pub depth_limit: usize,
}

impl Default for ScheduleOptions {
	fn default() -> Self {
		Self { depth_limit: 3 }
	}
}

/// Knobs for the mixing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixOptions {
	/// Prune the completion tree to this many nodes; zero disables pruning.
	pub max_returned_completions: usize,
	/// Drop completions that still need placeholders filled in.
	pub disable_snippets: bool,
	/// Drop completions that do not validate against the typed prefix.
	pub prefix_filter: bool,
	/// Keep completions spanning several lines.
	pub allow_multiline: bool,
	/// Editor quirk: the editor does not replace across `$` followed by `.`.
	pub dollar_dot_compat: bool,
	/// Editor quirk: the editor does not replace across `-` followed by `.`.
	pub hyphen_dot_compat: bool,
	/// Keep a single empty call (`name()`) per callee.
	pub empty_call_dedup: bool,
	/// Cap on completions kept per originating provider; zero disables it.
	pub max_per_provider: usize,
	pub display: DisplayOptions,
	/// Prepend the text between the line start and the replace range.
	pub prepend_line_context: bool,
	/// Prefix hints of smart completions with a star.
	pub smart_star: bool,
}

impl Default for MixOptions {
	fn default() -> Self {
		Self {
			max_returned_completions: 0,
			disable_snippets: false,
			prefix_filter: true,
			allow_multiline: true,
			dollar_dot_compat: false,
			hyphen_dot_compat: false,
			empty_call_dedup: false,
			max_per_provider: 0,
			display: DisplayOptions::default(),
			prepend_line_context: false,
			smart_star: true,
		}
	}
}

/// Fixed driver construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
	pub num_async_workers: usize,
	pub gc_interval_ms: u64,
	/// Inputs cache capacity; zero means twice the worker count.
	pub inputs_cache_capacity: usize,
}

impl Default for DriverConfig {
	fn default() -> Self {
		Self {
			num_async_workers: 1,
			gc_interval_ms: DEFAULT_GC_INTERVAL_MS,
			inputs_cache_capacity: 0,
		}
	}
}

impl DriverConfig {
	pub fn from_toml_str(src: &str) -> Result<Self> {
		Ok(toml::from_str(src)?)
	}

	pub fn gc_interval(&self) -> Duration {
		Duration::from_millis(self.gc_interval_ms)
	}

	pub fn inputs_capacity(&self) -> usize {
		match self.inputs_cache_capacity {
			0 => (2 * self.num_async_workers).max(1),
			n => n,
		}
	}
}
