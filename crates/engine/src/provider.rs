//! The contract between the engine and completion providers.
//!
//! Providers are external collaborators: the engine schedules them against
//! buffer states, feeds them shared analyzed inputs, and records whatever
//! they emit. It never looks inside a provider beyond its name and outcome.

use std::fmt;

use serde::{Deserialize, Serialize};
use sibyl_primitives::{Completion, SelectedBuffer};
use sibyl_worker::WorkContext;

use crate::error::ProviderError;

/// Structural identity of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderName(String);

impl ProviderName {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ProviderName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ProviderName {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// Successful provider outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
	/// The provider ran; it may or may not have emitted completions.
	Applicable,
	/// The provider does not apply to this buffer state. Terminal for the pair.
	NotApplicable,
}

/// What a completion refers to, when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentKind {
	Callable,
	Type,
	#[default]
	Other,
}

/// Metadata attached by the mixer rather than by providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingMeta {
	/// Provider the completion (or the root of its composition chain) came from.
	pub provider: Option<ProviderName>,
	/// Never compose this completion onto a parent.
	pub do_not_compose: bool,
	/// Keep the node in the tree but omit it from rendered output.
	pub hide: bool,
}

/// A completion with provider and mixing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCompletion {
	pub completion: Completion,
	pub score: f64,
	/// Free-form source tag reported to clients.
	#[serde(default)]
	pub source: String,
	/// Short render hint shown next to the completion.
	#[serde(default)]
	pub hint: String,
	#[serde(default)]
	pub referent: Option<String>,
	#[serde(default)]
	pub referent_kind: ReferentKind,
	#[serde(default)]
	pub smart: bool,
	/// Opaque provider side channel, carried through untouched.
	#[serde(default)]
	pub extra: Option<serde_json::Value>,
	#[serde(default)]
	pub mixing: MixingMeta,
}

impl MetaCompletion {
	pub fn new(completion: Completion, score: f64) -> Self {
		Self {
			completion,
			score,
			source: String::new(),
			hint: String::new(),
			referent: None,
			referent_kind: ReferentKind::Other,
			smart: false,
			extra: None,
			mixing: MixingMeta::default(),
		}
	}

	pub fn with_source(mut self, source: impl Into<String>) -> Self {
		self.source = source.into();
		self
	}

	pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
		self.hint = hint.into();
		self
	}

	pub fn with_referent(mut self, referent: impl Into<String>, kind: ReferentKind) -> Self {
		self.referent = Some(referent.into());
		self.referent_kind = kind;
		self
	}

	pub fn smart(mut self) -> Self {
		self.smart = true;
		self
	}

	pub fn do_not_compose(mut self) -> Self {
		self.mixing.do_not_compose = true;
		self
	}

	pub fn hidden(mut self) -> Self {
		self.mixing.hide = true;
		self
	}
}

/// Turns a buffer state into the inputs shared by every provider run on it.
///
/// Inputs are computed at most once per buffer state while cached and are
/// shared read-only between providers.
pub trait Analyzer: Send + Sync + 'static {
	/// Request-wide context, refreshed on every update.
	type Global: Send + Sync + 'static;
	/// Per-state analysis results.
	type Inputs: Send + Sync + 'static;

	fn analyze(&self, ctx: &WorkContext, global: &Self::Global, buffer: &SelectedBuffer) -> Result<Self::Inputs, ProviderError>;
}

/// A pluggable source of completion candidates.
pub trait Provider<A: Analyzer>: Send + Sync {
	fn name(&self) -> ProviderName;

	/// Emits completions for `buffer` through `emit`.
	///
	/// Return [`ProviderError::Expired`] when `ctx` expires mid-run so the work
	/// can be retried.
	fn provide(
		&self,
		ctx: &WorkContext,
		global: &A::Global,
		buffer: &SelectedBuffer,
		inputs: &A::Inputs,
		emit: &mut dyn FnMut(MetaCompletion),
	) -> Result<Applicability, ProviderError>;
}
