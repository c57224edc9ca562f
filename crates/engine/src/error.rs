use sibyl_primitives::SelectionError;
use sibyl_worker::Expired;

/// Failure reported by a provider or by input analysis.
///
/// [`ProviderError::Expired`] is retryable: the work returns to pending and may
/// be scheduled again. Every other variant completes the work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
	#[error("work context expired")]
	Expired,
	#[error("provider failed: {0}")]
	Failed(String),
	#[error("provider panicked: {0}")]
	Panicked(String),
}

impl From<Expired> for ProviderError {
	fn from(_: Expired) -> Self {
		Self::Expired
	}
}

/// Errors surfaced by [`crate::Driver`] and option parsing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("driver is stopped")]
	Stopped,
	#[error("request cancelled")]
	Cancelled,
	#[error("invalid configuration: {0}")]
	Config(#[from] toml::de::Error),
	#[error("failed to spawn driver thread: {0}")]
	Spawn(#[from] std::io::Error),
}

/// Errors raised while loading a scheduler fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
	#[error("malformed fixture: {0}")]
	Json(#[from] serde_json::Error),
	#[error("fixture completion does not apply to its source: {0}")]
	Selection(#[from] SelectionError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
