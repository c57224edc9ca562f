use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Returned when work observes that its context has been cancelled or its
/// deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("work context expired")]
pub struct Expired;

/// Cancellation scope for one unit of work.
///
/// Contexts form a tree: cancelling a parent cancels every child created
/// from it, while cancelling a child leaves the parent untouched. A context
/// may also carry a deadline, after which it reports itself expired without
/// being cancelled.
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
	cancel: CancellationToken,
	deadline: Option<Instant>,
}

impl WorkContext {
	/// Creates a root context with no deadline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Wraps an existing token.
	pub fn from_token(cancel: CancellationToken) -> Self {
		Self { cancel, deadline: None }
	}

	/// Returns a copy that expires at `deadline`, keeping any earlier deadline.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
		self
	}

	/// Returns a copy that expires after `timeout`.
	pub fn with_timeout(self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Creates a child context sharing this context's deadline.
	pub fn child(&self) -> Self {
		Self {
			cancel: self.cancel.child_token(),
			deadline: self.deadline,
		}
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn token(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Cancels this context and all of its children.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// True once cancelled or past the deadline.
	pub fn is_expired(&self) -> bool {
		self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
	}

	/// Fails with [`Expired`] once the context is no longer live.
	///
	/// Long-running providers call this between steps.
	pub fn check(&self) -> Result<(), Expired> {
		if self.is_expired() { Err(Expired) } else { Ok(()) }
	}
}
