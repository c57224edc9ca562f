use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::WorkContext;

/// Interval at which cancellable waits re-check their context.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A signal that is closed exactly once, carrying the outcome of a unit of
/// work to any number of waiters.
///
/// Clones share the same signal. Closing an already closed latch is a no-op.
#[derive(Debug)]
pub struct DoneLatch<T> {
	inner: Arc<(Mutex<Option<T>>, Condvar)>,
}

impl<T> Clone for DoneLatch<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Default for DoneLatch<T> {
	fn default() -> Self {
		Self {
			inner: Arc::new((Mutex::new(None), Condvar::new())),
		}
	}
}

impl<T: Clone> DoneLatch<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Closes the latch with `value`, waking every waiter.
	///
	/// Returns false if the latch was already closed.
	pub fn close(&self, value: T) -> bool {
		let (lock, cvar) = &*self.inner;
		let mut slot = lock.lock();
		if slot.is_some() {
			return false;
		}
		*slot = Some(value);
		cvar.notify_all();
		true
	}

	/// True when both handles refer to the same signal.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	pub fn is_closed(&self) -> bool {
		self.inner.0.lock().is_some()
	}

	/// Outcome, if already closed.
	pub fn get(&self) -> Option<T> {
		self.inner.0.lock().clone()
	}

	/// Blocks until closed.
	pub fn wait(&self) -> T {
		let (lock, cvar) = &*self.inner;
		let mut slot = lock.lock();
		loop {
			if let Some(value) = slot.as_ref() {
				return value.clone();
			}
			cvar.wait(&mut slot);
		}
	}

	/// Blocks until closed or `deadline` passes.
	pub fn wait_until(&self, deadline: Instant) -> Option<T> {
		let (lock, cvar) = &*self.inner;
		let mut slot = lock.lock();
		loop {
			if let Some(value) = slot.as_ref() {
				return Some(value.clone());
			}
			if cvar.wait_until(&mut slot, deadline).timed_out() {
				return slot.clone();
			}
		}
	}

	pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
		self.wait_until(Instant::now() + timeout)
	}

	/// Blocks until closed, `ctx` expires, or the optional `deadline` passes.
	pub fn wait_with(&self, ctx: &WorkContext, deadline: Option<Instant>) -> Option<T> {
		loop {
			if ctx.is_expired() {
				return self.get();
			}
			let now = Instant::now();
			let mut tick = now + POLL_INTERVAL;
			if let Some(deadline) = deadline {
				if now >= deadline {
					return self.get();
				}
				tick = tick.min(deadline);
			}
			if let Some(value) = self.wait_until(tick) {
				return Some(value);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_close_wins() {
		let latch = DoneLatch::new();
		assert!(latch.close(1));
		assert!(!latch.close(2));
		assert_eq!(latch.get(), Some(1));
	}

	#[test]
	fn wait_returns_value_from_other_thread() {
		let latch = DoneLatch::new();
		let remote = latch.clone();
		let handle = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			remote.close("done");
		});
		assert_eq!(latch.wait(), "done");
		handle.join().unwrap();
	}

	#[test]
	fn wait_until_times_out_on_open_latch() {
		let latch: DoneLatch<()> = DoneLatch::new();
		assert_eq!(latch.wait_timeout(Duration::from_millis(10)), None);
		assert!(!latch.is_closed());
	}

	#[test]
	fn wait_with_returns_on_cancellation() {
		let latch: DoneLatch<u8> = DoneLatch::new();
		let ctx = WorkContext::new();
		let remote = ctx.clone();
		let handle = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			remote.cancel();
		});
		assert_eq!(latch.wait_with(&ctx, None), None);
		handle.join().unwrap();
	}

	#[test]
	fn wait_with_honours_deadline() {
		let latch: DoneLatch<u8> = DoneLatch::new();
		let deadline = Instant::now() + Duration::from_millis(15);
		assert_eq!(latch.wait_with(&WorkContext::new(), Some(deadline)), None);
		assert!(Instant::now() >= deadline);
	}
}
