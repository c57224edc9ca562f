use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use sibyl_primitives::SelectedBufferHash;

type Slot<I> = Arc<RwLock<Option<Arc<I>>>>;

/// Bounded cache of analyzed inputs keyed by buffer state.
///
/// Each state gets its own slot so concurrent providers on the same state
/// wait for a single analysis instead of repeating it. Failed analyses are
/// not cached.
pub(crate) struct InputsCache<I> {
	slots: Mutex<LruCache<SelectedBufferHash, Slot<I>>>,
}

impl<I> InputsCache<I> {
	pub fn new(capacity: NonZeroUsize) -> Self {
		Self {
			slots: Mutex::new(LruCache::new(capacity)),
		}
	}

	pub fn get_or_compute<E>(&self, key: SelectedBufferHash, compute: impl FnOnce() -> Result<I, E>) -> Result<Arc<I>, E> {
		let slot = Arc::clone(self.slots.lock().get_or_insert(key, || Arc::new(RwLock::new(None))));
		if let Some(inputs) = slot.read().as_ref() {
			return Ok(Arc::clone(inputs));
		}

		let mut guard = slot.write();
		if let Some(inputs) = guard.as_ref() {
			return Ok(Arc::clone(inputs));
		}
		let inputs = Arc::new(compute()?);
		*guard = Some(Arc::clone(&inputs));
		Ok(inputs)
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn clear(&self) {
		self.slots.lock().clear();
	}
}
