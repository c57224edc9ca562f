use slab::Slab;

use super::{ProvisionState, WorkStatus};

/// Priorities within this distance below zero still count as queued.
pub(crate) const QUEUE_EPSILON: f64 = 1e-3;

/// Binary max-heap of provision keys ordered by priority.
///
/// Provisions live in the scheduler's slab; each records its own slot in
/// `heap_index` so priority changes and removals are logarithmic. Equal
/// priorities fall back to slab order to keep the queue deterministic.
#[derive(Debug, Default)]
pub(crate) struct ProvisionHeap {
	keys: Vec<usize>,
}

impl ProvisionHeap {
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	pub fn peek(&self) -> Option<usize> {
		self.keys.first().copied()
	}

	/// Sets a provision's priority, queueing, requeueing or dequeueing it.
	///
	/// Only pending provisions with non-negative priority stay queued.
	pub fn set_priority(&mut self, slab: &mut Slab<ProvisionState>, key: usize, priority: f64) {
		let ps = &mut slab[key];
		let enqueue = priority >= -QUEUE_EPSILON && ps.status == WorkStatus::Pending;
		ps.priority = priority;
		match (ps.heap_index, enqueue) {
			(None, true) => self.push(slab, key),
			(Some(i), true) => self.fix(slab, i),
			(Some(i), false) => self.remove_at(slab, i),
			(None, false) => {}
		}
	}

	/// Raises a provision's priority; lower values are ignored.
	pub fn raise_priority(&mut self, slab: &mut Slab<ProvisionState>, key: usize, priority: f64) {
		if priority > slab[key].priority {
			self.set_priority(slab, key, priority);
		}
	}

	pub fn remove(&mut self, slab: &mut Slab<ProvisionState>, key: usize) {
		if let Some(i) = slab[key].heap_index {
			self.remove_at(slab, i);
		}
	}

	/// Dequeues everything and resets every queued priority to -1.
	pub fn clear(&mut self, slab: &mut Slab<ProvisionState>) {
		for key in self.keys.drain(..) {
			let ps = &mut slab[key];
			ps.heap_index = None;
			ps.priority = -1.0;
		}
	}

	fn push(&mut self, slab: &mut Slab<ProvisionState>, key: usize) {
		let ps = &mut slab[key];
		assert!(ps.priority >= -QUEUE_EPSILON, "queueing negative priority work: {}", ps.priority);
		assert!(ps.status == WorkStatus::Pending, "queueing work that is not pending: {:?}", ps.status);
		let index = self.keys.len();
		ps.heap_index = Some(index);
		self.keys.push(key);
		self.sift_up(slab, index);
	}

	fn remove_at(&mut self, slab: &mut Slab<ProvisionState>, index: usize) {
		let last = self.keys.len() - 1;
		self.swap(slab, index, last);
		if let Some(key) = self.keys.pop() {
			slab[key].heap_index = None;
		}
		if index < self.keys.len() {
			self.fix(slab, index);
		}
	}

	fn fix(&mut self, slab: &mut Slab<ProvisionState>, index: usize) {
		if !self.sift_down(slab, index) {
			self.sift_up(slab, index);
		}
	}

	fn outranks(&self, slab: &Slab<ProvisionState>, a: usize, b: usize) -> bool {
		let (ka, kb) = (self.keys[a], self.keys[b]);
		let (pa, pb) = (slab[ka].priority, slab[kb].priority);
		pa > pb || (pa == pb && ka < kb)
	}

	fn swap(&mut self, slab: &mut Slab<ProvisionState>, a: usize, b: usize) {
		self.keys.swap(a, b);
		slab[self.keys[a]].heap_index = Some(a);
		slab[self.keys[b]].heap_index = Some(b);
	}

	fn sift_up(&mut self, slab: &mut Slab<ProvisionState>, mut index: usize) {
		while index > 0 {
			let parent = (index - 1) / 2;
			if !self.outranks(slab, index, parent) {
				break;
			}
			self.swap(slab, index, parent);
			index = parent;
		}
	}

	/// Returns true if the entry moved.
	fn sift_down(&mut self, slab: &mut Slab<ProvisionState>, start: usize) -> bool {
		let mut index = start;
		loop {
			let left = 2 * index + 1;
			if left >= self.keys.len() {
				break;
			}
			let right = left + 1;
			let child = if right < self.keys.len() && self.outranks(slab, right, left) {
				right
			} else {
				left
			};
			if !self.outranks(slab, child, index) {
				break;
			}
			self.swap(slab, index, child);
			index = child;
		}
		index != start
	}

	#[cfg(test)]
	pub fn check_invariants(&self, slab: &Slab<ProvisionState>) {
		for (i, &key) in self.keys.iter().enumerate() {
			assert_eq!(slab[key].heap_index, Some(i), "stale heap index");
			assert_eq!(slab[key].status, WorkStatus::Pending);
			if i > 0 {
				assert!(!self.outranks(slab, i, (i - 1) / 2), "heap order violated at {i}");
			}
		}
	}
}
