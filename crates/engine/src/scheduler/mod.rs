//! Speculative work scheduler.
//!
//! The scheduler tracks, for every buffer state it has seen, the status of
//! each provider on that state and the completions those providers produced.
//! Completions lead to follow-on states (their placeholders and end cursor),
//! which are speculated on up to a depth limit so that results are already
//! cached when the user accepts a completion.
//!
//! # Design
//!
//! - Provisions (one per state and provider) live in a slab and are queued in
//!   an indexed max-heap; only pending provisions with non-negative priority
//!   are queued.
//! - The root tier always outranks deeper tiers. Starting work on a state
//!   boosts its queued siblings, since their inputs are then hot.
//! - [`Scheduler::update`] orphans the whole graph, copies cached results
//!   forward to the new root when the edit allows it, then re-walks the cache
//!   from the root. Orphaned states are kept for reuse until pruned.
//!
//! The scheduler is not thread-safe on its own; the driver guards it with a
//! single lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sibyl_primitives::{Buffer, BufferHash, SelectedBuffer, SelectedBufferHash, SelectionError};
use sibyl_worker::WorkContext;
use slab::Slab;
use smallvec::SmallVec;

use crate::options::ScheduleOptions;
use crate::provider::{MetaCompletion, ProviderName};
use crate::registry::ProviderTable;

mod fixture;
mod heap;
mod reschedule;

pub use fixture::{FixtureEntry, SchedulerFixture};
use heap::ProvisionHeap;

/// Scores closer than this are considered equal.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Priority given to queued work on a state once any of its work starts.
const SIBLING_PRIORITY: f64 = 100.0;

/// Lifecycle of one (state, provider) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkStatus {
	#[default]
	Pending,
	InProgress,
	Complete,
	NotApplicable,
}

/// Hashable identity of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkKey {
	pub state: SelectedBufferHash,
	pub provider: ProviderName,
}

/// A provider to run against a buffer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
	pub buffer: SelectedBuffer,
	pub provider: ProviderName,
}

impl WorkItem {
	pub fn new(buffer: SelectedBuffer, provider: ProviderName) -> Self {
		Self { buffer, provider }
	}

	pub fn key(&self) -> WorkKey {
		WorkKey {
			state: self.buffer.hash(),
			provider: self.provider.clone(),
		}
	}
}

/// A completion cached on its source state, with the states it leads to.
#[derive(Debug, Clone)]
pub struct CachedCompletion {
	pub meta: MetaCompletion,
	states: SmallVec<[SelectedBuffer; 3]>,
}

impl CachedCompletion {
	/// Fails if the completion does not apply to `source`.
	pub fn new(source: &SelectedBuffer, meta: MetaCompletion) -> Result<Self, SelectionError> {
		let states = meta.completion.follow_on_states(source)?;
		Ok(Self { meta, states })
	}

	/// Buffer produced by applying the completion.
	pub fn target(&self) -> &Buffer {
		&self.states[self.states.len() - 1].buffer
	}

	/// Follow-on states: one per placeholder, then the end cursor.
	pub fn speculate(&self) -> &[SelectedBuffer] {
		&self.states
	}
}

pub(crate) struct ProvisionState {
	state: SelectedBufferHash,
	provider: ProviderName,
	status: WorkStatus,
	priority: f64,
	heap_index: Option<usize>,
	cancel: Option<WorkContext>,
	completions: IndexMap<BufferHash, Vec<CachedCompletion>>,
}

impl ProvisionState {
	fn new(state: SelectedBufferHash, provider: ProviderName) -> Self {
		Self {
			state,
			provider,
			status: WorkStatus::Pending,
			priority: -1.0,
			heap_index: None,
			cancel: None,
			completions: IndexMap::new(),
		}
	}
}

struct SpeculationState {
	buffer: SelectedBuffer,
	provisions: IndexMap<ProviderName, usize>,
	/// Shortest known distance from the root; `None` once orphaned.
	depth: Option<usize>,
	score: f64,
	orphaned_at: Instant,
}

impl SpeculationState {
	fn new(buffer: SelectedBuffer) -> Self {
		Self {
			buffer,
			provisions: IndexMap::new(),
			depth: None,
			score: 0.0,
			orphaned_at: Instant::now(),
		}
	}
}

/// Priority queue and result cache for speculative provider work.
pub struct Scheduler {
	table: Arc<ProviderTable>,
	opts: ScheduleOptions,
	specs: HashMap<SelectedBufferHash, SpeculationState>,
	provisions: Slab<ProvisionState>,
	queue: ProvisionHeap,
	root: Option<SelectedBuffer>,
}

impl Scheduler {
	pub fn new(table: Arc<ProviderTable>) -> Self {
		Self {
			table,
			opts: ScheduleOptions::default(),
			specs: HashMap::new(),
			provisions: Slab::new(),
			queue: ProvisionHeap::default(),
			root: None,
		}
	}

	pub fn table(&self) -> &Arc<ProviderTable> {
		&self.table
	}

	/// Current root state, if any update has happened.
	pub fn root(&self) -> Option<&SelectedBuffer> {
		self.root.as_ref()
	}

	/// Distance of `state` from the root, or `None` if unknown or orphaned.
	pub fn depth(&self, state: &SelectedBufferHash) -> Option<usize> {
		self.specs.get(state).and_then(|s| s.depth)
	}

	pub fn num_states(&self) -> usize {
		self.specs.len()
	}

	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// True if any work is queued.
	pub fn has_work(&self) -> bool {
		!self.queue.is_empty()
	}

	/// Highest priority queued work, without dequeueing it.
	///
	/// Call [`Scheduler::work_starting`] before running it.
	pub fn next_work(&self) -> Option<WorkItem> {
		let key = self.queue.peek()?;
		let ps = &self.provisions[key];
		assert!(ps.status == WorkStatus::Pending, "queued work is not pending: {:?}", ps.status);
		Some(WorkItem::new(self.specs[&ps.state].buffer.clone(), ps.provider.clone()))
	}

	/// Status of `item`, creating the state and provision if needed.
	pub fn work_status(&mut self, item: &WorkItem) -> WorkStatus {
		let key = self.provision_key(&item.buffer, &item.provider);
		self.provisions[key].status
	}

	/// Status of `key` without creating anything.
	pub fn status(&self, key: &WorkKey) -> Option<WorkStatus> {
		self.find(key).map(|k| self.provisions[k].status)
	}

	/// Marks pending work as started and records its cancellation handle.
	///
	/// # Panics
	///
	/// Panics if the work is not pending.
	pub fn work_starting(&mut self, item: &WorkItem, cancel: WorkContext) {
		let key = self.provision_key(&item.buffer, &item.provider);
		let status = self.provisions[key].status;
		assert!(
			status == WorkStatus::Pending,
			"starting {} on {} which is {status:?}",
			item.provider,
			item.buffer
		);

		self.queue.set_priority(&mut self.provisions, key, -1.0);
		let ps = &mut self.provisions[key];
		ps.status = WorkStatus::InProgress;
		ps.cancel = Some(cancel);

		let siblings: SmallVec<[usize; 8]> = self.specs[&item.buffer.hash()]
			.provisions
			.values()
			.copied()
			.filter(|&k| self.provisions[k].heap_index.is_some())
			.collect();
		for sibling in siblings {
			self.queue.raise_priority(&mut self.provisions, sibling, SIBLING_PRIORITY);
		}
		tracing::trace!(provider = %item.provider, state = %item.buffer, "sched.work_starting");
	}

	/// Records a completion emitted by `item`'s provider for `source`.
	///
	/// When `source` is reachable from the root, the completion's follow-on
	/// states are scheduled one level deeper.
	pub fn got_completion(&mut self, item: &WorkItem, source: &SelectedBuffer, mut meta: MetaCompletion) {
		meta.mixing.provider = Some(item.provider.clone());
		let cached = match CachedCompletion::new(source, meta) {
			Ok(cached) => cached,
			Err(error) => {
				tracing::debug!(provider = %item.provider, %error, "sched.completion_rejected");
				return;
			}
		};

		let key = self.provision_key(source, &item.provider);
		let follow: SmallVec<[SelectedBuffer; 3]> = cached.speculate().iter().cloned().collect();
		let completion_score = cached.meta.score;
		self.provisions[key]
			.completions
			.entry(cached.target().hash())
			.or_default()
			.push(cached);

		let spec = &self.specs[&source.hash()];
		if let Some(depth) = spec.depth {
			let score = spec.score * completion_score;
			for state in follow {
				self.reschedule(&state, depth + 1, score);
			}
		}
	}

	/// Work ran to completion, successfully or with a non-retryable error.
	pub fn work_complete(&mut self, item: &WorkItem) {
		self.finish(item, WorkStatus::Complete);
	}

	/// Work stopped early, typically on context expiry; it becomes pending
	/// again and is requeued by the next reschedule.
	pub fn work_incomplete(&mut self, item: &WorkItem) {
		self.finish(item, WorkStatus::Pending);
	}

	/// The provider does not apply to this state.
	pub fn work_not_applicable(&mut self, item: &WorkItem) {
		self.finish(item, WorkStatus::NotApplicable);
	}

	fn finish(&mut self, item: &WorkItem, status: WorkStatus) {
		let Some(key) = self.find(&item.key()) else {
			tracing::trace!(provider = %item.provider, "sched.finish_pruned");
			return;
		};
		let ps = &mut self.provisions[key];
		if ps.status != WorkStatus::InProgress {
			tracing::trace!(provider = %item.provider, status = ?ps.status, "sched.finish_not_in_progress");
			return;
		}
		ps.status = status;
		ps.cancel = None;
	}

	/// Moves the root from `old` to `new`.
	///
	/// Does nothing if `new` is already the root. Otherwise every state is
	/// orphaned, results on `old` are copied forward to `new` where the edit
	/// allows it, the graph is re-walked from `new`, and in-flight work on
	/// states that stay orphaned is cancelled.
	pub fn update(&mut self, opts: ScheduleOptions, old: Option<&SelectedBuffer>, new: &SelectedBuffer) {
		self.opts = opts;
		if self.depth(&new.hash()) == Some(0) {
			return;
		}

		self.queue.clear(&mut self.provisions);
		for (_, ps) in self.provisions.iter_mut() {
			ps.priority = -1.0;
		}
		let now = Instant::now();
		for spec in self.specs.values_mut() {
			if spec.depth.take().is_some() {
				spec.orphaned_at = now;
			}
		}

		if let Some(old) = old {
			self.copy_forward(old, new);
		}
		self.reschedule(new, 0, 1.0);
		self.root = Some(new.clone());

		let mut cancelled = 0usize;
		for spec in self.specs.values().filter(|s| s.depth.is_none()) {
			for &key in spec.provisions.values() {
				if let Some(ctx) = &self.provisions[key].cancel {
					ctx.cancel();
					cancelled += 1;
				}
			}
		}
		tracing::debug!(
			root = %new,
			states = self.specs.len(),
			queued = self.queue.len(),
			cancelled,
			"sched.update"
		);
	}

	/// Drops states orphaned for at least `ttl`, cancelling their work.
	///
	/// Returns the number of states removed.
	pub fn prune(&mut self, ttl: Duration) -> usize {
		let now = Instant::now();
		let stale: Vec<SelectedBufferHash> = self
			.specs
			.iter()
			.filter(|(_, s)| s.depth.is_none() && now.duration_since(s.orphaned_at) >= ttl)
			.map(|(hash, _)| *hash)
			.collect();

		for hash in &stale {
			let Some(spec) = self.specs.remove(hash) else { continue };
			for key in spec.provisions.into_values() {
				self.queue.remove(&mut self.provisions, key);
				let ps = self.provisions.remove(key);
				if let Some(ctx) = ps.cancel {
					ctx.cancel();
				}
			}
		}
		if !stale.is_empty() {
			tracing::debug!(removed = stale.len(), remaining = self.specs.len(), "sched.prune");
		}
		stale.len()
	}

	/// Cancels every in-flight work item.
	pub fn cancel_all(&mut self) {
		for (_, ps) in self.provisions.iter() {
			if let Some(ctx) = &ps.cancel {
				ctx.cancel();
			}
		}
	}

	/// Cached completions of `provider` on `state`, grouped by target.
	pub fn cached(&self, state: &SelectedBufferHash, provider: &ProviderName) -> impl Iterator<Item = &CachedCompletion> {
		self.specs
			.get(state)
			.and_then(|s| s.provisions.get(provider))
			.map(|&key| &self.provisions[key])
			.into_iter()
			.flat_map(|ps| ps.completions.values().flatten())
	}

	fn find(&self, key: &WorkKey) -> Option<usize> {
		self.specs.get(&key.state)?.provisions.get(&key.provider).copied()
	}

	fn provision_key(&mut self, sb: &SelectedBuffer, provider: &ProviderName) -> usize {
		let hash = sb.hash();
		let spec = self.specs.entry(hash).or_insert_with(|| SpeculationState::new(sb.clone()));
		if let Some(&key) = spec.provisions.get(provider) {
			return key;
		}
		let key = self.provisions.insert(ProvisionState::new(hash, provider.clone()));
		spec.provisions.insert(provider.clone(), key);
		key
	}
}
