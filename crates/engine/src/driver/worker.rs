//! Execution of single work items and the background thread loops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sibyl_worker::{DoneLatch, TaskClass, WorkContext, catch_panic, current_class};

use super::{DriverState, Shared, WorkOutcome};
use crate::error::ProviderError;
use crate::provider::{Analyzer, Applicability, MetaCompletion};
use crate::scheduler::WorkItem;

/// Work claimed under the driver lock, ready to run unlocked.
pub(super) struct Job<G> {
	pub item: WorkItem,
	pub ctx: WorkContext,
	pub global: Arc<G>,
	pub latch: DoneLatch<WorkOutcome>,
}

impl<A: Analyzer> Shared<A> {
	/// Marks `item` started and registers its done signal.
	///
	/// Returns `None` before the first update, when there is no global state
	/// to run providers with.
	pub(super) fn claim(&self, state: &mut DriverState<A::Global>, item: WorkItem) -> Option<Job<A::Global>> {
		let global = Arc::clone(state.global.as_ref()?);
		let ctx = self.root_ctx.child();
		state.sched.work_starting(&item, ctx.clone());
		let latch = DoneLatch::new();
		state.done.insert(item.key(), latch.clone());
		Some(Job {
			item,
			ctx,
			global,
			latch,
		})
	}

	/// Runs a claimed job to completion and records its outcome.
	pub(super) fn run(&self, job: Job<A::Global>) {
		let Job {
			item,
			ctx,
			global,
			latch,
		} = job;
		let started = Instant::now();
		let outcome = self.execute(&item, &ctx, &global);

		let mut state = self.state.lock();
		match &outcome {
			Ok(Applicability::Applicable) => state.sched.work_complete(&item),
			Ok(Applicability::NotApplicable) => state.sched.work_not_applicable(&item),
			Err(ProviderError::Expired) => state.sched.work_incomplete(&item),
			Err(error @ ProviderError::Panicked(_)) => {
				tracing::warn!(provider = %item.provider, %error, "driver.provider_panicked");
				state.sched.work_complete(&item);
			}
			Err(error) => {
				tracing::debug!(provider = %item.provider, %error, "driver.provider_failed");
				state.sched.work_complete(&item);
			}
		}
		let key = item.key();
		if state.done.get(&key).is_some_and(|live| live.ptr_eq(&latch)) {
			state.done.remove(&key);
		}
		tracing::trace!(
			provider = %item.provider,
			state = %item.buffer,
			class = current_class().map_or("caller", TaskClass::as_str),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"driver.work_done"
		);
		latch.close(outcome);
		self.wake.notify_all();
	}

	/// Releases a claimed job whose thread could not be started.
	pub(super) fn abandon(
		&self,
		state: &mut DriverState<A::Global>,
		item: &WorkItem,
		latch: &DoneLatch<WorkOutcome>,
		error: std::io::Error,
	) {
		tracing::warn!(provider = %item.provider, %error, "driver.spawn_failed");
		state.sched.work_incomplete(item);
		let key = item.key();
		if state.done.get(&key).is_some_and(|live| live.ptr_eq(latch)) {
			state.done.remove(&key);
		}
		latch.close(Err(ProviderError::Failed(format!("failed to start provider thread: {error}"))));
		self.wake.notify_all();
	}

	fn execute(&self, item: &WorkItem, ctx: &WorkContext, global: &A::Global) -> WorkOutcome {
		let Some(provider) = self.registry.provider(&item.provider) else {
			return Err(ProviderError::Failed(format!("unknown provider {}", item.provider)));
		};

		catch_panic(|| {
			ctx.check()?;
			let inputs = self
				.inputs
				.get_or_compute(item.buffer.hash(), || self.analyzer.analyze(ctx, global, &item.buffer))?;
			let mut emit = |meta: MetaCompletion| {
				let mut state = self.state.lock();
				state.sched.got_completion(item, &item.buffer, meta);
				self.wake.notify_all();
			};
			provider.provide(ctx, global, &item.buffer, &inputs, &mut emit)
		})
		.unwrap_or_else(|message| Err(ProviderError::Panicked(message)))
	}
}

/// Background worker: runs queued work until the root context is cancelled.
pub(super) fn worker_loop<A: Analyzer>(shared: Arc<Shared<A>>) {
	loop {
		let job = {
			let mut state = shared.state.lock();
			loop {
				if shared.root_ctx.is_cancelled() {
					return;
				}
				let Some(pause_at) = state.pause_at else {
					shared.wake.wait(&mut state);
					continue;
				};
				if Instant::now() >= pause_at {
					shared.wake.wait(&mut state);
					continue;
				}
				let next = state.sched.next_work();
				if let Some(job) = next.and_then(|item| shared.claim(&mut state, item)) {
					break job;
				}
				shared.wake.wait_until(&mut state, pause_at);
			}
		};
		shared.run(job);
	}
}

/// Garbage collector: prunes orphaned states every `interval`.
pub(super) fn gc_loop<A: Analyzer>(shared: Arc<Shared<A>>, interval: Duration) {
	let mut state = shared.state.lock();
	loop {
		let deadline = Instant::now() + interval;
		while !shared.root_ctx.is_cancelled() && Instant::now() < deadline {
			shared.wake.wait_until(&mut state, deadline);
		}
		if shared.root_ctx.is_cancelled() {
			return;
		}
		state.sched.prune(interval);
	}
}
