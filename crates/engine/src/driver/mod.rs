//! Concurrent execution of scheduled provider work.
//!
//! A [`Driver`] owns the [`Scheduler`] behind a single mutex and condvar. A
//! fixed pool of worker threads drains the queue in the background, a
//! collector thread prunes orphaned states, and [`Driver::update`] moves the
//! root, optionally blocking on the blocking providers before mixing.
//!
//! Each update opens a window of `async_timeout` during which workers keep
//! speculating; once it passes, workers sleep until the next update.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sibyl_primitives::SelectedBuffer;
use sibyl_worker::{DoneLatch, TaskClass, WorkContext, spawn_named_thread, spawn_thread};

use crate::error::{EngineError, FixtureError, ProviderError, Result};
use crate::mixing::{RenderedCompletion, SemanticFilter, mix};
use crate::options::{DriverConfig, Options};
use crate::provider::{Analyzer, Applicability, ProviderName};
use crate::registry::{ProviderRegistry, ProviderTable};
use crate::scheduler::{Scheduler, SchedulerFixture, WorkItem, WorkKey, WorkStatus};

mod inputs;
mod worker;
#[cfg(test)]
mod tests;

use inputs::InputsCache;

type WorkOutcome = std::result::Result<Applicability, ProviderError>;

/// Interval at which block-debug waits re-check for remaining work.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Measurements reported for each blocking update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateMetrics {
	/// Blocking providers that did not report themselves not applicable,
	/// including ones that failed, panicked or timed out.
	pub accepted: Vec<ProviderName>,
	/// Providers whose completions made it into the returned list.
	pub fulfilling: Vec<ProviderName>,
	/// Blocking providers still running when the wait gave up.
	pub timed_out: Vec<ProviderName>,
	pub blocked: Duration,
	pub mixed: Duration,
}

struct DriverState<G> {
	/// Workers run until this instant; `None` once stopped.
	pause_at: Option<Instant>,
	global: Option<Arc<G>>,
	sched: Scheduler,
	done: HashMap<WorkKey, DoneLatch<WorkOutcome>>,
}

struct Shared<A: Analyzer> {
	state: Mutex<DriverState<A::Global>>,
	wake: Condvar,
	root_ctx: WorkContext,
	analyzer: A,
	registry: ProviderRegistry<A>,
	filters: Vec<Box<dyn SemanticFilter>>,
	inputs: InputsCache<A::Inputs>,
}

/// Runs providers against buffer states and mixes their results.
pub struct Driver<A: Analyzer> {
	shared: Arc<Shared<A>>,
	threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: Analyzer> Driver<A> {
	/// Starts a driver with its worker and collector threads.
	pub fn new(analyzer: A, registry: ProviderRegistry<A>, config: DriverConfig) -> Result<Self> {
		Self::with_filters(analyzer, registry, config, Vec::new())
	}

	/// Like [`Driver::new`], with semantic filters run after the built-in ones.
	pub fn with_filters(
		analyzer: A,
		registry: ProviderRegistry<A>,
		config: DriverConfig,
		filters: Vec<Box<dyn SemanticFilter>>,
	) -> Result<Self> {
		let capacity = NonZeroUsize::new(config.inputs_capacity()).unwrap_or(NonZeroUsize::MIN);
		let shared = Arc::new(Shared {
			state: Mutex::new(DriverState {
				pause_at: Some(Instant::now()),
				global: None,
				sched: Scheduler::new(Arc::clone(registry.table())),
				done: HashMap::new(),
			}),
			wake: Condvar::new(),
			root_ctx: WorkContext::new(),
			analyzer,
			registry,
			filters,
			inputs: InputsCache::new(capacity),
		});

		let driver = Self {
			shared,
			threads: Mutex::new(Vec::new()),
		};
		for id in 0..config.num_async_workers {
			let shared = Arc::clone(&driver.shared);
			let handle = spawn_named_thread(TaskClass::Speculative, format!("sibyl-worker-{id}"), move || {
				worker::worker_loop(shared)
			})?;
			driver.threads.lock().push(handle);
		}
		let shared = Arc::clone(&driver.shared);
		let interval = config.gc_interval().max(Duration::from_millis(1));
		let handle = spawn_named_thread(TaskClass::Maintenance, "sibyl-gc", move || worker::gc_loop(shared, interval))?;
		driver.threads.lock().push(handle);

		tracing::debug!(workers = config.num_async_workers, gc_interval_ms = config.gc_interval_ms, "driver.start");
		Ok(driver)
	}

	pub fn table(&self) -> &Arc<ProviderTable> {
		self.shared.registry.table()
	}

	/// Moves the root to `buffer` and returns the mixed completions.
	///
	/// Blocks on the blocking providers when `want_completions` is set or in
	/// unit-test mode; otherwise only reschedules and returns an empty list.
	pub fn update(
		&self,
		ctx: &WorkContext,
		opts: &Options,
		global: A::Global,
		buffer: SelectedBuffer,
		want_completions: bool,
	) -> Result<Vec<RenderedCompletion>> {
		self.update_with_metrics(ctx, opts, global, buffer, want_completions, |_| {})
	}

	/// Like [`Driver::update`], reporting [`UpdateMetrics`] for blocking
	/// updates.
	pub fn update_with_metrics(
		&self,
		ctx: &WorkContext,
		opts: &Options,
		global: A::Global,
		buffer: SelectedBuffer,
		want_completions: bool,
		mut metrics: impl FnMut(&UpdateMetrics),
	) -> Result<Vec<RenderedCompletion>> {
		if ctx.is_expired() {
			return Err(EngineError::Cancelled);
		}
		let blocking = want_completions || opts.unit_test_mode;
		let mut waits: Vec<(ProviderName, DoneLatch<WorkOutcome>)> = Vec::new();
		{
			let mut state = self.shared.state.lock();
			if state.pause_at.is_none() {
				return Err(EngineError::Stopped);
			}
			state.pause_at = Some(Instant::now() + opts.async_timeout());
			state.global = Some(Arc::new(global));
			let old = state.sched.root().cloned();
			state.sched.update(opts.schedule, old.as_ref(), &buffer);

			if blocking {
				for provider in self.table().blocking() {
					let item = WorkItem::new(buffer.clone(), provider.clone());
					match state.sched.work_status(&item) {
						WorkStatus::Pending => {
							if let Some(job) = self.shared.claim(&mut state, item) {
								let (item, latch) = (job.item.clone(), job.latch.clone());
								let shared = Arc::clone(&self.shared);
								match spawn_thread(TaskClass::Interactive, move || shared.run(job)) {
									Ok(_) => waits.push((provider.clone(), latch)),
									Err(error) => self.shared.abandon(&mut state, &item, &latch, error),
								}
							}
						}
						WorkStatus::InProgress => {
							if let Some(latch) = state.done.get(&item.key()) {
								waits.push((provider.clone(), latch.clone()));
							}
						}
						WorkStatus::Complete | WorkStatus::NotApplicable => {}
					}
				}
			}
			self.shared.wake.notify_all();
		}

		if !blocking {
			if opts.block_debug {
				self.wait_idle(ctx);
			}
			return Ok(Vec::new());
		}

		let started = Instant::now();
		// Block-debug waits for every blocking provider however long it takes.
		let deadline = if opts.block_debug {
			None
		} else {
			opts.block_timeout().map(|timeout| started + timeout)
		};
		let mut report = UpdateMetrics::default();
		for (provider, latch) in waits {
			if latch.wait_with(ctx, deadline).is_some() {
				continue;
			}
			if ctx.is_expired() {
				return Err(EngineError::Cancelled);
			}
			tracing::warn!(%provider, state = %buffer, "driver.blocking_timeout");
			report.timed_out.push(provider);
		}
		report.blocked = started.elapsed();
		if opts.block_debug {
			self.wait_idle(ctx);
		}

		let mixing = Instant::now();
		let out = {
			let state = self.shared.state.lock();
			for provider in self.table().blocking() {
				let key = WorkKey {
					state: buffer.hash(),
					provider: provider.clone(),
				};
				if state.sched.status(&key) != Some(WorkStatus::NotApplicable) {
					report.accepted.push(provider.clone());
				}
			}
			mix(&state.sched, &buffer, &opts.mix, &self.shared.filters)
		};
		report.mixed = mixing.elapsed();
		for provider in out.iter().filter_map(|c| c.provider.as_ref()) {
			if !report.fulfilling.contains(provider) {
				report.fulfilling.push(provider.clone());
			}
		}
		metrics(&report);
		Ok(out)
	}

	/// Blocks until no work is queued or running, the workers pause, or
	/// `ctx` expires.
	fn wait_idle(&self, ctx: &WorkContext) {
		let mut state = self.shared.state.lock();
		loop {
			let Some(pause_at) = state.pause_at else { return };
			let now = Instant::now();
			let busy = state.sched.has_work() || !state.done.is_empty();
			if !busy || now >= pause_at || ctx.is_expired() {
				return;
			}
			self.shared.wake.wait_until(&mut state, (now + IDLE_POLL).min(pause_at));
		}
	}

	/// Stops the driver: workers exit, in-flight work is cancelled and further
	/// updates fail with [`EngineError::Stopped`].
	pub fn cleanup(&self) {
		let mut state = self.shared.state.lock();
		state.pause_at = None;
		self.shared.root_ctx.cancel();
		state.sched.cancel_all();
		self.shared.wake.notify_all();
		tracing::debug!(in_flight = state.done.len(), "driver.cleanup");
	}

	/// Like [`Driver::cleanup`], then waits for in-flight work to drain.
	pub fn reset(&self) {
		self.cleanup();
		let mut state = self.shared.state.lock();
		while !state.done.is_empty() {
			self.shared.wake.wait(&mut state);
		}
		self.shared.inputs.clear();
	}

	/// Snapshot of the scheduler cache.
	pub fn scheduler_fixture(&self) -> SchedulerFixture {
		self.shared.state.lock().sched.to_fixture()
	}

	/// Adds a snapshot's completions to the scheduler cache.
	pub fn load_fixture(&self, fixture: SchedulerFixture) -> std::result::Result<(), FixtureError> {
		self.shared.state.lock().sched.load_fixture(fixture)
	}
}

impl<A: Analyzer> Drop for Driver<A> {
	fn drop(&mut self) {
		self.cleanup();
		for handle in self.threads.get_mut().drain(..) {
			if handle.join().is_err() {
				tracing::warn!("driver.thread_panicked");
			}
		}
	}
}
