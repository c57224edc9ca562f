#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Speculative completion mixing.
//!
//! The engine keeps a cache of provider results for the current buffer state
//! (the root) and for states the user is likely to reach by accepting one of
//! those results. Background workers fill that cache ahead of time; a
//! blocking update waits only for the providers marked blocking and then
//! mixes everything reachable from the root into one ranked list.
//!
//! # Main Types
//!
//! - [`Driver`] - owns the worker threads and serves updates
//! - [`Scheduler`] - priority queue and completion cache over buffer states
//! - [`ProviderRegistry`] - the providers and their scheduling roles
//! - [`mix`] - collect, sort, filter, prune and render cached completions
//!
//! # Flow
//!
//! ```text
//! Driver::update(root)
//! ├── Scheduler::update        // copy forward, reschedule, orphan
//! ├── blocking providers       // per-request threads, bounded wait
//! └── mix                      // tree of compositions -> Vec<RenderedCompletion>
//! ```

pub mod driver;
mod error;
pub mod mixing;
pub mod options;
pub mod provider;
pub mod registry;
pub mod scheduler;

pub use driver::{Driver, UpdateMetrics};
pub use error::{EngineError, FixtureError, ProviderError, Result};
pub use mixing::{RenderedCompletion, SemanticFilter, mix};
pub use options::{DisplayOptions, DriverConfig, MixOptions, Options, ScheduleOptions};
pub use provider::{Analyzer, Applicability, MetaCompletion, MixingMeta, Provider, ProviderName, ReferentKind};
pub use registry::{Comparator, ProviderEntry, ProviderFlags, ProviderRegistry, ProviderTable};
pub use scheduler::{
	CachedCompletion, FixtureEntry, SCORE_EPSILON, Scheduler, SchedulerFixture, WorkItem, WorkKey, WorkStatus,
};
