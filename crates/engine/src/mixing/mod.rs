//! Mixing: turning the scheduler's cache into a ranked completion list.
//!
//! The pipeline runs collect, sort, filter, prune and render in that order
//! over a [`tree::CompletionTree`] that lives for one call to [`mix`].

use serde::Serialize;
use sibyl_primitives::{SelectedBuffer, Selection, Snippet};

use crate::options::MixOptions;
use crate::provider::{MetaCompletion, ProviderName, ReferentKind};
use crate::scheduler::Scheduler;

mod collect;
mod filter;
mod prune;
mod render;
mod sort;
mod tree;

/// One entry of the final completion list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedCompletion {
	pub snippet: Snippet,
	pub replace: Selection,
	pub display: String,
	pub hint: String,
	pub source: String,
	/// Provider at the root of the completion's composition chain.
	pub provider: Option<ProviderName>,
	pub score: f64,
	pub smart: bool,
	pub referent: Option<String>,
	pub referent_kind: ReferentKind,
}

/// Caller-supplied check applied after the built-in filters.
pub trait SemanticFilter: Send + Sync {
	fn name(&self) -> &str;

	/// Returns false to drop `meta` and its subtree.
	fn keep(&self, root: &SelectedBuffer, meta: &MetaCompletion) -> bool;
}

/// Mixes everything cached for `root` and reachable speculative states.
pub fn mix(sched: &Scheduler, root: &SelectedBuffer, opts: &MixOptions, filters: &[Box<dyn SemanticFilter>]) -> Vec<RenderedCompletion> {
	let table = sched.table();
	let mut tree = collect::collect(sched, root);
	let collected = tree.len();

	sort::sort(&mut tree, table, root);
	filter::filter(&mut tree, root, opts, filters);
	let filtered = tree.len();
	if opts.max_returned_completions > 0 {
		prune::prune(&mut tree, opts.max_returned_completions);
	}

	let out = render::render(&tree, root, opts, table);
	tracing::debug!(root = %root, collected, filtered, rendered = out.len(), "mix.done");
	out
}
