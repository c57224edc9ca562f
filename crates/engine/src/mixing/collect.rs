use std::collections::{HashSet, VecDeque};

use sibyl_primitives::{BufferHash, ComposeError, SelectedBuffer, Selection};
use smallvec::SmallVec;

use super::tree::{CompletionTree, NodeId, ROOT};
use crate::provider::{MetaCompletion, ProviderName};
use crate::scheduler::Scheduler;

/// Identity of a collected completion: the buffer it produces and where its
/// placeholders land in that buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DedupKey {
	target: BufferHash,
	placeholders: SmallVec<[Selection; 2]>,
}

impl DedupKey {
	fn new(target: BufferHash, meta: &MetaCompletion) -> Self {
		let c = &meta.completion;
		Self {
			target,
			placeholders: c.snippet.placeholders().iter().map(|ph| ph.shift(c.replace.begin)).collect(),
		}
	}
}

/// Builds the completion tree by walking cached results breadth-first from
/// `root`.
///
/// Completions found on a follow-on state are composed with the completion
/// that led there, so every node is expressed against `root`. Each state is
/// visited once and each distinct (target, placeholders) pair is kept once.
pub(crate) fn collect(sched: &Scheduler, root: &SelectedBuffer) -> CompletionTree {
	let table = sched.table();
	let root_hash = root.hash();
	let mut tree = CompletionTree::new();
	let mut visited = HashSet::new();
	let mut seen: HashSet<DedupKey> = HashSet::new();
	let mut queue: VecDeque<(NodeId, SelectedBuffer)> = VecDeque::from([(ROOT, root.clone())]);

	while let Some((parent, state)) = queue.pop_front() {
		let hash = state.hash();
		if !visited.insert(hash) {
			continue;
		}
		let is_root = hash == root_hash;
		let order: Vec<&ProviderName> = if is_root {
			table.root_order().collect()
		} else {
			table.nested_order().collect()
		};

		for provider in order {
			for cached in sched.cached(&hash, provider) {
				if !is_root && cached.meta.mixing.do_not_compose {
					continue;
				}
				let meta = match tree.meta(parent) {
					None => cached.meta.clone(),
					Some(base) => match compose(base, &cached.meta) {
						Ok(meta) => meta,
						Err(error) => {
							tracing::trace!(%provider, %error, "mix.compose_failed");
							continue;
						}
					},
				};
				if !seen.insert(DedupKey::new(cached.target().hash(), &meta)) {
					continue;
				}
				let node = tree.push(parent, meta);
				queue.extend(cached.speculate().iter().map(|next| (node, next.clone())));
			}
		}
	}
	tree
}

/// Lifts `child`, computed on the state `base` leads to, back onto the
/// state `base` applies to.
fn compose(base: &MetaCompletion, child: &MetaCompletion) -> Result<MetaCompletion, ComposeError> {
	let mut meta = child.clone();
	meta.completion = child.completion.after(&base.completion)?;
	meta.score = base.score * child.score;
	if meta.referent.is_none() {
		meta.referent = base.referent.clone();
		meta.referent_kind = base.referent_kind;
	}
	meta.mixing.provider = base.mixing.provider.clone();
	Ok(meta)
}
