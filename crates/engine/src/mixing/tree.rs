use crate::provider::MetaCompletion;

pub(crate) type NodeId = usize;

/// The sentinel root; it has no completion.
pub(crate) const ROOT: NodeId = 0;

struct TreeNode {
	meta: Option<MetaCompletion>,
	children: Vec<NodeId>,
}

/// Arena-allocated completion tree built by one mix.
///
/// Every node's completion is expressed against the root buffer state, so
/// subtrees can be promoted or cut without rewriting completions. Detached
/// nodes stay in the arena but are unreachable from [`ROOT`].
pub(crate) struct CompletionTree {
	nodes: Vec<TreeNode>,
}

type Keep<'a> = dyn FnMut(&mut MetaCompletion) -> bool + 'a;

impl CompletionTree {
	pub fn new() -> Self {
		Self {
			nodes: vec![TreeNode {
				meta: None,
				children: Vec::new(),
			}],
		}
	}

	pub fn push(&mut self, parent: NodeId, meta: MetaCompletion) -> NodeId {
		let id = self.nodes.len();
		self.nodes.push(TreeNode {
			meta: Some(meta),
			children: Vec::new(),
		});
		self.nodes[parent].children.push(id);
		id
	}

	/// Completion of `id`; `None` only for the root.
	pub fn meta(&self, id: NodeId) -> Option<&MetaCompletion> {
		self.nodes[id].meta.as_ref()
	}

	pub fn children(&self, id: NodeId) -> &[NodeId] {
		&self.nodes[id].children
	}

	/// Reachable nodes in pre-order, excluding the root.
	pub fn preorder(&self) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = self.nodes[ROOT].children.iter().rev().copied().collect();
		while let Some(id) = stack.pop() {
			out.push(id);
			stack.extend(self.nodes[id].children.iter().rev());
		}
		out
	}

	/// Number of reachable nodes, excluding the root.
	pub fn len(&self) -> usize {
		self.preorder().len()
	}

	/// Size of every subtree, indexed by node, counting the node itself.
	pub fn subtree_sizes(&self) -> Vec<usize> {
		let mut sizes = vec![1; self.nodes.len()];
		let mut order = vec![ROOT];
		order.extend(self.preorder());
		for &id in order.iter().rev() {
			sizes[id] += self.nodes[id].children.iter().map(|&c| sizes[c]).sum::<usize>();
		}
		sizes
	}

	/// Visits nodes in pre-order, cutting every node (with its subtree) for
	/// which `keep` returns false. `keep` may rewrite the completion.
	pub fn retain(&mut self, mut keep: impl FnMut(&mut MetaCompletion) -> bool) {
		self.retain_from(ROOT, &mut keep);
	}

	/// Like [`CompletionTree::retain`], but a rejected node's children are
	/// promoted into its place.
	pub fn splice(&mut self, mut keep: impl FnMut(&mut MetaCompletion) -> bool) {
		self.splice_from(ROOT, &mut keep);
	}

	/// Replaces the children of `id`.
	pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
		self.nodes[id].children = children;
	}

	/// Reorders every child list. `order` receives the children's completions
	/// and returns a permutation of their indices.
	pub fn reorder_children(&mut self, mut order: impl FnMut(&[&MetaCompletion]) -> Vec<usize>) {
		for id in 0..self.nodes.len() {
			if self.nodes[id].children.len() < 2 {
				continue;
			}
			let children = std::mem::take(&mut self.nodes[id].children);
			let metas: Vec<&MetaCompletion> = children.iter().filter_map(|&c| self.nodes[c].meta.as_ref()).collect();
			let permutation = order(&metas);
			debug_assert_eq!(permutation.len(), children.len());
			let reordered = permutation.into_iter().map(|i| children[i]).collect();
			self.nodes[id].children = reordered;
		}
	}

	fn retain_from(&mut self, id: NodeId, keep: &mut Keep<'_>) {
		let children = std::mem::take(&mut self.nodes[id].children);
		let mut kept = Vec::with_capacity(children.len());
		for child in children {
			if self.keep_node(child, keep) {
				self.retain_from(child, keep);
				kept.push(child);
			}
		}
		self.nodes[id].children = kept;
	}

	fn splice_from(&mut self, id: NodeId, keep: &mut Keep<'_>) {
		let children = std::mem::take(&mut self.nodes[id].children);
		let mut out = Vec::with_capacity(children.len());
		for child in children {
			self.splice_child(child, keep, &mut out);
		}
		self.nodes[id].children = out;
	}

	fn splice_child(&mut self, id: NodeId, keep: &mut Keep<'_>, out: &mut Vec<NodeId>) {
		if self.keep_node(id, keep) {
			self.splice_from(id, keep);
			out.push(id);
			return;
		}
		for child in std::mem::take(&mut self.nodes[id].children) {
			self.splice_child(child, keep, out);
		}
	}

	fn keep_node(&mut self, id: NodeId, keep: &mut Keep<'_>) -> bool {
		self.nodes[id].meta.as_mut().is_some_and(|meta| keep(meta))
	}
}

#[cfg(test)]
mod tests {
	use sibyl_primitives::{Completion, Selection};

	use super::*;

	fn meta(text: &str) -> MetaCompletion {
		MetaCompletion::new(Completion::text(Selection::cursor(0), text), 1.0)
	}

	fn texts(tree: &CompletionTree) -> Vec<String> {
		tree.preorder()
			.into_iter()
			.filter_map(|id| tree.meta(id))
			.map(|m| m.completion.snippet.text().to_owned())
			.collect()
	}

	/// a(b(c), d), e
	fn sample() -> CompletionTree {
		let mut tree = CompletionTree::new();
		let a = tree.push(ROOT, meta("a"));
		let b = tree.push(a, meta("b"));
		tree.push(b, meta("c"));
		tree.push(a, meta("d"));
		tree.push(ROOT, meta("e"));
		tree
	}

	#[test]
	fn preorder_and_sizes() {
		let tree = sample();
		assert_eq!(texts(&tree), ["a", "b", "c", "d", "e"]);
		let sizes = tree.subtree_sizes();
		assert_eq!(sizes[ROOT], 6);
		assert_eq!(sizes[1], 4);
		assert_eq!(tree.len(), 5);
	}

	#[test]
	fn retain_cuts_subtrees() {
		let mut tree = sample();
		tree.retain(|m| m.completion.snippet.text() != "b");
		assert_eq!(texts(&tree), ["a", "d", "e"]);
	}

	#[test]
	fn splice_promotes_children() {
		let mut tree = sample();
		tree.splice(|m| m.completion.snippet.text() != "a");
		assert_eq!(texts(&tree), ["b", "c", "d", "e"]);
		assert_eq!(tree.children(ROOT).len(), 3);
	}

	#[test]
	fn retain_visits_in_preorder() {
		let mut tree = sample();
		let mut seen = Vec::new();
		tree.retain(|m| {
			seen.push(m.completion.snippet.text().to_owned());
			true
		});
		assert_eq!(seen, ["a", "b", "c", "d", "e"]);
	}

	#[test]
	fn reorder_children_recurses() {
		let mut tree = sample();
		tree.reorder_children(|metas| (0..metas.len()).rev().collect());
		assert_eq!(texts(&tree), ["e", "a", "d", "b", "c"]);
	}
}
