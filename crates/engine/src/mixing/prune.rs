use super::tree::{CompletionTree, NodeId, ROOT};

/// Truncates the tree to `budget` nodes below the root.
///
/// Each child list shares its parent's budget in proportion to score, with
/// at least one slot per surviving child; leftover slots go to earlier
/// children with room for them. Children left without a slot are cut.
pub(crate) fn prune(tree: &mut CompletionTree, budget: usize) {
	let sizes = tree.subtree_sizes();
	prune_node(tree, &sizes, ROOT, budget);
}

fn prune_node(tree: &mut CompletionTree, sizes: &[usize], id: NodeId, budget: usize) {
	let children = tree.children(id).to_vec();
	if budget == 0 || children.is_empty() {
		tree.set_children(id, Vec::new());
		return;
	}

	let mut weights: Vec<f64> = children
		.iter()
		.map(|&c| tree.meta(c).map_or(0.0, |m| m.score.max(0.0)))
		.collect();
	let mut total: f64 = weights.iter().sum();
	if !total.is_finite() || total <= 0.0 {
		weights.fill(1.0);
		total = weights.len() as f64;
	}

	let mut remaining = budget;
	let mut alloc = vec![0; children.len()];
	for (i, &child) in children.iter().enumerate() {
		if remaining == 0 {
			break;
		}
		let share = (budget as f64 * weights[i] / total).round() as usize;
		alloc[i] = share.max(1).min(sizes[child]).min(remaining);
		remaining -= alloc[i];
	}
	for (i, &child) in children.iter().enumerate() {
		if remaining == 0 {
			break;
		}
		let extra = (sizes[child] - alloc[i]).min(remaining);
		alloc[i] += extra;
		remaining -= extra;
	}

	let mut kept = Vec::with_capacity(children.len());
	for (child, slots) in children.into_iter().zip(alloc) {
		if slots > 0 {
			prune_node(tree, sizes, child, slots - 1);
			kept.push(child);
		}
	}
	tree.set_children(id, kept);
}
