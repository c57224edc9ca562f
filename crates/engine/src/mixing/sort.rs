use sibyl_primitives::SelectedBuffer;

use super::tree::CompletionTree;
use crate::provider::{MetaCompletion, ProviderName};
use crate::registry::ProviderTable;
use crate::scheduler::SCORE_EPSILON;

/// Orders every child list: exact-case matches of the typed identifier
/// first, then by score, then by text.
///
/// A provider with a comparator reorders its own completions among the slots
/// they already occupy, so mixed-provider lists keep a total order.
pub(crate) fn sort(tree: &mut CompletionTree, table: &ProviderTable, root: &SelectedBuffer) {
	tree.reorder_children(|metas| order(table, root, metas));
}

pub(crate) fn order(table: &ProviderTable, root: &SelectedBuffer, metas: &[&MetaCompletion]) -> Vec<usize> {
	let cursor = root.selection.is_empty();
	let keys: Vec<(bool, i64)> = metas
		.iter()
		.map(|m| (cursor && exact_case(root, m), quantize(m.score)))
		.collect();
	let text = |i: usize| metas[i].completion.snippet.text();

	let mut idx: Vec<usize> = (0..metas.len()).collect();
	idx.sort_by(|&i, &j| {
		keys[j]
			.0
			.cmp(&keys[i].0)
			.then(keys[j].1.cmp(&keys[i].1))
			.then_with(|| text(i).cmp(text(j)))
	});

	let mut providers: Vec<&ProviderName> = metas.iter().filter_map(|m| m.mixing.provider.as_ref()).collect();
	providers.sort();
	providers.dedup();
	for provider in providers {
		let Some(cmp) = table.comparator(provider) else {
			continue;
		};
		let slots: Vec<usize> = (0..idx.len())
			.filter(|&p| metas[idx[p]].mixing.provider.as_ref() == Some(provider))
			.collect();
		let mut members: Vec<usize> = slots.iter().map(|&p| idx[p]).collect();
		members.sort_by(|&i, &j| {
			keys[j]
				.0
				.cmp(&keys[i].0)
				.then_with(|| cmp(metas[i], metas[j]))
				.then_with(|| text(i).cmp(text(j)))
		});
		for (slot, member) in slots.into_iter().zip(members) {
			idx[slot] = member;
		}
	}
	idx
}

fn exact_case(root: &SelectedBuffer, meta: &MetaCompletion) -> bool {
	meta.completion
		.validate(root)
		.is_some_and(|valid| valid.exact_case_match_preceding_ident(root))
}

/// Scores within epsilon of each other compare equal.
fn quantize(score: f64) -> i64 {
	(score / SCORE_EPSILON).round() as i64
}

#[cfg(test)]
mod tests {
	use std::cmp::Ordering;

	use pretty_assertions::assert_eq;
	use sibyl_primitives::{Completion, Selection};

	use super::*;
	use crate::registry::{ProviderEntry, ProviderFlags};

	fn meta(text: &str, score: f64, provider: &str) -> MetaCompletion {
		let mut meta = MetaCompletion::new(Completion::text(Selection::new(0, 3), text), score);
		meta.mixing.provider = Some(provider.into());
		meta
	}

	fn sorted(table: &ProviderTable, root: &SelectedBuffer, metas: &[MetaCompletion]) -> Vec<String> {
		let refs: Vec<&MetaCompletion> = metas.iter().collect();
		order(table, root, &refs)
			.into_iter()
			.map(|i| metas[i].completion.snippet.text().to_owned())
			.collect()
	}

	#[test]
	fn score_then_text() {
		let root = SelectedBuffer::with_cursor_marker("my_‸", "‸");
		let metas = [meta("my_func()", 0.3, "p"), meta("my_pkg", 0.9, "p"), meta("my_obj", 0.9, "p")];
		assert_eq!(sorted(&ProviderTable::new(), &root, &metas), ["my_obj", "my_pkg", "my_func()"]);
	}

	#[test]
	fn exact_case_first() {
		let root = SelectedBuffer::with_cursor_marker("Foo‸", "‸");
		let metas = [meta("foobar", 1.0, "p"), meta("Foobaz", 0.1, "p")];
		assert_eq!(sorted(&ProviderTable::new(), &root, &metas), ["Foobaz", "foobar"]);
	}

	#[test]
	fn nearly_equal_scores_tie() {
		let root = SelectedBuffer::with_cursor_marker("ab‸c", "‸");
		let metas = [meta("b", 0.5 + 1e-9, "p"), meta("a", 0.5, "p")];
		assert_eq!(sorted(&ProviderTable::new(), &root, &metas), ["a", "b"]);
	}

	#[test]
	fn comparator_reorders_within_own_slots() {
		fn shortest(a: &MetaCompletion, b: &MetaCompletion) -> Ordering {
			a.completion.snippet.len().cmp(&b.completion.snippet.len())
		}
		let table = ProviderTable::new().with(ProviderEntry::new("calls", ProviderFlags::empty()).with_comparator(shortest));
		let root = SelectedBuffer::with_cursor_marker("fn‸", "‸");
		let metas = [meta("fn(a, b)", 0.9, "calls"), meta("fn()", 0.1, "calls"), meta("fnx", 0.5, "other")];
		assert_eq!(sorted(&table, &root, &metas), ["fn()", "fnx", "fn(a, b)"]);
	}
}
