use std::collections::{HashMap, HashSet};

use sibyl_primitives::{SelectedBuffer, Selection};

use super::SemanticFilter;
use super::tree::CompletionTree;
use crate::options::MixOptions;
use crate::provider::{MetaCompletion, ReferentKind};

/// Characters ignored at the end of a completion when looking for lexically
/// similar siblings.
const SIMILARITY_TRIM: &[char] = &['(', ')', '[', ']', '{', '}', ',', ':', '.', ' '];

/// Runs every filtering pass over the sorted tree, in order.
pub(crate) fn filter(tree: &mut CompletionTree, root: &SelectedBuffer, opts: &MixOptions, filters: &[Box<dyn SemanticFilter>]) {
	if opts.empty_call_dedup {
		dedup_empty_calls(tree);
	}
	dedup_similar(tree);
	if opts.disable_snippets {
		tree.retain(strip_snippet);
	}
	tree.splice(|m| !m.completion.is_noop(root));
	if opts.prefix_filter {
		tree.retain(|m| m.completion.validate(root).is_some());
	}
	if !opts.allow_multiline {
		tree.retain(|m| !m.completion.snippet.is_multiline());
	}
	if opts.dollar_dot_compat {
		tree.retain(|m| !contains_both(m, '$', '.'));
	}
	if opts.hyphen_dot_compat {
		tree.retain(|m| !contains_both(m, '-', '.'));
	}
	if opts.max_per_provider > 0 {
		let mut counts: HashMap<Option<_>, usize> = HashMap::new();
		tree.retain(|m| {
			let count = counts.entry(m.mixing.provider.clone()).or_default();
			*count += 1;
			*count <= opts.max_per_provider
		});
	}
	for filter in filters {
		tree.retain(|m| {
			let keep = filter.keep(root, m);
			if !keep {
				tracing::trace!(filter = filter.name(), text = m.completion.snippet.text(), "mix.semantic_drop");
			}
			keep
		});
	}
}

/// Keeps the first completion (in pre-order) among those equal up to
/// trailing brackets, punctuation and spaces.
pub(crate) fn dedup_similar(tree: &mut CompletionTree) {
	let mut seen = HashSet::new();
	tree.retain(|m| seen.insert(similarity_key(m.completion.snippet.text()).to_owned()));
}

fn similarity_key(text: &str) -> &str {
	text.trim_end_matches(SIMILARITY_TRIM)
}

/// Between `f` and `f()` over the same range, keeps the call for callables
/// and the bare name for types.
fn dedup_empty_calls(tree: &mut CompletionTree) {
	let mut present: HashSet<(Selection, String)> = HashSet::new();
	tree.retain(|m| {
		present.insert((m.completion.replace, m.completion.snippet.text().to_owned()));
		true
	});
	tree.retain(|m| {
		let text = m.completion.snippet.text();
		match m.referent_kind {
			ReferentKind::Callable => !present.contains(&(m.completion.replace, format!("{text}()"))),
			ReferentKind::Type => match empty_call_callee(m) {
				Some(callee) => !present.contains(&(m.completion.replace, callee.to_owned())),
				None => true,
			},
			ReferentKind::Other => true,
		}
	});
}

/// `f` for a completion inserting exactly `f()`, with at most empty
/// placeholders.
fn empty_call_callee(meta: &MetaCompletion) -> Option<&str> {
	let snippet = &meta.completion.snippet;
	if snippet.placeholders().iter().any(|ph| !ph.is_empty()) {
		return None;
	}
	let callee = snippet.text().strip_suffix("()")?;
	let is_ident = !callee.is_empty() && callee.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
	is_ident.then_some(callee)
}

/// Drops empty placeholders; rejects completions that still need input.
fn strip_snippet(meta: &mut MetaCompletion) -> bool {
	let snippet = meta.completion.snippet.retain_placeholders(|text, _| !text.is_empty());
	if snippet.has_placeholders() {
		return false;
	}
	meta.completion.snippet = snippet;
	true
}

fn contains_both(meta: &MetaCompletion, a: char, b: char) -> bool {
	let text = meta.completion.snippet.text();
	text.contains(a) && text.contains(b)
}
