use std::collections::HashSet;

use sibyl_primitives::{Completion, SelectedBuffer};

use super::RenderedCompletion;
use super::tree::CompletionTree;
use crate::options::MixOptions;
use crate::registry::ProviderTable;

/// Upper bound, in characters, on the line context prepended to completions.
const LINE_CONTEXT_CHARS: usize = 80;

/// Flattens the tree in pre-order into the final list.
pub(crate) fn render(tree: &CompletionTree, root: &SelectedBuffer, opts: &MixOptions, table: &ProviderTable) -> Vec<RenderedCompletion> {
	let star = if opts.display.no_unicode { "* " } else { "★ " };
	let mut out = Vec::new();

	for id in tree.preorder() {
		let Some(meta) = tree.meta(id) else { continue };
		if meta.mixing.hide {
			continue;
		}
		let Some(valid) = meta.completion.validate(root) else {
			continue;
		};
		let display = meta.completion.display_text(root, opts.display);
		if display.is_empty() {
			continue;
		}

		let completion = if opts.prepend_line_context {
			with_line_context(&valid, root).unwrap_or(valid)
		} else {
			valid
		};
		let smart = meta.smart || meta.mixing.provider.as_ref().is_some_and(|p| table.is_smart(p));
		let hint = if smart && opts.smart_star {
			format!("{star}{}", meta.hint)
		} else {
			meta.hint.clone()
		};

		out.push(RenderedCompletion {
			snippet: completion.snippet,
			replace: completion.replace,
			display,
			hint,
			source: meta.source.clone(),
			provider: meta.mixing.provider.clone(),
			score: meta.score,
			smart,
			referent: meta.referent.clone(),
			referent_kind: meta.referent_kind,
		});
	}

	promote_prefixes(&mut out);
	dedup_trailing_whitespace(&mut out);
	out
}

fn with_line_context(completion: &Completion, root: &SelectedBuffer) -> Option<Completion> {
	let before = root.text().get(..completion.replace.begin)?;
	let line = before.rsplit('\n').next().unwrap_or_default();
	let skip = line.chars().count().saturating_sub(LINE_CONTEXT_CHARS);
	let start = line.char_indices().nth(skip).map_or(line.len(), |(i, _)| i);
	completion.prepend(&line[start..])
}

/// Moves every completion whose display is a strict prefix of an earlier
/// one in front of it, preserving relative order otherwise.
pub(crate) fn promote_prefixes(out: &mut Vec<RenderedCompletion>) {
	let mut i = 0;
	while i < out.len() {
		let current = &out[i].display;
		let found = (i + 1..out.len()).find(|&k| {
			let candidate = &out[k].display;
			candidate.len() < current.len() && current.starts_with(candidate.as_str())
		});
		match found {
			Some(k) => {
				let promoted = out.remove(k);
				out.insert(i, promoted);
			}
			None => i += 1,
		}
	}
}

/// Drops displays equal to an earlier one up to trailing whitespace.
fn dedup_trailing_whitespace(out: &mut Vec<RenderedCompletion>) {
	let mut seen = HashSet::new();
	out.retain(|c| seen.insert(c.display.trim_end().to_owned()));
}
