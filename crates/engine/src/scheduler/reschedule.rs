use std::sync::Arc;

use sibyl_primitives::{Completion, SelectedBuffer, Selection};

use super::{CachedCompletion, SCORE_EPSILON, Scheduler, SpeculationState};
use crate::provider::{MetaCompletion, ProviderName};

impl Scheduler {
	/// Places `sb` at `depth` with path score `score`, then walks its cached
	/// completions to place their follow-on states one level deeper.
	///
	/// A state only moves when the new path is shorter, or equally short and
	/// strictly better scored, so the walk terminates on cyclic caches.
	pub(super) fn reschedule(&mut self, sb: &SelectedBuffer, depth: usize, score: f64) {
		if depth >= self.opts.depth_limit {
			return;
		}
		let hash = sb.hash();
		let spec = self.specs.entry(hash).or_insert_with(|| SpeculationState::new(sb.clone()));
		let accept = match spec.depth {
			None => true,
			Some(d) => depth < d || (depth == d && score > spec.score + SCORE_EPSILON),
		};
		if !accept {
			return;
		}
		spec.depth = Some(depth);
		spec.score = score;

		let priority = self.tier_priority(depth, score);
		let table = Arc::clone(&self.table);
		for provider in table.for_depth(depth) {
			let key = self.provision_key(sb, provider);
			self.queue.raise_priority(&mut self.provisions, key, priority);
		}

		let follow: Vec<(SelectedBuffer, f64)> = self.specs[&hash]
			.provisions
			.values()
			.flat_map(|&key| self.provisions[key].completions.values().flatten())
			.flat_map(|c| c.speculate().iter().map(move |s| (s.clone(), score * c.meta.score)))
			.collect();
		for (state, score) in follow {
			self.reschedule(&state, depth + 1, score);
		}
	}

	/// Shallower tiers always outrank deeper ones; within a tier the path
	/// score breaks ties.
	fn tier_priority(&self, depth: usize, score: f64) -> f64 {
		(self.opts.depth_limit - depth) as f64 + score.clamp(0.0, 1.0) * 0.5
	}

	/// Re-expresses completions cached on `old` against `new`.
	///
	/// Works when `new` differs from `old` only by an edit confined to the old
	/// selection: each cached completion is composed after the inverse of that
	/// edit and kept if it still validates on `new`.
	pub(super) fn copy_forward(&mut self, old: &SelectedBuffer, new: &SelectedBuffer) {
		if old.hash() == new.hash() {
			return;
		}
		let Some(inverse) = inverse_completion(old, new) else {
			return;
		};
		let Some(spec) = self.specs.get(&old.hash()) else {
			return;
		};

		let mut copies: Vec<(ProviderName, MetaCompletion)> = Vec::new();
		for (provider, &key) in &spec.provisions {
			for cached in self.provisions[key].completions.values().flatten() {
				let Ok(composed) = cached.meta.completion.after(&inverse) else {
					continue;
				};
				let Some(valid) = composed.validate(new) else {
					continue;
				};
				let mut meta = cached.meta.clone();
				meta.completion = valid;
				copies.push((provider.clone(), meta));
			}
		}

		let copied = copies.len();
		for (provider, meta) in copies {
			let Ok(cached) = CachedCompletion::new(new, meta) else {
				continue;
			};
			let key = self.provision_key(new, &provider);
			self.provisions[key]
				.completions
				.entry(cached.target().hash())
				.or_default()
				.push(cached);
		}
		tracing::trace!(from = %old, to = %new, copied, "sched.copy_forward");
	}
}

/// Completion turning `new` back into `old`, if `new` only differs from `old`
/// inside the old selection and its own selection lies in the edited region.
pub(super) fn inverse_completion(old: &SelectedBuffer, new: &SelectedBuffer) -> Option<Completion> {
	let text = old.text();
	let sel = old.selection;
	let prefix = &text[..sel.begin];
	let suffix = &text[sel.end..];

	let new_text = new.text();
	if prefix.len() + suffix.len() > new_text.len() || !new_text.starts_with(prefix) || !new_text.ends_with(suffix) {
		return None;
	}
	let region = Selection::new(prefix.len(), new_text.len() - suffix.len());
	if !region.contains(new.selection) {
		return None;
	}
	Some(Completion::text(region, old.selected_text()))
}
