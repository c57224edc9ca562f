//! Completions: a replace range paired with a snippet.
//!
//! A completion is only meaningful relative to the buffer state it was
//! produced for. Composition ([`Completion::after`]) folds two sequential
//! edits into one, which is how speculative results computed on a follow-on
//! state are lifted back onto the state the user is looking at.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::buffer::{SelectedBuffer, SelectionError};
use crate::selection::Selection;
use crate::snippet::{Placeholders, Snippet, SnippetError};

#[cfg(test)]
mod tests;

/// Errors produced when composing completions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
	#[error("cannot compose disjoint completions {first:?} and {second:?}")]
	Disjoint { first: Selection, second: Selection },
	#[error("composition splits a character of the inserted text")]
	NotCharBoundary,
	#[error("composed snippet is invalid: {0}")]
	Snippet(#[from] SnippetError),
}

/// Options tweaking how display text is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
	/// Cut the display at the first empty placeholder.
	pub trim_before_empty_placeholder: bool,
	/// Use ASCII replacements for the ellipsis and line separator.
	pub no_unicode: bool,
	/// Do not render empty placeholders as an ellipsis.
	pub no_empty_placeholder: bool,
}

impl DisplayOptions {
	pub fn ellipsis(&self) -> &'static str {
		if self.no_unicode { "..." } else { "…" }
	}

	pub fn line_separator(&self) -> &'static str {
		if self.no_unicode { " \\n " } else { " ⏎ " }
	}
}

/// A replace range in the source buffer and the snippet to insert there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Completion {
	pub snippet: Snippet,
	pub replace: Selection,
}

impl Completion {
	pub fn new(replace: Selection, snippet: Snippet) -> Self {
		Self { snippet, replace }
	}

	/// Completion inserting plain `text` over `replace`.
	pub fn text(replace: Selection, text: impl Into<String>) -> Self {
		Self::new(replace, Snippet::new(text))
	}

	/// True when nothing is inserted and nothing is replaced.
	///
	/// Non-empty completions can still be no-ops against a particular buffer;
	/// see [`Completion::is_noop`].
	pub fn is_empty(&self) -> bool {
		self.snippet.is_empty() && self.replace.is_empty()
	}

	/// True when applying the completion to `sb` leaves the text unchanged.
	pub fn is_noop(&self, sb: &SelectedBuffer) -> bool {
		sb.buffer.check(self.replace).is_ok() && sb.text_at(self.replace) == self.snippet.text()
	}

	/// Range of the inserted text in the resulting buffer.
	pub fn inserted(&self) -> Selection {
		Selection::new(self.replace.begin, self.replace.begin + self.snippet.len())
	}

	/// Applies the completion, leaving the cursor after the inserted text.
	pub fn apply(&self, sb: &SelectedBuffer) -> Result<SelectedBuffer, SelectionError> {
		sb.buffer.check(self.replace)?;
		let buffer = sb.buffer.replace(self.replace, self.snippet.text());
		Ok(buffer.select(Selection::cursor(self.inserted().end)))
	}

	/// States reachable by accepting the completion: one per placeholder,
	/// followed by the cursor after the inserted text.
	pub fn follow_on_states(&self, sb: &SelectedBuffer) -> Result<SmallVec<[SelectedBuffer; 3]>, SelectionError> {
		let end = self.apply(sb)?;
		let mut states = SmallVec::new();
		for ph in self.snippet.placeholders() {
			let sel = ph.shift(self.replace.begin);
			if sel != end.selection {
				states.push(end.select(sel));
			}
		}
		states.push(end);
		Ok(states)
	}

	/// Composes two completions: applying `self.after(first)` equals applying
	/// `first` and then `self` to the result.
	///
	/// The replace range of `self` is expressed in the buffer produced by
	/// `first`. Completions whose ranges do not touch cannot be composed.
	pub fn after(&self, first: &Completion) -> Result<Completion, ComposeError> {
		let second = self;
		let inserted = first.inserted();
		let sr = second.replace;
		let first_text = first.snippet.text();
		let second_text = second.snippet.text();

		let mut replace = first.replace;
		let text = if sr.end < inserted.begin || sr.begin > inserted.end {
			return Err(ComposeError::Disjoint {
				first: first.replace,
				second: sr,
			});
		} else if inserted.contains(sr) {
			let begin = sr.begin - inserted.begin;
			let end = begin + sr.len();
			let head = first_text.get(..begin).ok_or(ComposeError::NotCharBoundary)?;
			let tail = first_text.get(end..).ok_or(ComposeError::NotCharBoundary)?;
			format!("{head}{second_text}{tail}")
		} else if sr.contains(inserted) {
			replace.begin = sr.begin;
			replace.end = first.replace.end + (sr.end - inserted.end);
			second_text.to_owned()
		} else if sr.begin < inserted.begin {
			let overlap_end = sr.end - inserted.begin;
			replace.begin = sr.begin;
			let tail = first_text.get(overlap_end..).ok_or(ComposeError::NotCharBoundary)?;
			format!("{second_text}{tail}")
		} else {
			let overlap_begin = sr.begin - inserted.begin;
			replace.end = first.replace.end + (sr.end - inserted.end);
			let head = first_text.get(..overlap_begin).ok_or(ComposeError::NotCharBoundary)?;
			format!("{head}{second_text}")
		};

		// Placeholders of `first` survive only when untouched by `second`.
		let growth = second_text.len() as isize - sr.len() as isize;
		let mut placeholders = Placeholders::new();
		for ph in first.snippet.placeholders() {
			let ph1 = ph.shift(first.replace.begin);
			if sr.contains(ph1) {
				continue;
			}
			if ph1.end <= sr.begin {
				placeholders.push(ph1);
			} else if ph1.begin >= sr.end {
				placeholders.push(ph1.checked_offset(growth).ok_or(ComposeError::NotCharBoundary)?);
			}
		}
		placeholders.extend(second.snippet.placeholders().iter().map(|ph| ph.shift(sr.begin)));

		let origin = -(replace.begin as isize);
		let mut relative = placeholders
			.into_iter()
			.map(|ph| ph.checked_offset(origin))
			.collect::<Option<Placeholders>>()
			.ok_or(ComposeError::NotCharBoundary)?;
		relative.sort_by_key(|ph| ph.begin);

		Ok(Completion {
			snippet: Snippet::with_placeholders(text, relative)?,
			replace,
		})
	}

	/// Checks that the completion reasonably completes `sb`, returning the
	/// completion normalized for display.
	///
	/// With a non-empty selection the completion must replace exactly that
	/// selection. With a cursor, the replace range must contain the cursor,
	/// the trimmed snippet must end with any text typed after the cursor, the
	/// non-identifier part of the typed prefix must match exactly (and is
	/// removed), and the identifier part must match case-insensitively. When
	/// nothing non-identifier was typed, an identifier immediately before the
	/// replace range is absorbed into the completion.
	pub fn validate(&self, sb: &SelectedBuffer) -> Option<Completion> {
		if sb.buffer.check(self.replace).is_err() {
			return None;
		}
		if !sb.selection.is_empty() {
			return (self.replace == sb.selection).then(|| self.clone());
		}
		if !self.replace.contains(sb.selection) {
			return None;
		}

		let typed_suffix = sb.text_at(Selection::new(sb.selection.end, self.replace.end));
		if !self.snippet.text().trim().ends_with(typed_suffix) {
			return None;
		}

		let typed_prefix = sb.text_at(Selection::new(self.replace.begin, sb.selection.begin));
		let typed_ident = trailing_ident(typed_prefix);
		let non_ident = &typed_prefix[..typed_prefix.len() - typed_ident.len()];

		let stripped = self.snippet.text().strip_prefix(non_ident)?;
		let head = stripped.get(..typed_ident.len())?;
		if head.to_lowercase() != typed_ident.to_lowercase() {
			return None;
		}

		let (text, shift) = if non_ident.is_empty() {
			let absorbed = trailing_ident(sb.text_at(Selection::new(0, self.replace.begin)));
			(format!("{absorbed}{stripped}"), absorbed.len() as isize)
		} else {
			(stripped.to_owned(), -(non_ident.len() as isize))
		};

		let mut placeholders = Placeholders::new();
		let bounds = Selection::new(0, text.len());
		for ph in self.snippet.placeholders() {
			let moved = ph.checked_offset(shift)?;
			if !bounds.contains(moved) {
				return None;
			}
			placeholders.push(moved);
		}

		let begin = self.replace.begin.checked_add_signed(-shift)?;
		Some(Completion {
			snippet: Snippet::from_parts_unchecked(text, placeholders),
			replace: Selection::new(begin, self.replace.end),
		})
	}

	/// Text shown to the user for this completion, or an empty string when
	/// the completion does not validate against `sb`.
	pub fn display_text(&self, sb: &SelectedBuffer, opts: DisplayOptions) -> String {
		let Some(valid) = self.validate(sb) else {
			return String::new();
		};
		let (mut text, placeholders) = valid.snippet.into_parts();

		let typed_suffix = sb.text_at(Selection::new(sb.selection.end, valid.replace.end));
		if !is_ident_chars(typed_suffix) {
			let kept = text.trim_end().strip_suffix(typed_suffix).map(str::len);
			if let Some(len) = kept {
				text.truncate(len);
			}
		}

		let mut kept = Placeholders::new();
		for ph in placeholders {
			if ph.end > text.len() || ph.begin == text.len() {
				continue;
			}
			if opts.trim_before_empty_placeholder && ph.is_empty() {
				text.truncate(ph.begin);
				break;
			}
			kept.push(ph);
		}
		let snippet = Snippet::from_parts_unchecked(text, kept).collapse_empty_placeholders();

		let mut display = if opts.no_empty_placeholder {
			snippet.text().to_owned()
		} else {
			snippet.delimit("", "", opts.ellipsis()).text().to_owned()
		};
		if !opts.no_unicode {
			display = display.replace("...", opts.ellipsis());
		}

		let mut lines = display.trim_end().split('\n');
		let mut out = lines.next().unwrap_or_default().trim_end().to_owned();
		for line in lines {
			out.push_str(opts.line_separator());
			out.push_str(line.trim());
		}
		out
	}

	/// Extends the completion to the left with `prefix`, which must match the
	/// buffer text just before the replace range.
	pub fn prepend(&self, prefix: &str) -> Option<Completion> {
		let begin = self.replace.begin.checked_sub(prefix.len())?;
		let placeholders = self.snippet.placeholders().iter().map(|ph| ph.shift(prefix.len())).collect();
		Some(Completion {
			snippet: Snippet::from_parts_unchecked(format!("{prefix}{}", self.snippet.text()), placeholders),
			replace: Selection::new(begin, self.replace.end),
		})
	}

	/// True when the snippet reproduces the identifier typed before the
	/// cursor with the same case. Assumes a validated completion.
	pub fn exact_case_match_preceding_ident(&self, sb: &SelectedBuffer) -> bool {
		let typed_prefix = sb.text_at(Selection::new(self.replace.begin.min(sb.selection.begin), sb.selection.begin));
		let ident = trailing_ident(typed_prefix);
		self.snippet.text().get(typed_prefix.len() - ident.len()..typed_prefix.len()) == Some(ident)
	}

	/// True when an identifier typed after the cursor ends the snippet with
	/// the same case. Assumes a validated completion.
	pub fn exact_case_match_suffix(&self, sb: &SelectedBuffer) -> bool {
		let typed_suffix = sb.text_at(Selection::new(sb.selection.end, self.replace.end.max(sb.selection.end)));
		!typed_suffix.is_empty() && is_ident_chars(typed_suffix) && self.snippet.text().trim().ends_with(typed_suffix)
	}
}

/// Longest suffix of `s` made of identifier characters.
pub fn trailing_ident(s: &str) -> &str {
	let start = s
		.char_indices()
		.rev()
		.take_while(|&(_, c)| is_ident_char(c))
		.last()
		.map_or(s.len(), |(i, _)| i);
	&s[start..]
}

fn is_ident_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

fn is_ident_chars(s: &str) -> bool {
	s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
