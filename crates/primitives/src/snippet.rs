use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

use crate::selection::Selection;

/// Placeholder list; most snippets carry at most a couple.
pub type Placeholders = SmallVec<[Selection; 2]>;

/// Errors raised when building a snippet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnippetError {
	#[error("placeholder {index} ({begin}..{end}) lies outside the snippet text")]
	OutOfBounds { index: usize, begin: usize, end: usize },
	#[error("placeholder {index} overlaps or precedes the previous placeholder")]
	Unordered { index: usize },
	#[error("placeholder {index} is not on a char boundary")]
	NotCharBoundary { index: usize },
	#[error("unterminated placeholder starting at byte {0}")]
	Unterminated(usize),
	#[error("nested placeholder at byte {0}")]
	Nested(usize),
}

/// Inserted text with ordered, disjoint placeholder ranges.
///
/// Placeholder offsets are relative to the start of the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Snippet {
	text: String,
	placeholders: Placeholders,
}

#[derive(Deserialize)]
struct RawSnippet {
	text: String,
	#[serde(default)]
	placeholders: Vec<Selection>,
}

impl<'de> Deserialize<'de> for Snippet {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = RawSnippet::deserialize(deserializer)?;
		Snippet::with_placeholders(raw.text, raw.placeholders).map_err(serde::de::Error::custom)
	}
}

impl Snippet {
	/// Plain text without placeholders.
	pub fn new(text: impl Into<String>) -> Self {
		Self {
			text: text.into(),
			placeholders: Placeholders::new(),
		}
	}

	/// Builds a snippet, checking the placeholder invariants.
	pub fn with_placeholders(text: impl Into<String>, placeholders: impl IntoIterator<Item = Selection>) -> Result<Self, SnippetError> {
		let text = text.into();
		let placeholders: Placeholders = placeholders.into_iter().collect();
		validate_placeholders(&text, &placeholders)?;
		Ok(Self { text, placeholders })
	}

	/// Parses a template where `${...}` marks a placeholder and `$$` is a literal `$`.
	///
	/// ```
	/// # use sibyl_primitives::Snippet;
	/// let snip = Snippet::parse("open(${path}, ${})").unwrap();
	/// assert_eq!(snip.text(), "open(path, )");
	/// assert_eq!(snip.placeholders().len(), 2);
	/// ```
	pub fn parse(template: &str) -> Result<Self, SnippetError> {
		let mut text = String::with_capacity(template.len());
		let mut placeholders = Placeholders::new();
		let mut open: Option<(usize, usize)> = None;
		let mut chars = template.char_indices().peekable();

		while let Some((pos, c)) = chars.next() {
			match c {
				'$' if matches!(chars.peek(), Some((_, '$'))) => {
					chars.next();
					text.push('$');
				}
				'$' if matches!(chars.peek(), Some((_, '{'))) => {
					if open.is_some() {
						return Err(SnippetError::Nested(pos));
					}
					chars.next();
					open = Some((pos, text.len()));
				}
				'}' if open.is_some() => {
					if let Some((_, begin)) = open.take() {
						placeholders.push(Selection::new(begin, text.len()));
					}
				}
				_ => text.push(c),
			}
		}

		if let Some((pos, _)) = open {
			return Err(SnippetError::Unterminated(pos));
		}
		Ok(Self { text, placeholders })
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn placeholders(&self) -> &[Selection] {
		&self.placeholders
	}

	pub fn has_placeholders(&self) -> bool {
		!self.placeholders.is_empty()
	}

	pub fn len(&self) -> usize {
		self.text.len()
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}

	pub fn is_multiline(&self) -> bool {
		self.text.contains('\n')
	}

	/// Text of the placeholder at `index`.
	pub fn placeholder_text(&self, index: usize) -> Option<&str> {
		let ph = self.placeholders.get(index)?;
		self.text.get(ph.range())
	}

	pub fn into_parts(self) -> (String, Placeholders) {
		(self.text, self.placeholders)
	}

	/// Builds a snippet without re-checking invariants.
	pub(crate) fn from_parts_unchecked(text: String, placeholders: Placeholders) -> Self {
		debug_assert!(validate_placeholders(&text, &placeholders).is_ok(), "invalid snippet {text:?} {placeholders:?}");
		Self { text, placeholders }
	}

	/// Drops every placeholder, keeping the text.
	pub fn without_placeholders(&self) -> Self {
		Self::new(self.text.clone())
	}

	/// Keeps only the placeholders for which `keep` returns true.
	pub fn retain_placeholders(&self, mut keep: impl FnMut(&str, Selection) -> bool) -> Self {
		let placeholders = self
			.placeholders
			.iter()
			.copied()
			.filter(|ph| keep(&self.text[ph.range()], *ph))
			.collect();
		Self {
			text: self.text.clone(),
			placeholders,
		}
	}

	/// Wraps non-empty placeholders in `begin`/`end` and replaces empty ones with `empty`.
	///
	/// The returned placeholders cover the delimited regions.
	pub fn delimit(&self, begin: &str, end: &str, empty: &str) -> Self {
		let mut text = String::with_capacity(self.text.len());
		let mut placeholders = Placeholders::new();
		let mut last = 0;
		for ph in &self.placeholders {
			text.push_str(&self.text[last..ph.begin]);
			let start = text.len();
			if ph.is_empty() {
				text.push_str(empty);
			} else {
				text.push_str(begin);
				text.push_str(&self.text[ph.range()]);
				text.push_str(end);
			}
			placeholders.push(Selection::new(start, text.len()));
			last = ph.end;
		}
		text.push_str(&self.text[last..]);
		Self { text, placeholders }
	}

	/// Merges runs of empty placeholders separated only by commas and whitespace.
	///
	/// `f(${}, ${})` becomes `f(${})`.
	pub fn collapse_empty_placeholders(&self) -> Self {
		let mut text = String::with_capacity(self.text.len());
		let mut placeholders = Placeholders::new();
		let mut last = 0;
		for ph in &self.placeholders {
			let gap = &self.text[last..ph.begin];
			let prev_empty_at_end = placeholders.last().is_some_and(|p: &Selection| p.is_empty() && p.end == text.len());
			let joinable = ph.is_empty() && prev_empty_at_end && gap.chars().all(|c| c == ',' || c.is_whitespace());
			if joinable {
				last = ph.end;
				continue;
			}
			text.push_str(gap);
			let start = text.len();
			text.push_str(&self.text[ph.range()]);
			placeholders.push(Selection::new(start, text.len()));
			last = ph.end;
		}
		text.push_str(&self.text[last..]);
		Self { text, placeholders }
	}
}

fn validate_placeholders(text: &str, placeholders: &[Selection]) -> Result<(), SnippetError> {
	let mut prev_end = 0;
	for (index, ph) in placeholders.iter().enumerate() {
		if ph.begin > ph.end || ph.end > text.len() {
			return Err(SnippetError::OutOfBounds {
				index,
				begin: ph.begin,
				end: ph.end,
			});
		}
		if ph.begin < prev_end {
			return Err(SnippetError::Unordered { index });
		}
		if !text.is_char_boundary(ph.begin) || !text.is_char_boundary(ph.end) {
			return Err(SnippetError::NotCharBoundary { index });
		}
		prev_end = ph.end;
	}
	Ok(())
}
