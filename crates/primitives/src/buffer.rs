use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::Xxh3;

use crate::selection::{ByteIdx, Selection};

/// Visual marker used when rendering a cursor inside buffer text.
pub const CURSOR_MARK: char = '‸';

/// Errors raised when selecting a range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
	/// The selection ends past the end of the buffer.
	#[error("selection {begin}..{end} exceeds buffer length {len}")]
	OutOfBounds { begin: ByteIdx, end: ByteIdx, len: usize },
	/// The selection splits a UTF-8 sequence.
	#[error("selection {begin}..{end} is not on a char boundary")]
	NotCharBoundary { begin: ByteIdx, end: ByteIdx },
}

/// Content hash of a buffer, insensitive to carriage returns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferHash(u128);

impl fmt::Debug for BufferHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BufferHash({:032x})", self.0)
	}
}

/// Hash of a buffer together with a selection; the scheduler's cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectedBufferHash {
	pub buffer: BufferHash,
	pub selection: Selection,
}

/// Computes the content hash of `text`, skipping every `\r`.
///
/// Buffers that differ only in line-ending convention hash identically.
pub fn content_hash(text: &str) -> BufferHash {
	let mut hasher = Xxh3::new();
	for chunk in text.split('\r') {
		hasher.update(chunk.as_bytes());
	}
	BufferHash(hasher.digest128())
}

/// An immutable text buffer with a precomputed content hash.
///
/// Cloning is cheap; edits always produce a new buffer.
#[derive(Clone)]
pub struct Buffer {
	text: Arc<str>,
	hash: BufferHash,
}

impl Buffer {
	/// Creates a buffer and hashes its contents.
	pub fn new(text: impl Into<Arc<str>>) -> Self {
		let text = text.into();
		let hash = content_hash(&text);
		Self { text, hash }
	}

	/// Full buffer contents.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Length in bytes.
	pub fn len(&self) -> usize {
		self.text.len()
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}

	pub fn hash(&self) -> BufferHash {
		self.hash
	}

	/// Returns the text covered by `sel`, clamped to the buffer.
	///
	/// Ranges that split a UTF-8 sequence yield an empty string.
	pub fn text_at(&self, sel: Selection) -> &str {
		let end = sel.end.min(self.len());
		let begin = sel.begin.min(end);
		self.text.get(begin..end).unwrap_or("")
	}

	/// Checks that `sel` is a valid range of this buffer.
	pub fn check(&self, sel: Selection) -> Result<(), SelectionError> {
		if sel.end > self.len() || sel.begin > sel.end {
			return Err(SelectionError::OutOfBounds {
				begin: sel.begin,
				end: sel.end,
				len: self.len(),
			});
		}
		if !self.text.is_char_boundary(sel.begin) || !self.text.is_char_boundary(sel.end) {
			return Err(SelectionError::NotCharBoundary {
				begin: sel.begin,
				end: sel.end,
			});
		}
		Ok(())
	}

	/// Pairs this buffer with a selection, validating its bounds.
	pub fn try_select(&self, sel: Selection) -> Result<SelectedBuffer, SelectionError> {
		self.check(sel)?;
		Ok(SelectedBuffer {
			buffer: self.clone(),
			selection: sel,
		})
	}

	/// Pairs this buffer with a selection.
	///
	/// # Panics
	///
	/// Panics if the selection is out of bounds or splits a character.
	pub fn select(&self, sel: Selection) -> SelectedBuffer {
		match self.try_select(sel) {
			Ok(sb) => sb,
			Err(e) => panic!("invalid selection: {e}"),
		}
	}

	/// Returns a new buffer with `sel` replaced by `text`.
	///
	/// # Panics
	///
	/// Panics if the selection is out of bounds or splits a character.
	pub fn replace(&self, sel: Selection, text: &str) -> Buffer {
		if let Err(e) = self.check(sel) {
			panic!("invalid replacement range: {e}");
		}
		let mut out = String::with_capacity(self.len() - sel.len() + text.len());
		out.push_str(&self.text[..sel.begin]);
		out.push_str(text);
		out.push_str(&self.text[sel.end..]);
		Buffer::new(out)
	}
}

impl PartialEq for Buffer {
	fn eq(&self, other: &Self) -> bool {
		self.hash == other.hash && self.text == other.text
	}
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Buffer").field(&&*self.text).finish()
	}
}

impl Serialize for Buffer {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.text)
	}
}

impl<'de> Deserialize<'de> for Buffer {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(Buffer::new)
	}
}

/// A buffer paired with a selection: one buffer state.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SelectedBuffer {
	pub buffer: Buffer,
	pub selection: Selection,
}

#[derive(Deserialize)]
struct RawSelectedBuffer {
	buffer: Buffer,
	selection: Selection,
}

impl<'de> Deserialize<'de> for SelectedBuffer {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = RawSelectedBuffer::deserialize(deserializer)?;
		raw.buffer.try_select(raw.selection).map_err(serde::de::Error::custom)
	}
}

impl SelectedBuffer {
	/// Creates a buffer state with the cursor at the first occurrence of
	/// `marker`, which is removed from the text. Without a marker the cursor
	/// sits at the end.
	pub fn with_cursor_marker(text: &str, marker: &str) -> Self {
		match text.split_once(marker) {
			Some((before, after)) => {
				let buffer = Buffer::new(format!("{before}{after}"));
				buffer.select(Selection::cursor(before.len()))
			}
			None => {
				let buffer = Buffer::new(text);
				buffer.select(Selection::cursor(text.len()))
			}
		}
	}

	pub fn hash(&self) -> SelectedBufferHash {
		SelectedBufferHash {
			buffer: self.buffer.hash(),
			selection: self.selection,
		}
	}

	pub fn text(&self) -> &str {
		self.buffer.text()
	}

	pub fn len(&self) -> usize {
		self.buffer.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	pub fn text_at(&self, sel: Selection) -> &str {
		self.buffer.text_at(sel)
	}

	/// Text under the selection.
	pub fn selected_text(&self) -> &str {
		self.buffer.text_at(self.selection)
	}

	/// Same buffer, different selection.
	pub fn select(&self, sel: Selection) -> SelectedBuffer {
		self.buffer.select(sel)
	}

	/// Replaces the selected text, leaving the cursor after the insertion.
	///
	/// This models the user typing over the selection.
	pub fn replace_selection(&self, text: &str) -> SelectedBuffer {
		let buffer = self.buffer.replace(self.selection, text);
		let cursor = Selection::cursor(self.selection.begin + text.len());
		buffer.select(cursor)
	}
}

impl fmt::Display for SelectedBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let sel = self.selection;
		let text = self.text();
		if sel.is_empty() {
			write!(f, "{}{CURSOR_MARK}{}", &text[..sel.begin], &text[sel.begin..])
		} else {
			write!(f, "{}[{}]{}", &text[..sel.begin], &text[sel.range()], &text[sel.end..])
		}
	}
}

impl fmt::Debug for SelectedBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SelectedBuffer({:?})", self.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_ignores_carriage_returns() {
		let unix = Buffer::new("a\nb\n");
		let dos = Buffer::new("a\r\nb\r\n");
		assert_eq!(unix.hash(), dos.hash());
		assert_ne!(unix, dos);
	}

	#[test]
	fn hash_distinguishes_content() {
		assert_ne!(Buffer::new("foo").hash(), Buffer::new("fop").hash());
	}

	#[test]
	fn selected_hash_includes_selection() {
		let buffer = Buffer::new("foo");
		assert_ne!(buffer.select(Selection::cursor(1)).hash(), buffer.select(Selection::cursor(2)).hash());
	}

	#[test]
	fn replace_builds_new_buffer() {
		let buffer = Buffer::new("hello world");
		let replaced = buffer.replace(Selection::new(0, 5), "howdy");
		assert_eq!(replaced.text(), "howdy world");
		assert_eq!(buffer.text(), "hello world");
	}

	#[test]
	fn try_select_rejects_out_of_bounds_and_split_chars() {
		let buffer = Buffer::new("é");
		assert!(matches!(buffer.try_select(Selection::cursor(3)), Err(SelectionError::OutOfBounds { .. })));
		assert!(matches!(
			buffer.try_select(Selection::cursor(1)),
			Err(SelectionError::NotCharBoundary { .. })
		));
	}

	#[test]
	fn cursor_marker_is_removed() {
		let sb = SelectedBuffer::with_cursor_marker("json.d$", "$");
		assert_eq!(sb.text(), "json.d");
		assert_eq!(sb.selection, Selection::cursor(6));
		assert_eq!(sb.to_string(), "json.d‸");
	}

	#[test]
	fn replace_selection_moves_cursor_past_insertion() {
		let sb = SelectedBuffer::with_cursor_marker("foo$", "$");
		let typed = sb.replace_selection(".");
		assert_eq!(typed.to_string(), "foo.‸");
	}

	#[test]
	fn text_at_clamps() {
		let buffer = Buffer::new("abc");
		assert_eq!(buffer.text_at(Selection::new(1, 10)), "bc");
		assert_eq!(buffer.text_at(Selection::new(5, 10)), "");
	}

	#[test]
	fn serde_round_trip_rejects_invalid_selection() {
		let json = r#"{"buffer":"ab","selection":{"begin":0,"end":3}}"#;
		assert!(serde_json::from_str::<SelectedBuffer>(json).is_err());
	}
}
