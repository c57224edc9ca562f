use serde::{Deserialize, Serialize};

/// A byte offset into a buffer.
pub type ByteIdx = usize;

/// A half-open byte range `[begin, end)` within a buffer or snippet.
///
/// A selection with `begin == end` is a cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selection {
	/// First byte covered by the selection.
	pub begin: ByteIdx,
	/// One past the last byte covered by the selection.
	pub end: ByteIdx,
}

impl Selection {
	/// Creates a selection, panicking if `begin > end`.
	pub fn new(begin: ByteIdx, end: ByteIdx) -> Self {
		assert!(begin <= end, "inverted selection {begin}..{end}");
		Self { begin, end }
	}

	/// Creates a zero-width selection at `pos`.
	pub const fn cursor(pos: ByteIdx) -> Self {
		Self { begin: pos, end: pos }
	}

	/// Length in bytes.
	#[inline]
	pub const fn len(&self) -> usize {
		self.end - self.begin
	}

	/// Returns true for a cursor.
	#[inline]
	pub const fn is_empty(&self) -> bool {
		self.begin == self.end
	}

	/// Returns true when `other` lies entirely within `self`.
	#[inline]
	pub const fn contains(&self, other: Selection) -> bool {
		self.begin <= other.begin && other.end <= self.end
	}

	/// Returns true when the two selections share bytes or touch.
	#[inline]
	pub const fn touches(&self, other: Selection) -> bool {
		other.end >= self.begin && other.begin <= self.end
	}

	/// Shifts both ends right by `delta` bytes.
	#[inline]
	pub const fn shift(self, delta: usize) -> Self {
		Self {
			begin: self.begin + delta,
			end: self.end + delta,
		}
	}

	/// Shifts both ends by a signed amount, returning `None` on underflow.
	pub fn checked_offset(self, delta: isize) -> Option<Self> {
		Some(Self {
			begin: self.begin.checked_add_signed(delta)?,
			end: self.end.checked_add_signed(delta)?,
		})
	}

	/// Converts to a standard library range.
	#[inline]
	pub const fn range(&self) -> std::ops::Range<usize> {
		self.begin..self.end
	}
}

impl From<std::ops::Range<usize>> for Selection {
	fn from(range: std::ops::Range<usize>) -> Self {
		Self::new(range.start, range.end)
	}
}
