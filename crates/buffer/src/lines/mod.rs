//! Ordered line storage and the delta algorithm.

use std::collections::LinkedList;
use std::collections::linked_list;

/// How a delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
	/// New lines were spliced in before an existing line or appended.
	Insert,
	/// A run of lines was removed.
	Delete,
	/// Existing lines were overwritten, with any excess deleted or inserted.
	Replace,
	/// The delta described no change.
	Nothing,
}

/// The text of a buffer as an ordered list of lines.
///
/// Never empty: a buffer with no text holds one empty line, as the host does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStore {
	lines: LinkedList<Vec<u8>>,
}

impl Default for LineStore {
	fn default() -> Self {
		Self::new()
	}
}

impl LineStore {
	/// Creates a store holding one empty line.
	pub fn new() -> Self {
		let mut lines = LinkedList::new();
		lines.push_back(Vec::new());
		Self { lines }
	}

	/// Creates a store from full contents.
	pub fn from_lines(lines: impl IntoIterator<Item = Vec<u8>>) -> Self {
		let mut store = Self {
			lines: lines.into_iter().collect(),
		};
		store.ensure_nonempty();
		store
	}

	/// Number of lines. Always at least one.
	pub fn len(&self) -> usize {
		self.lines.len()
	}

	/// Always false; present for API symmetry with collections.
	pub fn is_empty(&self) -> bool {
		false
	}

	/// Returns true if the store is the host's empty buffer: one empty line.
	pub fn is_blank(&self) -> bool {
		self.lines.len() == 1 && self.lines.front().is_some_and(Vec::is_empty)
	}

	/// Returns line `index`.
	pub fn get(&self, index: usize) -> Option<&[u8]> {
		self.lines.iter().nth(index).map(Vec::as_slice)
	}

	/// Iterates over the lines in order.
	pub fn iter(&self) -> Lines<'_> {
		Lines(self.lines.iter())
	}

	/// Copies the lines out.
	pub fn to_vec(&self) -> Vec<Vec<u8>> {
		self.lines.iter().cloned().collect()
	}

	/// Joins the lines with `\n`, without a trailing newline.
	pub fn contents(&self) -> Vec<u8> {
		let total = self.lines.iter().map(|l| l.len() + 1).sum::<usize>();
		let mut out = Vec::with_capacity(total);
		for (i, line) in self.lines.iter().enumerate() {
			if i > 0 {
				out.push(b'\n');
			}
			out.extend_from_slice(line);
		}
		out
	}

	/// Replaces the entire contents.
	pub fn replace_all(&mut self, lines: impl IntoIterator<Item = Vec<u8>>) {
		self.lines = lines.into_iter().collect();
		self.ensure_nonempty();
	}

	/// Replaces lines `[first, last)` with `replacement`.
	///
	/// Both bounds must already lie within `0..=len()` with `first <= last`.
	pub fn apply(&mut self, first: usize, last: usize, replacement: Vec<Vec<u8>>) -> DeltaKind {
		debug_assert!(first <= last && last <= self.len(), "unclamped delta {first}..{last} over {} lines", self.len());
		let range = last - first;
		let kind = if replacement.is_empty() {
			if range == 0 {
				DeltaKind::Nothing
			} else {
				self.delete(first, range);
				DeltaKind::Delete
			}
		} else if range == 0 {
			self.insert_before(first, replacement);
			DeltaKind::Insert
		} else {
			self.replace(first, range, replacement);
			DeltaKind::Replace
		};
		self.ensure_nonempty();
		kind
	}

	/// Overwrites the overlap in place, then trims or extends at its end.
	fn replace(&mut self, first: usize, range: usize, replacement: Vec<Vec<u8>>) {
		let overlap = range.min(replacement.len());
		let mut replacement = replacement.into_iter();
		for (slot, line) in self.lines.iter_mut().skip(first).zip(replacement.by_ref().take(overlap)) {
			slot.clear();
			slot.extend_from_slice(&line);
		}

		let boundary = first + overlap;
		if range > overlap {
			self.delete(boundary, range - overlap);
		} else {
			let rest: Vec<_> = replacement.collect();
			if !rest.is_empty() {
				self.insert_before(boundary, rest);
			}
		}
	}

	fn insert_before(&mut self, at: usize, new: impl IntoIterator<Item = Vec<u8>>) {
		let mut tail = self.lines.split_off(at);
		self.lines.extend(new);
		self.lines.append(&mut tail);
	}

	fn delete(&mut self, at: usize, count: usize) {
		let mut doomed = self.lines.split_off(at);
		let mut kept = doomed.split_off(count.min(doomed.len()));
		self.lines.append(&mut kept);
	}

	fn ensure_nonempty(&mut self) {
		if self.lines.is_empty() {
			self.lines.push_back(Vec::new());
		}
	}
}

/// Iterator over the lines of a [`LineStore`].
#[derive(Debug, Clone)]
pub struct Lines<'a>(linked_list::Iter<'a, Vec<u8>>);

impl<'a> Iterator for Lines<'a> {
	type Item = &'a [u8];

	fn next(&mut self) -> Option<&'a [u8]> {
		self.0.next().map(Vec::as_slice)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.0.size_hint()
	}
}

impl DoubleEndedIterator for Lines<'_> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.0.next_back().map(Vec::as_slice)
	}
}

impl ExactSizeIterator for Lines<'_> {}

#[cfg(test)]
mod tests;
