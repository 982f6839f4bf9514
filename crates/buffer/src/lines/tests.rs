use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::{DeltaKind, LineStore};

fn lines(text: &[&str]) -> Vec<Vec<u8>> {
	text.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn store(text: &[&str]) -> LineStore {
	LineStore::from_lines(lines(text))
}

#[test]
fn new_store_is_one_empty_line() {
	let s = LineStore::new();
	assert_eq!(s.len(), 1);
	assert!(s.is_blank());
	assert_eq!(LineStore::from_lines(Vec::new()), s);
}

#[test]
fn insert_before_first_line() {
	let mut s = store(&["x"]);
	assert_eq!(s.apply(0, 0, lines(&["a", "b"])), DeltaKind::Insert);
	assert_eq!(s.to_vec(), lines(&["a", "b", "x"]));
}

#[test]
fn insert_at_end_appends() {
	let mut s = store(&["a", "b"]);
	assert_eq!(s.apply(2, 2, lines(&["c"])), DeltaKind::Insert);
	assert_eq!(s.to_vec(), lines(&["a", "b", "c"]));
}

#[test]
fn delete_range() {
	let mut s = store(&["a", "b", "c", "d"]);
	assert_eq!(s.apply(1, 3, Vec::new()), DeltaKind::Delete);
	assert_eq!(s.to_vec(), lines(&["a", "d"]));
}

#[test]
fn deleting_everything_leaves_one_empty_line() {
	let mut s = store(&["a", "b"]);
	s.apply(0, 2, Vec::new());
	assert!(s.is_blank());
}

#[test]
fn replace_equal_length_overwrites_only() {
	let mut s = store(&["a", "b", "c"]);
	assert_eq!(s.apply(1, 3, lines(&["B", "C"])), DeltaKind::Replace);
	assert_eq!(s.to_vec(), lines(&["a", "B", "C"]));
}

#[test]
fn replace_shorter_deletes_excess() {
	let mut s = store(&["a", "b", "c", "d"]);
	s.apply(0, 3, lines(&["z"]));
	assert_eq!(s.to_vec(), lines(&["z", "d"]));
}

#[test]
fn replace_longer_splices_excess() {
	let mut s = store(&["a", "b", "c"]);
	s.apply(1, 2, lines(&["1", "2", "3"]));
	assert_eq!(s.to_vec(), lines(&["a", "1", "2", "3", "c"]));

	let mut tail = store(&["a", "b"]);
	tail.apply(1, 2, lines(&["1", "2"]));
	assert_eq!(tail.to_vec(), lines(&["a", "1", "2"]));
}

#[test]
fn empty_delta_is_nothing() {
	let mut s = store(&["a"]);
	assert_eq!(s.apply(1, 1, Vec::new()), DeltaKind::Nothing);
	assert_eq!(s.to_vec(), lines(&["a"]));
}

#[test]
fn insert_replace_delete_sequence_collapses_to_empty_line() {
	let mut s = LineStore::new();
	s.apply(0, 0, lines(&["a", "b"]));
	assert_eq!(s.to_vec(), lines(&["a", "b", ""]));
	s.apply(1, 2, lines(&["c"]));
	assert_eq!(s.to_vec(), lines(&["a", "c", ""]));
	s.apply(0, 2, Vec::new());
	assert_eq!(s.to_vec(), lines(&[""]));
	assert!(s.is_blank());
}

#[test]
fn contents_joins_with_newlines() {
	assert_eq!(store(&["a", "", "b"]).contents(), b"a\n\nb");
	assert_eq!(LineStore::new().contents(), b"");
}

#[test]
fn iterator_is_double_ended() {
	let s = store(&["a", "b", "c"]);
	let back: Vec<_> = s.iter().rev().collect();
	assert_eq!(back, [b"c".as_slice(), b"b".as_slice(), b"a".as_slice()]);
	assert_eq!(s.iter().len(), 3);
	assert_eq!(s.get(1), Some(b"b".as_slice()));
	assert_eq!(s.get(3), None);
}

fn arb_lines(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
	prop::collection::vec(prop::collection::vec(b'a'..=b'e', 0..4), 0..max)
}

/// A raw delta; bounds are folded into range against the store it is applied to.
fn arb_delta() -> impl Strategy<Value = (usize, usize, Vec<Vec<u8>>)> {
	(0..8usize, 0..8usize, arb_lines(5))
}

proptest! {
	/// The linked store agrees with a plain `Vec::splice` model over a sequence of deltas.
	#[test]
	fn prop_matches_vec_model(initial in arb_lines(6), deltas in prop::collection::vec(arb_delta(), 1..8)) {
		let mut s = LineStore::from_lines(initial.clone());
		let mut model = if initial.is_empty() { vec![Vec::new()] } else { initial };
		for (first, span, replacement) in deltas {
			let first = first.min(model.len());
			let last = first + span % (model.len() - first + 1);
			s.apply(first, last, replacement.clone());
			model.splice(first..last, replacement);
			if model.is_empty() {
				model.push(Vec::new());
			}
			prop_assert_eq!(s.len(), model.len());
		}
		prop_assert_eq!(s.to_vec(), model);
		prop_assert!(s.len() >= 1);
	}
}
