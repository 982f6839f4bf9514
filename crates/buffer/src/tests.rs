use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use taglight_project::{Compression, ProjectCacheRegistry, ProjectRoot};

use crate::{Buffer, BufferPath, BufferRegistry, DeltaKind, DeltaOutcome};

fn lines(text: &[&str]) -> Vec<Vec<u8>> {
	text.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn buffer(id: i64) -> Buffer {
	Buffer::new(id, BufferPath::new("/src/proj/main.c"), "c")
}

#[test]
fn path_pieces() {
	let path = BufferPath::new("/src/proj/main.c");
	assert_eq!(path.base, "main.c");
	assert_eq!(path.dir, PathBuf::from("/src/proj"));
	assert_eq!(path.suffix.as_deref(), Some("c"));
	assert_eq!(BufferPath::new("Makefile").suffix, None);
}

#[test]
fn initial_update_replaces_everything() {
	let buf = buffer(1);
	buf.replace_all(lines(&["old", "text"]));
	assert_eq!(buf.apply_delta(0, -1, lines(&["new"])), DeltaOutcome::Reloaded);
	assert_eq!(buf.snapshot(), lines(&["new"]));
	assert_eq!(buf.apply_delta(0, -1, Vec::new()), DeltaOutcome::Reloaded);
	assert_eq!(buf.snapshot(), lines(&[""]));
}

#[test]
fn overwriting_the_empty_line_is_useless() {
	let buf = buffer(1);
	assert_eq!(buf.apply_delta(0, 1, lines(&[""])), DeltaOutcome::Useless);
	assert_eq!(buf.line_count(), 1);
	assert!(!buf.is_initialized());
	assert_eq!(buf.edits(), 0);
}

#[test]
fn open_line_in_empty_buffer_inserts() {
	let buf = buffer(1);
	// `O` in an empty buffer: the host now holds two empty lines.
	assert_eq!(buf.apply_delta(0, 0, lines(&[""])), DeltaOutcome::Applied(DeltaKind::Insert));
	assert_eq!(buf.snapshot(), lines(&["", ""]));
	assert!(buf.is_initialized());

	assert_eq!(buf.apply_delta(0, 1, lines(&["x"])), DeltaOutcome::Applied(DeltaKind::Replace));
	assert_eq!(buf.snapshot(), lines(&["x", ""]));
}

#[test]
fn deltas_from_the_host_sequence() {
	let buf = buffer(1);
	buf.apply_delta(0, 0, lines(&["a", "b"]));
	buf.apply_delta(1, 2, lines(&["c"]));
	buf.apply_delta(0, 2, Vec::new());
	assert_eq!(buf.snapshot(), lines(&[""]));
}

#[test]
fn out_of_range_deltas_are_clamped() {
	let buf = buffer(1);
	buf.replace_all(lines(&["a", "b"]));
	assert_eq!(buf.apply_delta(5, 9, lines(&["c"])), DeltaOutcome::Applied(DeltaKind::Insert));
	assert_eq!(buf.snapshot(), lines(&["a", "b", "c"]));
	assert_eq!(buf.apply_delta(1, 99, Vec::new()), DeltaOutcome::Applied(DeltaKind::Delete));
	assert_eq!(buf.snapshot(), lines(&["a"]));
	assert_eq!(buf.apply_delta(-2, 1, lines(&["z"])), DeltaOutcome::Applied(DeltaKind::Replace));
	assert_eq!(buf.snapshot(), lines(&["z"]));
}

#[test]
fn readers_reenter_the_lock() {
	let buf = buffer(1);
	buf.replace_all(lines(&["a", "b"]));
	let nested = buf.with_lines(|outer| buf.with_lines(|inner| outer.len() + inner.len()));
	assert_eq!(nested, 4);
}

#[test]
fn readers_never_see_partial_deltas() {
	let buf = Arc::new(buffer(1));
	buf.replace_all(vec![b"x".to_vec(); 100]);

	let writer = {
		let buf = Arc::clone(&buf);
		thread::spawn(move || {
			for i in 0..200u8 {
				let line = vec![b'a' + i % 26];
				buf.apply_delta(0, 100, vec![line; 100]);
			}
		})
	};
	for _ in 0..200 {
		buf.with_lines(|store| {
			assert_eq!(store.len(), 100);
			let first = store.get(0).map(<[u8]>::to_vec);
			assert!(store.iter().all(|l| Some(l.to_vec()) == first), "mixed generations");
		});
	}
	writer.join().unwrap();
}

#[test]
fn panicking_reader_does_not_wedge_the_lock() {
	let buf = Arc::new(buffer(1));
	let crashed = {
		let buf = Arc::clone(&buf);
		thread::spawn(move || buf.with_lines(|store| assert!(store.len() > 5, "analyzer crashed")))
	};
	assert!(crashed.join().is_err());
	assert_eq!(buf.apply_delta(0, 1, lines(&["ok"])), DeltaOutcome::Applied(DeltaKind::Replace));
}

#[test]
fn highlight_slot_coalesces() {
	let buf = buffer(1);
	assert!(buf.try_queue_highlight());
	assert!(!buf.try_queue_highlight());
	buf.finish_highlight();
	assert!(buf.try_queue_highlight());

	buf.set_changetick(4);
	assert!(buf.needs_highlight());
	buf.mark_highlighted(4, buf.edits());
	assert!(!buf.needs_highlight());
}

#[test]
fn edits_without_a_tick_need_highlight() {
	let buf = buffer(1);
	buf.replace_all(lines(&["a"]));
	buf.mark_highlighted(0, buf.edits());
	assert!(!buf.needs_highlight());

	buf.apply_delta(0, 1, lines(&["b"]));
	assert_eq!(buf.changetick(), 0);
	assert!(buf.needs_highlight());
	buf.mark_highlighted(0, buf.edits());

	// An empty delta changes nothing.
	assert_eq!(buf.apply_delta(1, 1, Vec::new()), DeltaOutcome::Applied(DeltaKind::Nothing));
	assert!(!buf.needs_highlight());
}

#[test]
fn close_releases_project_cache_once() {
	let dir = tempfile::tempdir().unwrap();
	let caches = ProjectCacheRegistry::new(dir.path(), Compression::None);
	let root = ProjectRoot {
		key: "/src/proj".into(),
		dir: "/src/proj".into(),
		recurse: true,
	};

	let a = buffer(1);
	let b = buffer(2);
	a.set_cache(caches.acquire(&root, "c").unwrap());
	b.set_cache(caches.acquire(&root, "c").unwrap());
	assert_eq!(caches.ref_count(Path::new("/src/proj"), "c"), Some(2));
	assert_eq!(a.with_cache(|c| c.analyzer().to_owned()).as_deref(), Some("c"));

	a.close();
	a.close();
	assert!(a.is_closed());
	assert_eq!(caches.ref_count(Path::new("/src/proj"), "c"), Some(1));
	b.close();
	assert!(caches.is_empty());
}

#[test]
fn side_state_downcasts() {
	let buf = buffer(1);
	assert_eq!(buf.with_side_state(|n: &mut u32| *n), None);
	buf.set_side_state(Box::new(41u32));
	assert_eq!(buf.with_side_state(|n: &mut u32| { *n += 1; *n }), Some(42));
	assert_eq!(buf.with_side_state(|s: &mut String| s.len()), None);
}

#[test]
fn registry_tracks_seen_ids() {
	let reg = BufferRegistry::new();
	assert!(reg.insert(Arc::new(buffer(3))).is_ok());
	assert!(reg.insert(Arc::new(buffer(3))).is_err());
	assert!(reg.insert(Arc::new(buffer(1))).is_ok());
	assert_eq!(reg.ids(), [1, 3]);

	let removed = reg.remove(3).unwrap();
	assert_eq!(removed.id(), 3);
	assert!(reg.get(3).is_none());
	assert!(reg.have_seen(3));
	assert!(!reg.have_seen(9));
	assert!(reg.remove(3).is_none());

	assert_eq!(reg.drain().len(), 1);
	assert!(reg.is_empty());
}
