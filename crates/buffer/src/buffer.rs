use std::any::Any;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use taglight_project::CacheLease;

use crate::lines::{DeltaKind, LineStore};

/// The file name pieces of a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPath {
	/// The full path as the host reports it.
	pub full: PathBuf,
	/// The final component.
	pub base: String,
	/// The containing directory.
	pub dir: PathBuf,
	/// The extension without its dot, if any.
	pub suffix: Option<String>,
}

impl BufferPath {
	/// Splits a host buffer name into its pieces.
	pub fn new(full: impl Into<PathBuf>) -> Self {
		let full = full.into();
		let base = full
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();
		let dir = full.parent().map(Path::to_path_buf).unwrap_or_default();
		let suffix = full.extension().map(|e| e.to_string_lossy().into_owned());
		Self { full, base, dir, suffix }
	}
}

/// Result of [`Buffer::apply_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
	/// The delta was applied to the line store.
	Applied(DeltaKind),
	/// An initial update replaced the whole store.
	Reloaded,
	/// The host overwrote the only line of an empty buffer with an empty line. Nothing changed.
	Useless,
}

/// A mirrored host buffer.
///
/// Line storage sits behind a reentrant lock so a thread that holds it for a delta can
/// re-enter read paths. Highlight workers take the same lock and so never see a
/// half-applied delta. A panic while the lock is held does not wedge other threads.
pub struct Buffer {
	id: i64,
	path: BufferPath,
	filetype: String,
	lines: ReentrantMutex<RefCell<LineStore>>,
	changetick: AtomicU64,
	last_highlight_tick: AtomicU64,
	edits: AtomicU64,
	highlighted_edits: AtomicU64,
	initialized: AtomicBool,
	highlight_queued: AtomicBool,
	closed: AtomicBool,
	cache: Mutex<Option<CacheLease>>,
	side_state: Mutex<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for Buffer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Buffer")
			.field("id", &self.id)
			.field("path", &self.path.full)
			.field("filetype", &self.filetype)
			.field("changetick", &self.changetick())
			.finish_non_exhaustive()
	}
}

impl Buffer {
	/// Creates a buffer holding one empty line.
	pub fn new(id: i64, path: BufferPath, filetype: impl Into<String>) -> Self {
		Self {
			id,
			path,
			filetype: filetype.into(),
			lines: ReentrantMutex::new(RefCell::new(LineStore::new())),
			changetick: AtomicU64::new(0),
			last_highlight_tick: AtomicU64::new(0),
			edits: AtomicU64::new(0),
			highlighted_edits: AtomicU64::new(0),
			initialized: AtomicBool::new(false),
			highlight_queued: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			cache: Mutex::new(None),
			side_state: Mutex::new(None),
		}
	}

	/// The host's buffer number.
	pub fn id(&self) -> i64 {
		self.id
	}

	/// File name pieces.
	pub fn path(&self) -> &BufferPath {
		&self.path
	}

	/// The filetype the buffer was attached with.
	pub fn filetype(&self) -> &str {
		&self.filetype
	}

	/// Runs `f` with shared access to the lines, holding the buffer lock.
	pub fn with_lines<R>(&self, f: impl FnOnce(&LineStore) -> R) -> R {
		let guard = self.lines.lock();
		let store = guard.borrow();
		f(&store)
	}

	/// Copies the current lines out.
	pub fn snapshot(&self) -> Vec<Vec<u8>> {
		self.with_lines(LineStore::to_vec)
	}

	/// Number of lines.
	pub fn line_count(&self) -> usize {
		self.with_lines(LineStore::len)
	}

	/// Replaces the contents, e.g. with lines fetched right after attaching.
	pub fn replace_all(&self, lines: Vec<Vec<u8>>) {
		let guard = self.lines.lock();
		guard.borrow_mut().replace_all(lines);
		self.edits.fetch_add(1, Ordering::AcqRel);
		self.initialized.store(true, Ordering::Release);
	}

	/// Applies a host line delta: replace `[first, last)` with `replacement`.
	///
	/// `last == -1` marks an initial update carrying the whole buffer. Out-of-range
	/// bounds are clamped to the store's extent.
	pub fn apply_delta(&self, first: i64, last: i64, replacement: Vec<Vec<u8>>) -> DeltaOutcome {
		let guard = self.lines.lock();
		let mut store = guard.borrow_mut();

		if last == -1 {
			store.replace_all(replacement);
			self.edits.fetch_add(1, Ordering::AcqRel);
			self.initialized.store(true, Ordering::Release);
			return DeltaOutcome::Reloaded;
		}

		if store.is_blank() && first == 0 && last == 1 && replacement.len() == 1 && replacement[0].is_empty() {
			tracing::trace!(buffer = self.id, "ignoring empty line in empty buffer");
			return DeltaOutcome::Useless;
		}

		let len = store.len();
		let in_range = 0 <= first && first <= last && u64::try_from(last).is_ok_and(|l| l <= len as u64);
		if !in_range {
			tracing::warn!(buffer = self.id, first, last, lines = len, "line delta out of range; clamped");
		}
		let (first, last) = clamp(first, last, len);

		let kind = store.apply(first, last, replacement);
		if kind != DeltaKind::Nothing {
			self.edits.fetch_add(1, Ordering::AcqRel);
		}
		self.initialized.store(true, Ordering::Release);
		DeltaOutcome::Applied(kind)
	}

	/// Returns true once the buffer has received real contents.
	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::Acquire)
	}

	/// The last change counter reported by the host.
	pub fn changetick(&self) -> u64 {
		self.changetick.load(Ordering::Acquire)
	}

	/// Records a new change counter.
	pub fn set_changetick(&self, tick: u64) {
		self.changetick.store(tick, Ordering::Release);
	}

	/// Counts text changes applied to the mirror, whether or not the host sent a tick.
	pub fn edits(&self) -> u64 {
		self.edits.load(Ordering::Acquire)
	}

	/// Returns true if the text changed since the last completed highlight.
	pub fn needs_highlight(&self) -> bool {
		self.changetick() != self.last_highlight_tick.load(Ordering::Acquire)
			|| self.edits() != self.highlighted_edits.load(Ordering::Acquire)
	}

	/// Records that highlights were computed at `tick`, after `edits` text changes.
	pub fn mark_highlighted(&self, tick: u64, edits: u64) {
		self.last_highlight_tick.store(tick, Ordering::Release);
		self.highlighted_edits.store(edits, Ordering::Release);
	}

	/// Claims the buffer's single highlight slot.
	///
	/// Returns false if a highlight job is already queued or running.
	pub fn try_queue_highlight(&self) -> bool {
		self.highlight_queued
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	/// Frees the highlight slot claimed by [`try_queue_highlight`](Self::try_queue_highlight).
	pub fn finish_highlight(&self) {
		self.highlight_queued.store(false, Ordering::Release);
	}

	/// Attaches the project cache lease. Replaces and releases any previous one.
	pub fn set_cache(&self, lease: CacheLease) {
		*self.cache.lock() = Some(lease);
	}

	/// Runs `f` with the project cache, if one is attached.
	pub fn with_cache<R>(&self, f: impl FnOnce(&CacheLease) -> R) -> Option<R> {
		self.cache.lock().as_ref().map(f)
	}

	/// Stores analyzer-specific state.
	pub fn set_side_state(&self, state: Box<dyn Any + Send>) {
		*self.side_state.lock() = Some(state);
	}

	/// Runs `f` with the analyzer-specific state downcast to `T`.
	pub fn with_side_state<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
		let mut state = self.side_state.lock();
		state.as_deref_mut()?.downcast_mut::<T>().map(f)
	}

	/// Returns true once [`close`](Self::close) ran.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Tears the buffer down.
	///
	/// Blocks until no other thread holds the line lock, then releases the project
	/// cache and analyzer state. Later calls do nothing.
	pub fn close(&self) {
		let guard = self.lines.lock();
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		let lease = self.cache.lock().take();
		self.side_state.lock().take();
		drop(guard);
		drop(lease);
		tracing::debug!(buffer = self.id, "buffer closed");
	}
}

/// Clamps a host range to `0..=len` with `first <= last`.
fn clamp(first: i64, last: i64, len: usize) -> (usize, usize) {
	let to_index = |n: i64| usize::try_from(n.max(0)).unwrap_or(usize::MAX).min(len);
	let first = to_index(first);
	let last = to_index(last).max(first);
	(first, last)
}

#[cfg(test)]
mod clamp_tests {
	use super::clamp;

	#[test]
	fn clamps_into_range() {
		assert_eq!(clamp(0, 2, 5), (0, 2));
		assert_eq!(clamp(7, 9, 5), (5, 5));
		assert_eq!(clamp(2, 9, 5), (2, 5));
		assert_eq!(clamp(-3, 1, 5), (0, 1));
		assert_eq!(clamp(3, 1, 5), (3, 3));
	}
}
