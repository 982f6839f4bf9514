use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::Buffer;

/// Live buffers by host buffer number, plus every number ever attached.
#[derive(Debug, Default)]
pub struct BufferRegistry {
	buffers: RwLock<HashMap<i64, Arc<Buffer>>>,
	seen: Mutex<HashSet<i64>>,
}

impl BufferRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a buffer.
	///
	/// A live buffer with the same number is kept and the new one handed back, so a
	/// number is never reused while its buffer is still referenced.
	pub fn insert(&self, buffer: Arc<Buffer>) -> Result<Arc<Buffer>, Arc<Buffer>> {
		let id = buffer.id();
		let mut buffers = self.buffers.write();
		if buffers.contains_key(&id) {
			return Err(buffer);
		}
		buffers.insert(id, Arc::clone(&buffer));
		drop(buffers);
		self.seen.lock().insert(id);
		Ok(buffer)
	}

	/// Looks up a live buffer.
	pub fn get(&self, id: i64) -> Option<Arc<Buffer>> {
		self.buffers.read().get(&id).cloned()
	}

	/// Unregisters a buffer, returning it for teardown.
	pub fn remove(&self, id: i64) -> Option<Arc<Buffer>> {
		self.buffers.write().remove(&id)
	}

	/// Returns true if `id` was attached at some point, live or not.
	pub fn have_seen(&self, id: i64) -> bool {
		self.seen.lock().contains(&id)
	}

	/// Numbers of all live buffers, sorted.
	pub fn ids(&self) -> Vec<i64> {
		let mut ids: Vec<_> = self.buffers.read().keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	/// Removes every live buffer, returning them for teardown.
	pub fn drain(&self) -> Vec<Arc<Buffer>> {
		self.buffers.write().drain().map(|(_, b)| b).collect()
	}

	/// Number of live buffers.
	pub fn len(&self) -> usize {
		self.buffers.read().len()
	}

	/// Returns true if no buffer is live.
	pub fn is_empty(&self) -> bool {
		self.buffers.read().is_empty()
	}
}
