use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::naming::{ARCHIVE_DIR, archive_path, sanitize_path};
use crate::{Compression, Error, ProjectRoot, Result};

/// Subdirectory of the cache directory holding per-session scratch files.
const SCRATCH_DIR: &str = "scratch";

/// One project's shared cache state.
///
/// Owns a scratch file that exists exactly as long as the entry is registered, and
/// names a persistent archive that outlives it.
#[derive(Debug)]
pub struct ProjectCache {
	root: PathBuf,
	analyzer: String,
	recurse: bool,
	compression: Compression,
	archive: PathBuf,
	scratch_path: PathBuf,
	scratch: Mutex<Option<NamedTempFile>>,
	timestamp: Mutex<Option<SystemTime>>,
}

impl ProjectCache {
	/// The project key this entry was acquired for.
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// The analyzer this entry belongs to.
	pub fn analyzer(&self) -> &str {
		&self.analyzer
	}

	/// Whether the analyzer may scan the root recursively.
	pub fn recurse(&self) -> bool {
		self.recurse
	}

	/// The scratch file analyzers write their output to.
	pub fn scratch_path(&self) -> &Path {
		&self.scratch_path
	}

	/// The persistent, possibly compressed, archive of the output.
	pub fn archive_path(&self) -> &Path {
		&self.archive
	}

	/// Modification time of the archive, read from disk on first use.
	pub fn timestamp(&self) -> Option<SystemTime> {
		let mut cached = self.timestamp.lock();
		if cached.is_none() {
			*cached = fs::metadata(&self.archive).and_then(|m| m.modified()).ok();
		}
		*cached
	}

	/// Replaces the scratch file's contents.
	pub fn write_scratch(&self, data: &[u8]) -> Result<()> {
		fs::write(&self.scratch_path, data).map_err(Error::io(&self.scratch_path))
	}

	/// Reads the scratch file.
	pub fn read_scratch(&self) -> Result<Vec<u8>> {
		fs::read(&self.scratch_path).map_err(Error::io(&self.scratch_path))
	}

	/// Copies the scratch file into the archive, compressing as configured.
	pub fn save_archive(&self) -> Result<()> {
		let data = self.read_scratch()?;
		let wrap = Error::io(&self.archive);
		let file = File::create(&self.archive).map_err(Error::io(&self.archive))?;
		let written = match self.compression {
			Compression::None => {
				let mut file = file;
				file.write_all(&data).and_then(|()| file.sync_all())
			}
			Compression::Gzip => {
				let mut enc = GzEncoder::new(file, flate2::Compression::default());
				enc.write_all(&data).and_then(|()| enc.finish()).and_then(|f| f.sync_all())
			}
		};
		written.map_err(wrap)?;
		*self.timestamp.lock() = fs::metadata(&self.archive).and_then(|m| m.modified()).ok();
		tracing::debug!(archive = %self.archive.display(), bytes = data.len(), "saved project archive");
		Ok(())
	}

	/// Restores the scratch file from the archive.
	///
	/// Returns false if there is no archive yet.
	pub fn load_archive(&self) -> Result<bool> {
		let file = match File::open(&self.archive) {
			Ok(file) => file,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(Error::io(&self.archive)(e)),
		};
		let mut data = Vec::new();
		let read = match self.compression {
			Compression::None => (&file).read_to_end(&mut data),
			Compression::Gzip => GzDecoder::new(file).read_to_end(&mut data),
		};
		read.map_err(Error::io(&self.archive))?;
		self.write_scratch(&data)?;
		Ok(true)
	}

	/// Unlinks the scratch file. Called once, when the last lease is released.
	fn destroy(&self) {
		let Some(scratch) = self.scratch.lock().take() else {
			return;
		};
		if let Err(e) = scratch.close() {
			tracing::warn!(path = %self.scratch_path.display(), error = %e, "failed to remove scratch file");
		}
	}
}

struct Slot {
	cache: Arc<ProjectCache>,
	refs: usize,
}

struct Inner {
	cache_dir: PathBuf,
	compression: Compression,
	slots: Mutex<Vec<Slot>>,
}

impl Inner {
	fn release(&self, cache: &Arc<ProjectCache>) {
		let destroyed = {
			let mut slots = self.slots.lock();
			let Some(pos) = slots.iter().position(|s| Arc::ptr_eq(&s.cache, cache)) else {
				tracing::warn!(root = %cache.root.display(), "released a project cache that is not registered");
				return;
			};
			slots[pos].refs -= 1;
			if slots[pos].refs > 0 {
				tracing::trace!(root = %cache.root.display(), refs = slots[pos].refs, "project cache released");
				return;
			}
			slots.remove(pos).cache
		};
		tracing::info!(root = %destroyed.root.display(), analyzer = %destroyed.analyzer, "destroying project cache");
		destroyed.destroy();
	}
}

/// Deduplicating registry of [`ProjectCache`] entries keyed by (root, analyzer).
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ProjectCacheRegistry {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for ProjectCacheRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProjectCacheRegistry")
			.field("cache_dir", &self.inner.cache_dir)
			.field("entries", &self.len())
			.finish()
	}
}

impl ProjectCacheRegistry {
	/// Creates a registry storing files under `cache_dir`. Directories are created on demand.
	pub fn new(cache_dir: impl Into<PathBuf>, compression: Compression) -> Self {
		Self {
			inner: Arc::new(Inner {
				cache_dir: cache_dir.into(),
				compression,
				slots: Mutex::new(Vec::new()),
			}),
		}
	}

	/// The configured cache directory.
	pub fn cache_dir(&self) -> &Path {
		&self.inner.cache_dir
	}

	/// Returns the entry for (`root`, `analyzer`), creating it if needed, and takes a
	/// reference on it.
	pub fn acquire(&self, root: &ProjectRoot, analyzer: &str) -> Result<CacheLease> {
		let mut slots = self.inner.slots.lock();
		if let Some(slot) = slots
			.iter_mut()
			.find(|s| s.cache.root == root.key && s.cache.analyzer == analyzer)
		{
			slot.refs += 1;
			tracing::debug!(root = %root.key.display(), analyzer, refs = slot.refs, "reusing project cache");
			return Ok(self.lease(Arc::clone(&slot.cache)));
		}

		let cache = Arc::new(self.create(root, analyzer)?);
		tracing::info!(root = %root.key.display(), analyzer, recurse = root.recurse, "initialized project cache");
		slots.push(Slot {
			cache: Arc::clone(&cache),
			refs: 1,
		});
		Ok(self.lease(cache))
	}

	/// Gives back a reference. The last release removes the entry and unlinks its scratch file.
	pub fn release(&self, lease: CacheLease) {
		drop(lease);
	}

	/// Current reference count of the entry for (`root`, `analyzer`).
	pub fn ref_count(&self, root: &Path, analyzer: &str) -> Option<usize> {
		self.inner
			.slots
			.lock()
			.iter()
			.find(|s| s.cache.root == root && s.cache.analyzer == analyzer)
			.map(|s| s.refs)
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		self.inner.slots.lock().len()
	}

	/// Returns true if no entry is live.
	pub fn is_empty(&self) -> bool {
		self.inner.slots.lock().is_empty()
	}

	fn lease(&self, cache: Arc<ProjectCache>) -> CacheLease {
		CacheLease {
			cache,
			registry: Arc::clone(&self.inner),
		}
	}

	fn create(&self, root: &ProjectRoot, analyzer: &str) -> Result<ProjectCache> {
		let cache_dir = &self.inner.cache_dir;
		if cache_dir.as_os_str().is_empty() {
			return Err(Error::CacheDir);
		}
		let scratch_dir = cache_dir.join(SCRATCH_DIR);
		for dir in [cache_dir.join(ARCHIVE_DIR), scratch_dir.clone()] {
			fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
		}

		let scratch = tempfile::Builder::new()
			.prefix(&format!("{}.", sanitize_path(&root.key)))
			.suffix(&format!(".{analyzer}.tags"))
			.tempfile_in(&scratch_dir)
			.map_err(Error::io(&scratch_dir))?;

		Ok(ProjectCache {
			root: root.key.clone(),
			analyzer: analyzer.to_owned(),
			recurse: root.recurse,
			compression: self.inner.compression,
			archive: archive_path(cache_dir, &root.key, analyzer, self.inner.compression),
			scratch_path: scratch.path().to_path_buf(),
			scratch: Mutex::new(Some(scratch)),
			timestamp: Mutex::new(None),
		})
	}
}

/// A counted reference to a [`ProjectCache`]. Dropping it releases the reference.
#[must_use = "dropping a lease releases it immediately"]
pub struct CacheLease {
	cache: Arc<ProjectCache>,
	registry: Arc<Inner>,
}

impl std::fmt::Debug for CacheLease {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("CacheLease").field(&self.cache.root).finish()
	}
}

impl std::ops::Deref for CacheLease {
	type Target = ProjectCache;

	fn deref(&self) -> &ProjectCache {
		&self.cache
	}
}

impl Drop for CacheLease {
	fn drop(&mut self) {
		self.registry.release(&self.cache);
	}
}
