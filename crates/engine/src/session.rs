//! Session state shared by the dispatcher and its workers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use taglight_buffer::{Buffer, BufferPath, BufferRegistry, DeltaOutcome};
use taglight_project::{ProjectCacheRegistry, RootSelector};
use taglight_rpc::AtomicBatch;

use crate::{Analyzers, Config, ExternalUpdate, Host, Result, TaskClass, Workers};

/// Why the session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	/// The user asked taglight to stop.
	Stop,
	/// The host is exiting.
	Exit,
	/// The connection to the host closed.
	Disconnected,
}

/// Everything one host connection works on.
///
/// Line and change-counter events are applied on the caller's thread, in the order
/// they arrive. Highlighting, external updates and buffer teardown go to workers.
pub struct Session {
	host: Arc<dyn Host>,
	config: Config,
	analyzers: Analyzers,
	workers: Workers,
	buffers: BufferRegistry,
	caches: ProjectCacheRegistry,
	selector: RootSelector,
	namespace: Mutex<Option<i64>>,
	/// Serializes external updates.
	update_lock: Mutex<()>,
	previous: Mutex<Option<i64>>,
	shutdown: Mutex<Option<Shutdown>>,
	shutdown_cv: Condvar,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("buffers", &self.buffers.ids())
			.field("caches", &self.caches)
			.field("analyzers", &self.analyzers)
			.field("workers", &self.workers)
			.finish_non_exhaustive()
	}
}

impl Session {
	/// Creates a session. Fails if the project dirs file cannot be read.
	pub fn new(host: Arc<dyn Host>, config: Config, analyzers: Analyzers, workers: Workers) -> Result<Arc<Self>> {
		let selector = config.root_selector()?;
		let caches = ProjectCacheRegistry::new(&config.cache_dir, config.compression);
		Ok(Arc::new(Self {
			host,
			config,
			analyzers,
			workers,
			buffers: BufferRegistry::new(),
			caches,
			selector,
			namespace: Mutex::new(None),
			update_lock: Mutex::new(()),
			previous: Mutex::new(None),
			shutdown: Mutex::new(None),
			shutdown_cv: Condvar::new(),
		}))
	}

	/// The settings in use.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Live buffers.
	pub fn buffers(&self) -> &BufferRegistry {
		&self.buffers
	}

	/// Shared project caches.
	pub fn caches(&self) -> &ProjectCacheRegistry {
		&self.caches
	}

	/// Where dispatched work runs.
	pub fn workers(&self) -> Workers {
		self.workers
	}

	/// Starts mirroring host buffer `buf`.
	///
	/// Returns the live buffer, or `None` if the buffer is unnamed, has an ignored
	/// filetype, has no analyzer, or the host refused to attach.
	pub fn attach(self: &Arc<Self>, buf: i64) -> Result<Option<Arc<Buffer>>> {
		if let Some(existing) = self.buffers.get(buf) {
			return Ok(Some(existing));
		}

		let filetype = self.host.filetype(buf)?;
		if self.config.is_ignored(&filetype) {
			tracing::debug!(buffer = buf, filetype = %filetype, "filetype ignored");
			return Ok(None);
		}
		let Some(analyzer) = self.analyzers.get(&filetype) else {
			tracing::debug!(buffer = buf, filetype = %filetype, "no analyzer for filetype");
			return Ok(None);
		};
		let name = self.host.buffer_name(buf)?;
		if name.is_empty() {
			tracing::debug!(buffer = buf, "unnamed buffer not attached");
			return Ok(None);
		}
		let tick = self.host.changedtick(buf)?;

		let buffer = Arc::new(Buffer::new(buf, BufferPath::new(name), filetype));
		buffer.set_changetick(tick);
		let root = self.selector.select(&buffer.path().full, buffer.filetype());
		let lease = self.caches.acquire(&root, buffer.filetype())?;
		if self.caches.ref_count(&root.key, buffer.filetype()) == Some(1) {
			match lease.load_archive() {
				Ok(restored) => tracing::debug!(root = %root.key.display(), restored, "new project cache"),
				Err(e) => tracing::warn!(root = %root.key.display(), error = %e, "failed to restore project archive"),
			}
		}
		buffer.set_cache(lease);

		let buffer = match self.buffers.insert(buffer) {
			Ok(buffer) => buffer,
			Err(lost) => {
				lost.close();
				return Ok(self.buffers.get(buf));
			}
		};

		match self.start_sync(&buffer) {
			Ok(true) => {}
			Ok(false) => {
				tracing::warn!(buffer = buf, "host refused to attach buffer");
				self.discard(&buffer);
				return Ok(None);
			}
			Err(e) => {
				self.discard(&buffer);
				return Err(e);
			}
		}

		tracing::info!(
			buffer = buf,
			path = %buffer.path().full.display(),
			filetype = %buffer.filetype(),
			analyzer = analyzer.name(),
			root = %root.key.display(),
			"buffer attached"
		);
		self.schedule_highlight(&buffer, true);
		Ok(Some(buffer))
	}

	/// Loads the lines, then subscribes to line events.
	///
	/// The host's first event after subscribing carries the whole buffer and
	/// replaces what was loaded here.
	fn start_sync(&self, buffer: &Buffer) -> Result<bool> {
		buffer.replace_all(self.host.buffer_lines(buffer.id())?);
		self.host.attach(buffer.id())
	}

	fn discard(&self, buffer: &Arc<Buffer>) {
		self.buffers.remove(buffer.id());
		buffer.close();
	}

	/// Handles a host detach: unregisters `buf` now and closes it on a worker.
	///
	/// Returns false if no such buffer is live.
	pub fn detach(&self, buf: i64) -> bool {
		let Some(buffer) = self.buffers.remove(buf) else {
			tracing::debug!(buffer = buf, "detach for unknown buffer");
			return false;
		};
		tracing::info!(buffer = buf, "buffer detached");
		self.workers.spawn(TaskClass::Teardown, move || buffer.close());
		true
	}

	/// Applies a line delta and, once the change is complete, schedules highlighting.
	pub fn apply_lines(self: &Arc<Self>, buf: i64, tick: Option<u64>, first: i64, last: i64, lines: Vec<Vec<u8>>, more: bool) {
		let Some(buffer) = self.buffers.get(buf) else {
			tracing::debug!(buffer = buf, "lines for unknown buffer dropped");
			return;
		};
		let outcome = buffer.apply_delta(first, last, lines);
		if let Some(tick) = tick {
			buffer.set_changetick(tick);
		}
		tracing::trace!(buffer = buf, first, last, ?outcome, "delta");
		if outcome != DeltaOutcome::Useless && !more {
			self.schedule_highlight(&buffer, false);
		}
	}

	/// Records a change counter that moved without a text change.
	pub fn set_changedtick(&self, buf: i64, tick: u64) {
		match self.buffers.get(buf) {
			Some(buffer) => buffer.set_changetick(tick),
			None => tracing::debug!(buffer = buf, "changedtick for unknown buffer dropped"),
		}
	}

	/// Queues a highlight pass unless one is already queued or nothing changed.
	///
	/// A change that lands while a pass runs is picked up by another pass on the same worker.
	pub fn schedule_highlight(self: &Arc<Self>, buffer: &Arc<Buffer>, force: bool) {
		if !force && !buffer.needs_highlight() {
			return;
		}
		if !buffer.try_queue_highlight() {
			tracing::trace!(buffer = buffer.id(), "highlight already queued");
			return;
		}
		let session = Arc::clone(self);
		let buffer = Arc::clone(buffer);
		self.workers.spawn(TaskClass::Highlight, move || {
			loop {
				let result = session.highlight(&buffer);
				buffer.finish_highlight();
				if let Err(e) = result {
					tracing::warn!(buffer = buffer.id(), error = %e, "highlight failed");
					break;
				}
				if buffer.is_closed() || !buffer.needs_highlight() || !buffer.try_queue_highlight() {
					break;
				}
			}
		});
	}

	/// Recomputes and sends the buffer's highlights. Returns the number of decorations.
	pub fn highlight(&self, buffer: &Buffer) -> Result<usize> {
		if buffer.is_closed() {
			return Ok(0);
		}
		let Some(analyzer) = self.analyzers.get(buffer.filetype()) else {
			return Ok(0);
		};
		let tick = buffer.changetick();
		let (edits, decorations) = buffer.with_lines(|lines| analyzer.decorate(buffer, lines).map(|d| (buffer.edits(), d)))?;
		let ns = self.namespace()?;

		let mut batch = AtomicBatch::new();
		batch.clear_namespace(buffer.id(), ns, 0, -1);
		for d in &decorations {
			batch.add_highlight(buffer.id(), ns, &d.group, d.line, d.start, d.end);
		}
		self.host.apply_batch(batch)?;
		buffer.mark_highlighted(tick, edits);
		tracing::debug!(buffer = buffer.id(), tick, count = decorations.len(), "highlighted");
		Ok(decorations.len())
	}

	/// Removes all highlights from the buffer until its next change.
	pub fn clear(&self, buffer: &Buffer) -> Result<()> {
		let ns = self.namespace()?;
		let mut batch = AtomicBatch::new();
		batch.clear_namespace(buffer.id(), ns, 0, -1);
		self.host.apply_batch(batch)?;
		let edits = buffer.with_lines(|_| buffer.edits());
		buffer.mark_highlighted(buffer.changetick(), edits);
		Ok(())
	}

	fn namespace(&self) -> Result<i64> {
		let mut ns = self.namespace.lock();
		if let Some(id) = *ns {
			return Ok(id);
		}
		let id = self.host.create_namespace(&self.config.namespace)?;
		*ns = Some(id);
		Ok(id)
	}

	/// Handles a user event from the host. Updates run one at a time.
	pub fn handle_update(self: &Arc<Self>, update: ExternalUpdate) -> Result<()> {
		let _serial = self.update_lock.lock();
		tracing::debug!(?update, "external update");

		match update {
			ExternalUpdate::Exit => {
				self.signal_shutdown(Shutdown::Exit);
				return Ok(());
			}
			ExternalUpdate::Stop => {
				self.detach_all();
				self.signal_shutdown(Shutdown::Stop);
				return Ok(());
			}
			_ => {}
		}

		let current = self.host.current_buffer()?;
		let previous = self.previous.lock().replace(current);

		match update {
			ExternalUpdate::BufNew => {
				self.attach(current)?;
			}
			ExternalUpdate::BufChanged => {
				if previous == Some(current) && self.buffers.get(current).is_some() {
					return Ok(());
				}
				if self.buffers.get(current).is_none() && self.buffers.have_seen(current) {
					tracing::debug!(buffer = current, "re-attaching previously detached buffer");
				}
				if let Some(buffer) = self.attach(current)? {
					self.schedule_highlight(&buffer, false);
				}
			}
			ExternalUpdate::SyntaxChanged => {
				if let Some(buffer) = self.buffers.get(current) {
					let filetype = self.host.filetype(current)?;
					if filetype == buffer.filetype() {
						self.schedule_highlight(&buffer, true);
						return Ok(());
					}
					tracing::info!(buffer = current, from = %buffer.filetype(), to = %filetype, "filetype changed");
					self.discard(&buffer);
					self.host.detach(current)?;
				}
				self.attach(current)?;
			}
			ExternalUpdate::UpdateTags => {
				if let Some(buffer) = self.buffers.get(current) {
					self.update_project(&buffer)?;
					self.schedule_highlight(&buffer, true);
				}
			}
			ExternalUpdate::ForceUpdate => match self.buffers.get(current) {
				Some(buffer) => self.schedule_highlight(&buffer, true),
				None => {
					self.attach(current)?;
				}
			},
			ExternalUpdate::ClearBuffer => {
				if let Some(buffer) = self.buffers.get(current) {
					self.clear(&buffer)?;
				}
			}
			ExternalUpdate::Stop | ExternalUpdate::Exit => {}
		}
		Ok(())
	}

	fn update_project(&self, buffer: &Buffer) -> Result<()> {
		let Some(analyzer) = self.analyzers.get(buffer.filetype()) else {
			return Ok(());
		};
		let updated = buffer.with_cache(|cache| -> Result<()> {
			analyzer.update_project(cache)?;
			cache.save_archive()?;
			Ok(())
		});
		updated.unwrap_or(Ok(()))
	}

	/// Detaches and closes every live buffer.
	pub fn detach_all(&self) {
		for buffer in self.buffers.drain() {
			if let Err(e) = self.host.detach(buffer.id()) {
				tracing::debug!(buffer = buffer.id(), error = %e, "host detach failed");
			}
			buffer.close();
		}
	}

	/// Closes every live buffer without telling the host.
	pub fn close_all(&self) {
		for buffer in self.buffers.drain() {
			buffer.close();
		}
	}

	/// Records why the session stopped and wakes [`wait_for_shutdown`](Self::wait_for_shutdown).
	///
	/// The first reason wins.
	pub fn signal_shutdown(&self, reason: Shutdown) {
		let mut state = self.shutdown.lock();
		if state.is_none() {
			tracing::info!(?reason, "session shutting down");
			*state = Some(reason);
		}
		self.shutdown_cv.notify_all();
	}

	/// The shutdown reason, if the session stopped.
	pub fn shutdown_reason(&self) -> Option<Shutdown> {
		*self.shutdown.lock()
	}

	/// Blocks until the session stops.
	pub fn wait_for_shutdown(&self) -> Shutdown {
		let mut state = self.shutdown.lock();
		loop {
			if let Some(reason) = *state {
				return reason;
			}
			self.shutdown_cv.wait(&mut state);
		}
	}

	/// Like [`wait_for_shutdown`](Self::wait_for_shutdown), giving up after `timeout`.
	pub fn wait_for_shutdown_timeout(&self, timeout: Duration) -> Option<Shutdown> {
		let mut state = self.shutdown.lock();
		if state.is_none() {
			self.shutdown_cv.wait_while_for(&mut state, |s| s.is_none(), timeout);
		}
		*state
	}

	pub(crate) fn report(&self, context: &str, error: &crate::Error) {
		tracing::warn!(error = %error, "{context} failed");
		self.host.report_error(&format!("taglight: {context}: {error}"));
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.close_all();
	}
}
