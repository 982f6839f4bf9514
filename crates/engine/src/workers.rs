/// Kinds of background work, logged on spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Recomputing a buffer's highlights.
	Highlight,
	/// Handling a session-level user event.
	Update,
	/// Closing a detached buffer.
	Teardown,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Highlight => "highlight",
			Self::Update => "update",
			Self::Teardown => "teardown",
		}
	}
}

/// Where work handed off by the dispatcher runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Workers {
	/// One short-lived named thread per job, so the connection reader never waits.
	#[default]
	Threaded,
	/// On the calling thread. Used by tests for deterministic ordering.
	Inline,
}

impl Workers {
	/// Runs `f` according to the mode.
	pub fn spawn(self, class: TaskClass, f: impl FnOnce() + Send + 'static) {
		match self {
			Self::Inline => f(),
			Self::Threaded => {
				tracing::trace!(worker_class = class.as_str(), "worker.spawn_named_thread");
				let spawned = std::thread::Builder::new()
					.name(format!("taglight-{}", class.as_str()))
					.spawn(f);
				if let Err(e) = spawned {
					tracing::error!(worker_class = class.as_str(), error = %e, "failed to spawn worker thread");
				}
			}
		}
	}
}
