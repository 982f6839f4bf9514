use std::sync::Arc;

use taglight_msgpack::Value;
use taglight_rpc::NotificationHandler;

use crate::{Event, EventError, Session, TaskClass};

/// Routes host notifications to a [`Session`].
///
/// Runs on the connection's reader thread. Events for one buffer are applied in
/// receipt order before the next notification is read; anything slow is handed to
/// the session's workers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	session: Arc<Session>,
}

impl Dispatcher {
	/// Creates a dispatcher for `session`.
	pub fn new(session: Arc<Session>) -> Self {
		Self { session }
	}

	/// The session notifications are routed to.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Handles one notification.
	pub fn dispatch(&self, method: &str, params: Vec<Value>) {
		let event = match Event::parse(method, params) {
			Ok(event) => event,
			Err(EventError::UnknownMethod(method)) => {
				tracing::debug!(method = %method, "ignoring notification");
				return;
			}
			Err(e) => {
				tracing::warn!(error = %e, "dropping notification");
				return;
			}
		};

		match event {
			Event::Lines {
				buffer,
				tick,
				first,
				last,
				lines,
				more,
			} => self.session.apply_lines(buffer, tick, first, last, lines, more),
			Event::ChangedTick { buffer, tick } => self.session.set_changedtick(buffer, tick),
			Event::Detach { buffer } => {
				self.session.detach(buffer);
			}
			Event::External(update) => {
				let session = Arc::clone(&self.session);
				self.session.workers().spawn(TaskClass::Update, move || {
					if let Err(e) = session.handle_update(update) {
						session.report(&format!("{update:?}"), &e);
					}
				});
			}
		}
	}
}

impl NotificationHandler for Dispatcher {
	fn handle_notification(&self, method: &str, params: Vec<Value>) {
		self.dispatch(method, params);
	}
}
