use taglight_rpc::{AtomicBatch, Nvim};

use crate::Result;

/// The host editor calls the session depends on.
///
/// Implemented for [`Nvim`]; tests substitute a scripted host.
pub trait Host: Send + Sync {
	/// Number of the current buffer.
	fn current_buffer(&self) -> Result<i64>;
	/// The buffer's `filetype` option.
	fn filetype(&self, buf: i64) -> Result<String>;
	/// The buffer's file name.
	fn buffer_name(&self, buf: i64) -> Result<String>;
	/// The buffer's change counter.
	fn changedtick(&self, buf: i64) -> Result<u64>;
	/// Every line of the buffer.
	fn buffer_lines(&self, buf: i64) -> Result<Vec<Vec<u8>>>;
	/// Subscribes to line events for the buffer. The first event carries the whole
	/// buffer. Returns false if the host refused.
	fn attach(&self, buf: i64) -> Result<bool>;
	/// Stops line events for the buffer.
	fn detach(&self, buf: i64) -> Result<bool>;
	/// Creates or looks up a highlight namespace.
	fn create_namespace(&self, name: &str) -> Result<i64>;
	/// Runs a batch of calls as one unit.
	fn apply_batch(&self, batch: AtomicBatch) -> Result<()>;
	/// Shows an error message without waiting for it.
	fn report_error(&self, msg: &str);
}

impl Host for Nvim {
	fn current_buffer(&self) -> Result<i64> {
		Ok(self.get_current_buf()?)
	}

	fn filetype(&self, buf: i64) -> Result<String> {
		Ok(self.buf_get_filetype(buf)?)
	}

	fn buffer_name(&self, buf: i64) -> Result<String> {
		Ok(self.buf_get_name(buf)?)
	}

	fn changedtick(&self, buf: i64) -> Result<u64> {
		Ok(self.buf_get_changedtick(buf)?)
	}

	fn buffer_lines(&self, buf: i64) -> Result<Vec<Vec<u8>>> {
		Ok(self.buf_get_lines(buf, 0, -1, false)?)
	}

	fn attach(&self, buf: i64) -> Result<bool> {
		Ok(self.buf_attach(buf, true)?)
	}

	fn detach(&self, buf: i64) -> Result<bool> {
		Ok(self.buf_detach(buf)?)
	}

	fn create_namespace(&self, name: &str) -> Result<i64> {
		Ok(Nvim::create_namespace(self, name)?)
	}

	fn apply_batch(&self, batch: AtomicBatch) -> Result<()> {
		self.call_atomic(batch)?;
		Ok(())
	}

	fn report_error(&self, msg: &str) {
		self.err_write(msg);
	}
}
