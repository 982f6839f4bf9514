//! The taglight session.
//!
//! * [`Dispatcher`]: routes host notifications to the session
//! * [`Session`]: live buffers, project caches, attach/detach and highlighting
//! * [`Host`]: the outbound calls the session makes, implemented for [`taglight_rpc::Nvim`]
//! * [`Analyzer`]: produces highlight [`Decoration`]s for a buffer
//! * [`Config`]: user settings loaded from TOML

#![warn(missing_docs)]

mod analyzer;
mod config;
mod dispatch;
mod events;
mod host;
mod session;
mod workers;

use std::path::PathBuf;

pub use analyzer::{Analyzer, Analyzers, Decoration, KeywordAnalyzer};
pub use config::{Config, KeywordSet};
pub use dispatch::Dispatcher;
pub use events::{Event, EventError, ExternalUpdate};
pub use host::Host;
pub use session::{Session, Shutdown};
pub use workers::{TaskClass, Workers};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A host call failed.
	#[error("{0}")]
	Rpc(#[from] taglight_rpc::Error),
	/// A project cache operation failed.
	#[error("{0}")]
	Project(#[from] taglight_project::Error),
	/// The configuration file could not be read.
	#[error("reading config {}: {source}", path.display())]
	ConfigRead {
		/// The file.
		path: PathBuf,
		/// The underlying error.
		source: std::io::Error,
	},
	/// The configuration file is not valid TOML for [`Config`].
	#[error("parsing config {}: {source}", path.display())]
	ConfigParse {
		/// The file.
		path: PathBuf,
		/// The underlying error.
		source: toml::de::Error,
	},
	/// An analyzer could not produce decorations.
	#[error("analyzer {analyzer}: {message}")]
	Analyzer {
		/// The analyzer's name.
		analyzer: String,
		/// What went wrong.
		message: String,
	},
}

#[cfg(test)]
mod tests;
