//! Per-project cache files shared between buffers.
//!
//! Buffers of the same project and analyzer share one [`ProjectCache`] through the
//! [`ProjectCacheRegistry`]. Which directory counts as "the project" is decided
//! beforehand by a [`RootSelector`], so the registry key is stable.

#![warn(missing_docs)]

mod naming;
mod registry;
mod root;

use std::io;
use std::path::PathBuf;

pub use naming::{archive_path, sanitize_path};
pub use registry::{CacheLease, ProjectCache, ProjectCacheRegistry};
pub use root::{ProjectOverride, ProjectRoot, RootSelector, is_c_family, parse_project_dirs};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Project cache errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A cache file or directory operation failed.
	#[error("{}: {source}", path.display())]
	Io {
		/// The file or directory involved.
		path: PathBuf,
		/// The underlying error.
		source: io::Error,
	},
	/// No cache directory was configured and none could be determined.
	#[error("no usable cache directory")]
	CacheDir,
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		let path = path.into();
		move |source| Self::Io { path, source }
	}
}

/// How archived analyzer output is stored on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
	/// Plain files.
	None,
	/// gzip, with a `.gz` extension.
	#[default]
	Gzip,
}

impl Compression {
	/// File name extension appended after `.tags`, if any.
	pub fn extension(self) -> Option<&'static str> {
		match self {
			Self::None => None,
			Self::Gzip => Some("gz"),
		}
	}
}
