//! User settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use taglight_project::{Compression, ProjectOverride, RootSelector, parse_project_dirs};

use crate::{Error, Result};

/// Settings read from `taglight.toml`. Every field is optional.
///
/// ```toml
/// cache_dir = "/home/me/.cache/taglight"
/// compression = "none"
/// ignored_filetypes = ["help"]
///
/// [[project_dirs]]
/// path = "/src/linux"
/// filetype = "c"
///
/// [[keywords]]
/// filetypes = ["c", "cpp"]
/// group = "Todo"
/// words = ["TODO", "FIXME"]
/// ```
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// Where archived analyzer output and scratch files live.
	pub cache_dir: PathBuf,
	/// How archives are stored.
	pub compression: Compression,
	/// Directories that are never treated as a project to scan recursively.
	pub norecurse_dirs: Vec<PathBuf>,
	/// Explicit project roots.
	pub project_dirs: Vec<ProjectOverride>,
	/// A file of `path<TAB>filetype` lines adding to `project_dirs`.
	pub project_dirs_file: Option<PathBuf>,
	/// Filetypes that are never attached.
	pub ignored_filetypes: Vec<String>,
	/// Name of the host highlight namespace.
	pub namespace: String,
	/// Upper bound on a host call, in milliseconds. Calls block indefinitely when unset.
	pub request_timeout_ms: Option<u64>,
	/// Word lists highlighted by the built-in keyword analyzer.
	pub keywords: Vec<KeywordSet>,
}

/// One word list of the keyword analyzer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordSet {
	/// Filetypes the list applies to.
	pub filetypes: Vec<String>,
	/// Highlight group applied to each match.
	pub group: String,
	/// Whole words to match.
	pub words: Vec<String>,
}

impl Default for Config {
	fn default() -> Self {
		let mut norecurse_dirs = vec![PathBuf::from("/")];
		norecurse_dirs.extend(dirs::home_dir());
		norecurse_dirs.push(PathBuf::from("/usr/include"));

		Self {
			cache_dir: dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("taglight"),
			compression: Compression::default(),
			norecurse_dirs,
			project_dirs: Vec::new(),
			project_dirs_file: None,
			ignored_filetypes: Vec::new(),
			namespace: "taglight".into(),
			request_timeout_ms: None,
			keywords: Vec::new(),
		}
	}
}

impl Config {
	/// Reads a TOML settings file.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_owned(),
			source,
		})?;
		toml::from_str(&text).map_err(|source| Error::ConfigParse {
			path: path.to_owned(),
			source,
		})
	}

	/// The host call timeout, if one is configured.
	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}

	/// Returns true if buffers of `filetype` are never attached.
	pub fn is_ignored(&self, filetype: &str) -> bool {
		filetype.is_empty() || self.ignored_filetypes.iter().any(|f| f == filetype)
	}

	/// Builds the project root selector from `project_dirs` and `project_dirs_file`.
	///
	/// A missing project dirs file is not an error.
	pub fn root_selector(&self) -> Result<RootSelector> {
		let mut selector = RootSelector::new(self.project_dirs.clone(), self.norecurse_dirs.clone());
		if let Some(path) = &self.project_dirs_file {
			match std::fs::read_to_string(path) {
				Ok(text) => selector.extend_overrides(parse_project_dirs(&text)),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					tracing::debug!(path = %path.display(), "no project dirs file");
				}
				Err(source) => {
					return Err(Error::ConfigRead {
						path: path.clone(),
						source,
					});
				}
			}
		}
		Ok(selector)
	}
}
